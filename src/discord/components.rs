//! JSON shapes for embeds, rating dropdowns and slash-command definitions.

use rank_core::{Category, EmbedView};
use serde_json::{json, Value};

pub const RATE_SELECT_PREFIX: &str = "rate_select";
/// Discord rejects longer component custom ids.
pub const MAX_CUSTOM_ID_LEN: usize = 100;

const ACTION_ROW: u8 = 1;
const STRING_SELECT: u8 = 3;

const OPTION_STRING: u8 = 3;
const OPTION_CHANNEL: u8 = 7;
const CHANNEL_TEXT: u8 = 0;
const CHANNEL_FORUM: u8 = 15;

/// Stable id that routes a dropdown selection back to its entity and category
/// across restarts.
pub fn rate_custom_id(entity_id: &str, category: Category) -> String {
    format!("{}:{}:{}", RATE_SELECT_PREFIX, entity_id, category.label())
}

/// Inverse of [`rate_custom_id`]. The entity may itself contain `:`.
pub fn parse_rate_custom_id(custom_id: &str) -> Option<(String, Category)> {
    let rest = custom_id.strip_prefix(RATE_SELECT_PREFIX)?.strip_prefix(':')?;
    let (entity, category) = rest.rsplit_once(':')?;
    if entity.is_empty() {
        return None;
    }
    Some((entity.to_string(), category.parse().ok()?))
}

/// Whether every rating dropdown for `entity_id` gets a valid custom id.
pub fn fits_custom_id(entity_id: &str) -> bool {
    Category::ALL
        .into_iter()
        .all(|c| rate_custom_id(entity_id, c).len() <= MAX_CUSTOM_ID_LEN)
}

pub fn embed(view: &EmbedView) -> Value {
    let fields: Vec<Value> = view
        .fields
        .iter()
        .map(|f| json!({ "name": f.name, "value": f.value, "inline": f.inline }))
        .collect();
    json!({
        "title": view.title,
        "description": view.description,
        "fields": fields,
    })
}

/// Three single-choice dropdowns, one per category, with options 1-5.
pub fn rate_components(entity_id: &str) -> Value {
    let rows: Vec<Value> = Category::ALL
        .into_iter()
        .map(|category| {
            let options: Vec<Value> = (1..=5)
                .map(|i| json!({ "label": i.to_string(), "value": i.to_string() }))
                .collect();
            json!({
                "type": ACTION_ROW,
                "components": [{
                    "type": STRING_SELECT,
                    "custom_id": rate_custom_id(entity_id, category),
                    "placeholder": category.label(),
                    "min_values": 1,
                    "max_values": 1,
                    "options": options,
                }]
            })
        })
        .collect();
    Value::Array(rows)
}

pub fn command_definitions() -> Value {
    json!([
        {
            "name": "rate",
            "description": "Rate a dinosaur on three categories",
            "options": [{
                "type": OPTION_STRING,
                "name": "dino",
                "description": "The dinosaur ID or name you want to rate",
                "required": true
            }]
        },
        {
            "name": "results",
            "description": "Post or update the compiled dinosaur ratings",
            "options": [
                {
                    "type": OPTION_STRING,
                    "name": "thread_id",
                    "description": "Thread ID (digits only)",
                    "required": false
                },
                {
                    "type": OPTION_CHANNEL,
                    "name": "channel",
                    "description": "Text/forum channel",
                    "channel_types": [CHANNEL_TEXT, CHANNEL_FORUM],
                    "required": false
                },
                {
                    "type": OPTION_STRING,
                    "name": "dino",
                    "description": "Optional dino_id",
                    "required": false
                }
            ]
        }
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rank_core::rate_prompt_view;

    #[test]
    fn custom_ids_round_trip_through_parse() {
        let id = rate_custom_id("Trex", Category::Sociability);
        assert_eq!(id, "rate_select:Trex:Sociability");
        assert_eq!(
            parse_rate_custom_id(&id),
            Some(("Trex".to_string(), Category::Sociability))
        );
        assert_eq!(
            parse_rate_custom_id("rate_select:Odd:Name:Complexity"),
            Some(("Odd:Name".to_string(), Category::Complexity))
        );
    }

    #[test]
    fn foreign_or_broken_custom_ids_are_ignored() {
        assert_eq!(parse_rate_custom_id("other:Trex:Complexity"), None);
        assert_eq!(parse_rate_custom_id("rate_select:Trex:Height"), None);
        assert_eq!(parse_rate_custom_id("rate_select::Complexity"), None);
        assert_eq!(parse_rate_custom_id("rate_selectTrex:Complexity"), None);
    }

    #[test]
    fn long_entity_ids_do_not_fit() {
        assert!(fits_custom_id("Trex"));
        assert!(!fits_custom_id(&"x".repeat(90)));
    }

    #[test]
    fn rate_components_have_one_row_per_category() {
        let rows = rate_components("Trex");
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        let select = &rows[2]["components"][0];
        assert_eq!(select["custom_id"], "rate_select:Trex:Survivability");
        assert_eq!(select["placeholder"], "Survivability");
        assert_eq!(select["options"].as_array().unwrap().len(), 5);
        assert_eq!(select["options"][4]["value"], "5");
    }

    #[test]
    fn embed_carries_all_fields() {
        let value = embed(&rate_prompt_view("Trex"));
        assert_eq!(value["title"], "Rate Trex");
        assert_eq!(value["fields"].as_array().unwrap().len(), 3);
        assert_eq!(value["fields"][0]["inline"], false);
    }

    #[test]
    fn commands_expose_expected_options() {
        let commands = command_definitions();
        assert_eq!(commands[0]["name"], "rate");
        assert_eq!(commands[0]["options"][0]["required"], true);
        let names: Vec<_> = commands[1]["options"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["thread_id", "channel", "dino"]);
    }
}
