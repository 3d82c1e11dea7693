//! Parsing of `INTERACTION_CREATE` payloads and the reply bodies sent back.

use serde::Deserialize;
use serde_json::{json, Value};

const TYPE_APPLICATION_COMMAND: u8 = 2;
const TYPE_MESSAGE_COMPONENT: u8 = 3;

const CALLBACK_CHANNEL_MESSAGE: u8 = 4;
const CALLBACK_DEFERRED_MESSAGE: u8 = 5;
const FLAG_EPHEMERAL: u64 = 1 << 6;

#[derive(Debug, Deserialize)]
struct RawInteraction {
    id: String,
    application_id: String,
    #[serde(rename = "type")]
    kind: u8,
    token: String,
    #[serde(default)]
    data: Option<RawData>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    member: Option<RawMember>,
    #[serde(default)]
    user: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawData {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    options: Vec<RawOption>,
    #[serde(default)]
    custom_id: Option<String>,
    #[serde(default)]
    values: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    name: String,
    #[serde(default)]
    value: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    user: RawUser,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: String,
}

/// Who asked and where, plus what is needed to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionContext {
    pub id: String,
    pub application_id: String,
    pub token: String,
    pub channel_id: u64,
    pub user_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOptions(Vec<(String, String)>);

impl CommandOptions {
    /// Trimmed option value; blank values count as absent.
    pub fn string(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn snowflake(&self, name: &str) -> Option<u64> {
        self.string(name).and_then(|v| v.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Command {
        ctx: InteractionContext,
        name: String,
        options: CommandOptions,
    },
    Select {
        ctx: InteractionContext,
        custom_id: String,
        values: Vec<String>,
    },
    /// Pings, autocomplete, modals: nothing the bot handles.
    Unsupported { kind: u8 },
}

fn option_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn parse(payload: Value) -> Result<Interaction, serde_json::Error> {
    let raw: RawInteraction = serde_json::from_value(payload)?;

    if raw.kind != TYPE_APPLICATION_COMMAND && raw.kind != TYPE_MESSAGE_COMPONENT {
        return Ok(Interaction::Unsupported { kind: raw.kind });
    }

    let user_id = raw
        .member
        .map(|m| m.user.id)
        .or(raw.user.map(|u| u.id))
        .unwrap_or_default();
    let ctx = InteractionContext {
        id: raw.id,
        application_id: raw.application_id,
        token: raw.token,
        channel_id: raw
            .channel_id
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or_default(),
        user_id,
    };
    let Some(data) = raw.data else {
        return Ok(Interaction::Unsupported { kind: raw.kind });
    };

    if raw.kind == TYPE_APPLICATION_COMMAND {
        let options = data
            .options
            .into_iter()
            .filter_map(|o| o.value.map(|v| (o.name, option_text(&v))))
            .collect();
        return Ok(Interaction::Command {
            ctx,
            name: data.name.unwrap_or_default(),
            options: CommandOptions(options),
        });
    }

    Ok(Interaction::Select {
        ctx,
        custom_id: data.custom_id.unwrap_or_default(),
        values: data.values,
    })
}

pub fn ephemeral_reply(content: &str) -> Value {
    json!({
        "type": CALLBACK_CHANNEL_MESSAGE,
        "data": { "content": content, "flags": FLAG_EPHEMERAL }
    })
}

/// "Thinking..." acknowledgement visible only to the invoking user.
pub fn deferred_ephemeral() -> Value {
    json!({
        "type": CALLBACK_DEFERRED_MESSAGE,
        "data": { "flags": FLAG_EPHEMERAL }
    })
}

pub fn ephemeral_followup(content: &str) -> Value {
    json!({ "content": content, "flags": FLAG_EPHEMERAL })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_results_command_with_options() {
        let interaction = parse(json!({
            "id": "1", "application_id": "2", "type": 2, "token": "tok",
            "channel_id": "300",
            "member": { "user": { "id": "42" } },
            "data": {
                "name": "results",
                "options": [
                    { "name": "thread_id", "type": 3, "value": " 777 " },
                    { "name": "channel", "type": 7, "value": "555" },
                    { "name": "dino", "type": 3, "value": "" }
                ]
            }
        }))
        .unwrap();

        let Interaction::Command { ctx, name, options } = interaction else {
            panic!("expected a command");
        };
        assert_eq!(name, "results");
        assert_eq!(ctx.channel_id, 300);
        assert_eq!(ctx.user_id, "42");
        assert_eq!(options.string("thread_id"), Some("777"));
        assert_eq!(options.snowflake("channel"), Some(555));
        assert_eq!(options.string("dino"), None);
    }

    #[test]
    fn parses_select_from_dm_user() {
        let interaction = parse(json!({
            "id": "1", "application_id": "2", "type": 3, "token": "tok",
            "channel_id": "9",
            "user": { "id": "7" },
            "data": { "custom_id": "rate_select:Trex:Complexity", "component_type": 3, "values": ["4"] }
        }))
        .unwrap();

        assert_eq!(
            interaction,
            Interaction::Select {
                ctx: InteractionContext {
                    id: "1".into(),
                    application_id: "2".into(),
                    token: "tok".into(),
                    channel_id: 9,
                    user_id: "7".into(),
                },
                custom_id: "rate_select:Trex:Complexity".into(),
                values: vec!["4".into()],
            }
        );
    }

    #[test]
    fn pings_are_unsupported() {
        let interaction = parse(json!({ "id": "1", "application_id": "2", "type": 1, "token": "t" })).unwrap();
        assert_eq!(interaction, Interaction::Unsupported { kind: 1 });
    }

    #[test]
    fn reply_bodies_are_ephemeral() {
        assert_eq!(ephemeral_reply("hi")["data"]["flags"], 64);
        assert_eq!(deferred_ephemeral()["type"], 5);
        assert_eq!(ephemeral_followup("ok")["content"], "ok");
    }
}
