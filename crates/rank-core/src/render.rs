//! Platform-neutral views for the rating prompt and aggregated results.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ResultsError;
use crate::types::{Category, CompiledRecord, ResultsKey};

/// Most fields a single embed may carry.
pub const MAX_EMBED_FIELDS: usize = 25;

pub const RESULTS_DESCRIPTION: &str = "Auto-updates every 45 minutes.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarGlyphs {
    #[serde(default = "default_full")]
    pub full: String,
    #[serde(default = "default_half")]
    pub half: String,
    #[serde(default = "default_empty")]
    pub empty: String,
}

fn default_full() -> String {
    "★".to_string()
}

fn default_half() -> String {
    "⯪".to_string()
}

fn default_empty() -> String {
    "☆".to_string()
}

impl Default for StarGlyphs {
    fn default() -> Self {
        Self {
            full: default_full(),
            half: default_half(),
            empty: default_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedView {
    pub title: String,
    pub description: String,
    pub fields: Vec<EmbedField>,
}

/// Five-slot star bar: whole stars for the integer part, one half star when
/// the fraction is at least .5, empty stars for the rest.
pub fn star_display(score: f64, glyphs: &StarGlyphs) -> String {
    let score = if score.is_finite() { score.clamp(0.0, 5.0) } else { 0.0 };
    let full = score.trunc() as usize;
    let half = usize::from(score - score.trunc() >= 0.5);
    let empty = 5 - full - half;
    format!(
        "{}{}{}",
        glyphs.full.repeat(full),
        glyphs.half.repeat(half),
        glyphs.empty.repeat(empty)
    )
}

/// Prompt shown above the three rating dropdowns.
pub fn rate_prompt_view(entity_id: &str) -> EmbedView {
    EmbedView {
        title: format!("Rate {entity_id}"),
        description: "Use the dropdown below to rate (1–5).".to_string(),
        fields: Category::ALL
            .into_iter()
            .map(|c| EmbedField {
                name: c.label().to_string(),
                value: c.scale_hint().to_string(),
                inline: false,
            })
            .collect(),
    }
}

/// Results embed for `key` from already filtered records.
pub fn build_results_view(
    key: &ResultsKey,
    records: &[CompiledRecord],
    glyphs: &StarGlyphs,
) -> Result<EmbedView, ResultsError> {
    if let ResultsKey::Entity(id) = key {
        if records.is_empty() {
            return Err(ResultsError::EntityNotFound(id.clone()));
        }
    }

    let title = match key {
        ResultsKey::All => "🦖 Dinosaur Ratings".to_string(),
        ResultsKey::Entity(id) => format!("{id} Rating"),
    };

    if records.len() > MAX_EMBED_FIELDS {
        warn!(
            "Results for '{}' have {} entities; only the first {} fit",
            key,
            records.len(),
            MAX_EMBED_FIELDS
        );
    }

    let fields = records
        .iter()
        .take(MAX_EMBED_FIELDS)
        .map(|r| EmbedField {
            name: r.entity_id.clone(),
            value: format!(
                "Complexity:    {}\nSociability:   {}\nSurvivability: {}",
                star_display(r.complexity, glyphs),
                star_display(r.sociability, glyphs),
                star_display(r.survivability, glyphs),
            ),
            inline: false,
        })
        .collect();

    Ok(EmbedView {
        title,
        description: RESULTS_DESCRIPTION.to_string(),
        fields,
    })
}
