use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Attribute a voter can rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Complexity,
    Sociability,
    Survivability,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::Complexity,
        Category::Sociability,
        Category::Survivability,
    ];

    /// Header label, also used in custom ids and user replies.
    pub fn label(self) -> &'static str {
        match self {
            Category::Complexity => "Complexity",
            Category::Sociability => "Sociability",
            Category::Survivability => "Survivability",
        }
    }

    /// 1-based column in the Votes table.
    pub fn vote_column(self) -> usize {
        match self {
            Category::Complexity => 3,
            Category::Sociability => 4,
            Category::Survivability => 5,
        }
    }

    /// What the ends of the 1–5 scale mean.
    pub fn scale_hint(self) -> &'static str {
        match self {
            Category::Complexity => "1 = very simple, 5 = very complex",
            Category::Sociability => "1 = mostly solitary, 5 = highly social",
            Category::Survivability => "1 = low survivability, 5 = very resilient",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// An integer rating in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Rating(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Rating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(Rating::new)
            .ok_or_else(|| format!("rating must be an integer 1-5, got '{s}'"))
    }
}

/// One voter's ratings for one entity, as stored in the Votes table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRecord {
    pub entity_id: String,
    pub voter_id: String,
    pub complexity: Option<Rating>,
    pub sociability: Option<Rating>,
    pub survivability: Option<Rating>,
}

impl VoteRecord {
    pub fn rating(&self, category: Category) -> Option<Rating> {
        match category {
            Category::Complexity => self.complexity,
            Category::Sociability => self.sociability,
            Category::Survivability => self.survivability,
        }
    }
}

/// Externally aggregated mean ratings for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRecord {
    pub entity_id: String,
    pub complexity: f64,
    pub sociability: f64,
    pub survivability: f64,
}

impl CompiledRecord {
    pub fn score(&self, category: Category) -> f64 {
        match category {
            Category::Complexity => self.complexity,
            Category::Sociability => self.sociability,
            Category::Survivability => self.survivability,
        }
    }
}

/// Where the interactive messages for one entity (or the global results) live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostMetadata {
    pub entity_id: String,
    pub thread_id: u64,
    pub rate_message_id: Option<u64>,
    pub results_message_id: Option<u64>,
}

/// Key a results message is tracked under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResultsKey {
    /// Unfiltered view of every entity.
    All,
    Entity(String),
}

impl ResultsKey {
    /// Reserved metadata key for the global results post.
    pub const ALL_KEY: &'static str = "__all__";

    pub fn from_filter(filter: Option<&str>) -> Self {
        match filter.map(str::trim).filter(|f| !f.is_empty()) {
            Some(f) => ResultsKey::Entity(f.to_string()),
            None => ResultsKey::All,
        }
    }

    pub fn from_stored(key: &str) -> Self {
        if key == Self::ALL_KEY {
            ResultsKey::All
        } else {
            ResultsKey::Entity(key.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ResultsKey::All => Self::ALL_KEY,
            ResultsKey::Entity(id) => id,
        }
    }

    pub fn filter(&self) -> Option<&str> {
        match self {
            ResultsKey::All => None,
            ResultsKey::Entity(id) => Some(id),
        }
    }
}

impl fmt::Display for ResultsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parsing() {
        assert_eq!("Sociability".parse::<Category>().unwrap(), Category::Sociability);
        assert_eq!("complexity".parse::<Category>().unwrap(), Category::Complexity);
        assert!("Speed".parse::<Category>().is_err());
        assert_eq!(Category::Survivability.vote_column(), 5);
    }

    #[test]
    fn rating_bounds() {
        assert!(Rating::new(0).is_none());
        assert!(Rating::new(6).is_none());
        assert_eq!("4".parse::<Rating>().unwrap().value(), 4);
        assert!("4.5".parse::<Rating>().is_err());
    }

    #[test]
    fn results_key_round_trips_reserved_name() {
        assert_eq!(ResultsKey::from_filter(None), ResultsKey::All);
        assert_eq!(ResultsKey::from_filter(Some("  ")), ResultsKey::All);
        assert_eq!(ResultsKey::from_stored("__all__"), ResultsKey::All);
        assert_eq!(ResultsKey::from_filter(Some("Trex")).as_str(), "Trex");
        assert_eq!(ResultsKey::All.filter(), None);
    }
}
