//! Table names and header shapes of the backing spreadsheet.

pub const VOTES_TABLE: &str = "Votes";
pub const COMPILED_TABLE: &str = "Compiled";
pub const METADATA_TABLE: &str = "Metadata";

pub const ENTITY_COLUMN: &str = "dino_id";
pub const VOTER_COLUMN: &str = "user_id";
pub const THREAD_COLUMN: &str = "Thread ID";
pub const RATE_MESSAGE_COLUMN: &str = "rate_message_id";
pub const RESULTS_MESSAGE_COLUMN: &str = "results_message_id";

pub const VOTES_HEADER: [&str; 5] = [
    ENTITY_COLUMN,
    VOTER_COLUMN,
    "Complexity",
    "Sociability",
    "Survivability",
];

pub const METADATA_HEADER: [&str; 4] = [
    THREAD_COLUMN,
    ENTITY_COLUMN,
    RATE_MESSAGE_COLUMN,
    RESULTS_MESSAGE_COLUMN,
];

/// 1-based columns in the Metadata table.
pub const METADATA_RATE_COLUMN: usize = 3;
pub const METADATA_RESULTS_COLUMN: usize = 4;

/// Rows allocated when a table has to be created.
pub const DEFAULT_TABLE_ROWS: usize = 1000;
