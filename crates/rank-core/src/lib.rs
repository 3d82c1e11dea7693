//! Rating, aggregation and UI reconciliation logic for the Anthranks bot.
//!
//! This crate holds everything that does not depend on a particular chat
//! platform or spreadsheet backend: the vote upsert with its retry policy,
//! the compiled-results cache, the post metadata store used to resurrect
//! interactive messages after a restart, and the refresher that keeps posted
//! results current. The two external collaborators are reached through the
//! [`SheetStore`] and [`Platform`] traits.

pub mod clock;
pub mod error;
pub mod handlers;
pub mod memory_store;
pub mod metadata;
pub mod platform;
pub mod render;
pub mod results;
pub mod retry;
pub mod revival;
pub mod schema;
pub mod store;
pub mod tracker;
pub mod types;
pub mod votes;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{FlowError, PlatformError, ResultsError, StoreError};
pub use handlers::{PublishedResults, RankService, RatingReply, ServiceSettings};
pub use memory_store::{MemoryStore, StoreOp};
pub use metadata::{parse_metadata_row, MetadataStore};
pub use platform::{ChannelInfo, ChannelKind, MessageRef, Platform};
pub use render::{build_results_view, rate_prompt_view, star_display, EmbedField, EmbedView, StarGlyphs};
pub use results::{ResultsCache, DEFAULT_RESULTS_TTL};
pub use retry::RetryPolicy;
pub use revival::{revive, RevivalReport};
pub use store::{Cell, SheetStore, StoreClient, StoreWriter, Table};
pub use tracker::{RefreshReport, ResultsRefresher, ResultsTracker};
pub use types::{Category, CompiledRecord, PostMetadata, Rating, ResultsKey, VoteRecord};
pub use votes::VoteBook;
