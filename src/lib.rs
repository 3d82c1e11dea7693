//! Anthranks: a Discord bot that records 1-5 dinosaur ratings in a Google
//! Sheet and keeps posted results embeds current.
//!
//! The platform-independent logic lives in the `rank-core` crate; this crate
//! supplies configuration, the Google Sheets backend, the Discord client and
//! the glue that runs them together.

pub mod bot;
pub mod config;
pub mod discord;
pub mod sheets;

pub use bot::{Bot, BotState};
pub use config::Config;
