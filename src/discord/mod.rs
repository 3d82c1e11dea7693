pub mod components;
pub mod gateway;
pub mod http;
pub mod interaction;
pub mod platform;

pub use gateway::GatewayEvent;
pub use http::DiscordHttp;
pub use interaction::{Interaction, InteractionContext};
pub use platform::DiscordPlatform;
