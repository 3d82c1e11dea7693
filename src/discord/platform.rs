use async_trait::async_trait;
use rank_core::{
    rate_prompt_view, ChannelInfo, ChannelKind, EmbedView, MessageRef, Platform, PlatformError,
};
use serde_json::json;
use std::sync::Arc;

use super::components::{embed, rate_components};
use super::http::{snowflake, DiscordHttp};

/// Forum post titles are capped by Discord.
const MAX_THREAD_NAME: usize = 100;

/// [`Platform`] over the Discord REST API.
#[derive(Clone)]
pub struct DiscordPlatform {
    http: Arc<DiscordHttp>,
}

impl DiscordPlatform {
    pub fn new(http: Arc<DiscordHttp>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Platform for DiscordPlatform {
    async fn fetch_channel(&self, channel_id: u64) -> Result<ChannelInfo, PlatformError> {
        self.http.get_channel(channel_id).await?.info()
    }

    async fn reopen_thread(&self, channel_id: u64) -> Result<ChannelInfo, PlatformError> {
        let body = json!({ "archived": false, "locked": false });
        self.http.modify_channel(channel_id, &body).await?.info()
    }

    async fn fetch_message(&self, channel_id: u64, message_id: u64) -> Result<MessageRef, PlatformError> {
        self.http.get_message(channel_id, message_id).await?.reference()
    }

    async fn post_rate_controls(&self, channel_id: u64, entity_id: &str) -> Result<MessageRef, PlatformError> {
        let body = json!({
            "embeds": [embed(&rate_prompt_view(entity_id))],
            "components": rate_components(entity_id),
        });
        self.http.create_message(channel_id, &body).await?.reference()
    }

    async fn attach_rate_controls(&self, message: &MessageRef, entity_id: &str) -> Result<(), PlatformError> {
        let body = json!({ "components": rate_components(entity_id) });
        self.http
            .edit_message(message.channel_id, message.message_id, &body)
            .await?;
        Ok(())
    }

    async fn post_results(&self, channel: &ChannelInfo, view: &EmbedView) -> Result<MessageRef, PlatformError> {
        let message = json!({ "embeds": [embed(view)] });
        if channel.kind != ChannelKind::Forum {
            return self.http.create_message(channel.id, &message).await?.reference();
        }

        let name: String = view.title.chars().take(MAX_THREAD_NAME).collect();
        let thread = self.http.start_forum_thread(channel.id, &name, &message).await?;
        let thread_id = snowflake(&thread.id)?;
        let message_id = match &thread.message {
            Some(starter) => snowflake(&starter.id)?,
            // The starter message shares the thread's id.
            None => thread_id,
        };
        Ok(MessageRef {
            channel_id: thread_id,
            message_id,
        })
    }

    async fn edit_results(&self, message: &MessageRef, view: &EmbedView) -> Result<(), PlatformError> {
        let body = json!({ "embeds": [embed(view)] });
        self.http
            .edit_message(message.channel_id, message.message_id, &body)
            .await?;
        Ok(())
    }
}
