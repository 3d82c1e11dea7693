use rank_core::{ChannelInfo, ChannelKind, MessageRef, PlatformError};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);
const BOT_USER_AGENT: &str = concat!("DiscordBot (anthranks, ", env!("CARGO_PKG_VERSION"), ")");

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub thread_metadata: Option<ThreadMetadata>,
    /// Starter message, present when a forum post was just created.
    #[serde(default)]
    pub message: Option<MessagePayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadMetadata {
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub locked: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagePayload {
    pub id: String,
    pub channel_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    pub id: String,
    pub username: String,
}

pub fn snowflake(raw: &str) -> Result<u64, PlatformError> {
    raw.parse()
        .map_err(|_| PlatformError::Malformed(format!("invalid snowflake '{}'", raw)))
}

impl ChannelPayload {
    pub fn info(&self) -> Result<ChannelInfo, PlatformError> {
        let kind = match self.kind {
            0 | 5 => ChannelKind::Text,
            10..=12 => {
                let meta = self.thread_metadata.clone().unwrap_or_default();
                ChannelKind::Thread {
                    archived: meta.archived,
                    locked: meta.locked,
                }
            }
            15 | 16 => ChannelKind::Forum,
            _ => ChannelKind::Other,
        };
        Ok(ChannelInfo {
            id: snowflake(&self.id)?,
            kind,
        })
    }
}

impl MessagePayload {
    pub fn reference(&self) -> Result<MessageRef, PlatformError> {
        Ok(MessageRef {
            channel_id: snowflake(&self.channel_id)?,
            message_id: snowflake(&self.id)?,
        })
    }
}

/// Seconds to wait from a 429 body, which carries `retry_after` as a float.
fn retry_after(body: &str) -> Duration {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["retry_after"].as_f64())
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// Thin Discord REST v10 client.
#[derive(Debug, Clone)]
pub struct DiscordHttp {
    client: Client,
    api_base: String,
    token: String,
}

impl DiscordHttp {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Response, PlatformError> {
        let url = format!("{}{}", self.api_base, path);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("Discord {} {} (attempt {})", method, path, attempt);

            let mut request = self
                .client
                .request(method.clone(), &url)
                .header(AUTHORIZATION, format!("Bot {}", self.token))
                .header(USER_AGENT, BOT_USER_AGENT);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| PlatformError::Transport(e.to_string()))?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let text = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 && attempt < MAX_RETRIES {
                let wait = retry_after(&text);
                warn!("Discord rate limited on {} {}, retrying in {:?}", method, path, wait);
                sleep(wait).await;
                continue;
            }
            return Err(PlatformError::from_status(status.as_u16(), text));
        }
    }

    async fn json<T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<&Value>) -> Result<T, PlatformError> {
        self.request(method, path, body)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(e.to_string()))
    }

    pub async fn current_user(&self) -> Result<UserPayload, PlatformError> {
        self.json(Method::GET, "/users/@me", None).await
    }

    pub async fn get_channel(&self, channel_id: u64) -> Result<ChannelPayload, PlatformError> {
        self.json(Method::GET, &format!("/channels/{}", channel_id), None).await
    }

    pub async fn modify_channel(&self, channel_id: u64, body: &Value) -> Result<ChannelPayload, PlatformError> {
        self.json(Method::PATCH, &format!("/channels/{}", channel_id), Some(body)).await
    }

    pub async fn get_message(&self, channel_id: u64, message_id: u64) -> Result<MessagePayload, PlatformError> {
        self.json(
            Method::GET,
            &format!("/channels/{}/messages/{}", channel_id, message_id),
            None,
        )
        .await
    }

    pub async fn create_message(&self, channel_id: u64, body: &Value) -> Result<MessagePayload, PlatformError> {
        self.json(Method::POST, &format!("/channels/{}/messages", channel_id), Some(body))
            .await
    }

    pub async fn edit_message(&self, channel_id: u64, message_id: u64, body: &Value) -> Result<MessagePayload, PlatformError> {
        self.json(
            Method::PATCH,
            &format!("/channels/{}/messages/{}", channel_id, message_id),
            Some(body),
        )
        .await
    }

    /// Open a forum post; the response is the new thread with its starter message.
    pub async fn start_forum_thread(&self, channel_id: u64, name: &str, message: &Value) -> Result<ChannelPayload, PlatformError> {
        let body = json!({ "name": name, "message": message });
        self.json(Method::POST, &format!("/channels/{}/threads", channel_id), Some(&body))
            .await
    }

    pub async fn create_interaction_response(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        body: &Value,
    ) -> Result<(), PlatformError> {
        self.request(
            Method::POST,
            &format!("/interactions/{}/{}/callback", interaction_id, interaction_token),
            Some(body),
        )
        .await?;
        Ok(())
    }

    pub async fn create_followup(
        &self,
        application_id: &str,
        interaction_token: &str,
        body: &Value,
    ) -> Result<(), PlatformError> {
        self.request(
            Method::POST,
            &format!("/webhooks/{}/{}", application_id, interaction_token),
            Some(body),
        )
        .await?;
        Ok(())
    }

    /// Replace the bot's slash commands, guild-scoped when `guild_id` is set.
    pub async fn overwrite_commands(
        &self,
        application_id: u64,
        guild_id: Option<u64>,
        commands: &Value,
    ) -> Result<(), PlatformError> {
        let path = match guild_id {
            Some(guild) => format!("/applications/{}/guilds/{}/commands", application_id, guild),
            None => format!("/applications/{}/commands", application_id),
        };
        self.request(Method::PUT, &path, Some(commands)).await?;
        Ok(())
    }
}
