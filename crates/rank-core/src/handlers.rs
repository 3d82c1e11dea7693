//! Rate and results flows behind the bot's slash commands and dropdowns.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::error::{FlowError, ResultsError, StoreError};
use crate::metadata::MetadataStore;
use crate::platform::{ChannelInfo, ChannelKind, MessageRef, Platform};
use crate::render::{build_results_view, EmbedView, StarGlyphs};
use crate::results::ResultsCache;
use crate::retry::RetryPolicy;
use crate::revival::{self, RevivalReport};
use crate::store::StoreClient;
use crate::tracker::ResultsTracker;
use crate::types::{Category, Rating, ResultsKey};
use crate::votes::VoteBook;

/// Tunables for [`RankService`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub results_ttl: Duration,
    pub retry: RetryPolicy,
    pub glyphs: StarGlyphs,
}

/// Ephemeral reply to a rating selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingReply {
    pub recorded: bool,
    pub message: String,
}

/// Where a results view ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedResults {
    pub key: ResultsKey,
    pub message: MessageRef,
    /// True when an already tracked message was edited instead of posting.
    pub edited: bool,
}

pub struct RankService {
    platform: Arc<dyn Platform>,
    votes: VoteBook,
    results: ResultsCache,
    metadata: MetadataStore,
    tracker: ResultsTracker,
    glyphs: StarGlyphs,
}

impl RankService {
    pub fn new(
        platform: Arc<dyn Platform>,
        store: Arc<StoreClient>,
        clock: Arc<dyn Clock>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            platform,
            votes: VoteBook::new(store.clone(), settings.retry),
            results: ResultsCache::new(store.clone(), clock, settings.results_ttl),
            metadata: MetadataStore::new(store),
            tracker: ResultsTracker::new(),
            glyphs: settings.glyphs,
        }
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    pub fn tracker(&self) -> &ResultsTracker {
        &self.tracker
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn results(&self) -> &ResultsCache {
        &self.results
    }

    pub fn votes(&self) -> &VoteBook {
        &self.votes
    }

    pub async fn results_view(&self, key: &ResultsKey) -> Result<EmbedView, ResultsError> {
        let records = self.results.records_for(key.filter()).await?;
        build_results_view(key, &records, &self.glyphs)
    }

    /// Record one dropdown selection. The reply is only produced once the
    /// write has either landed or definitively failed.
    pub async fn submit_rating(
        &self,
        entity_id: &str,
        voter_id: &str,
        category: Category,
        rating: Rating,
    ) -> RatingReply {
        match self.votes.upsert(entity_id, voter_id, category, rating).await {
            Ok(_) => RatingReply {
                recorded: true,
                message: format!("You rated **{entity_id}** • {category} • {rating}"),
            },
            Err(StoreError::RateLimited) => {
                warn!(entity_id, voter_id, "Vote dropped: store quota exhausted");
                RatingReply {
                    recorded: false,
                    message: "⚠️ Sheets quota reached; try in a minute.".to_string(),
                }
            }
            Err(e) => {
                error!(entity_id, voter_id, %category, "Failed to record vote: {}", e);
                RatingReply {
                    recorded: false,
                    message: "⚠️ Could not record rating, try later.".to_string(),
                }
            }
        }
    }

    /// Post the rating dropdowns for `entity_id` and remember where they are.
    pub async fn post_rate_controls(&self, channel_id: u64, entity_id: &str) -> Result<MessageRef, FlowError> {
        let message = self.platform.post_rate_controls(channel_id, entity_id).await?;
        if let Err(e) = self
            .metadata
            .save(entity_id, message.channel_id, Some(message.message_id), None)
            .await
        {
            error!(entity_id, message_id = message.message_id, "Rate controls posted but not persisted: {}", e);
        }
        info!(entity_id, channel_id, message_id = message.message_id, "Posted rate controls");
        Ok(message)
    }

    /// Pick the results destination: an explicit thread id, an explicit
    /// channel, or the channel the command was issued in.
    pub async fn resolve_destination(
        &self,
        thread_id: Option<&str>,
        channel_id: Option<u64>,
        current_channel: u64,
    ) -> Result<ChannelInfo, FlowError> {
        if let Some(raw) = thread_id.map(str::trim).filter(|t| !t.is_empty()) {
            if !raw.bytes().all(|b| b.is_ascii_digit()) {
                return Err(FlowError::InvalidThreadId);
            }
            let id: u64 = raw.parse().map_err(|_| FlowError::InvalidThreadId)?;
            let channel = self
                .platform
                .fetch_channel(id)
                .await
                .map_err(|_| FlowError::NotAThread)?;
            if !channel.is_thread() {
                return Err(FlowError::NotAThread);
            }
            if channel.needs_reopen() {
                return Ok(self.platform.reopen_thread(id).await?);
            }
            return Ok(channel);
        }

        let id = channel_id.unwrap_or(current_channel);
        Ok(self.platform.fetch_channel(id).await?)
    }

    /// Post (or update in place) the results view for `filter` at `destination`
    /// and start tracking it for periodic refresh.
    pub async fn publish_results(
        &self,
        destination: &ChannelInfo,
        filter: Option<&str>,
    ) -> Result<PublishedResults, FlowError> {
        let key = ResultsKey::from_filter(filter);
        let view = self.results_view(&key).await?;

        let existing = self
            .tracker
            .get(&key)
            .filter(|m| destination.kind != ChannelKind::Forum && m.channel_id == destination.id);

        let (message, edited) = match existing {
            Some(message) => match self.platform.edit_results(&message, &view).await {
                Ok(()) => (message, true),
                Err(e) => {
                    warn!(key = %key, "Tracked results message unusable ({}), posting a new one", e);
                    (self.platform.post_results(destination, &view).await?, false)
                }
            },
            None => (self.platform.post_results(destination, &view).await?, false),
        };

        self.tracker.track(key.clone(), message);
        if let Err(e) = self
            .metadata
            .save(key.as_str(), message.channel_id, None, Some(message.message_id))
            .await
        {
            error!(key = %key, message_id = message.message_id, "Results posted but not persisted: {}", e);
        }

        info!(
            key = %key,
            channel_id = message.channel_id,
            message_id = message.message_id,
            edited,
            "Published results"
        );
        Ok(PublishedResults { key, message, edited })
    }

    /// Reattach rating controls and re-track results messages from metadata.
    pub async fn revive(&self) -> RevivalReport {
        let entries = self.metadata.snapshot().await;
        revival::revive(self.platform.as_ref(), &entries, &self.tracker).await
    }
}
