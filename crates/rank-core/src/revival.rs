//! Startup revival of interactive messages recorded in the metadata store.

use tracing::{info, warn};

use crate::platform::{ChannelInfo, MessageRef, Platform};
use crate::tracker::ResultsTracker;
use crate::types::{PostMetadata, ResultsKey};

/// What revival managed to restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevivalReport {
    pub rate_revived: Vec<String>,
    pub rate_failed: Vec<String>,
    pub results_revived: Vec<String>,
    pub results_failed: Vec<String>,
}

impl RevivalReport {
    pub fn log_summary(&self) {
        info!("Revived {} rate dropdowns", self.rate_revived.len());
        info!("Revived {} results embeds", self.results_revived.len());
        if !self.rate_failed.is_empty() {
            warn!("Failed to revive rate dropdowns for: {}", self.rate_failed.join(", "));
        }
        if !self.results_failed.is_empty() {
            warn!("Failed to revive results embeds for: {}", self.results_failed.join(", "));
        }
    }
}

/// Fetch a channel fresh and reopen it if it is an archived or locked thread.
async fn open_channel(
    platform: &dyn Platform,
    thread_id: u64,
    entity_id: &str,
    purpose: &str,
) -> Option<ChannelInfo> {
    let channel = match platform.fetch_channel(thread_id).await {
        Ok(c) => c,
        Err(e) => {
            warn!(entity_id, thread_id, "Cannot fetch channel for {}: {}", purpose, e);
            return None;
        }
    };

    if !channel.needs_reopen() {
        return Some(channel);
    }

    match platform.reopen_thread(thread_id).await {
        Ok(reopened) => {
            info!(entity_id, thread_id, "Unarchived thread for {}", purpose);
            Some(reopened)
        }
        Err(e) => {
            warn!(entity_id, thread_id, "Cannot unarchive thread for {}: {}", purpose, e);
            None
        }
    }
}

async fn fetch(
    platform: &dyn Platform,
    meta: &PostMetadata,
    message_id: u64,
    purpose: &str,
) -> Option<MessageRef> {
    let channel = open_channel(platform, meta.thread_id, &meta.entity_id, purpose).await?;
    match platform.fetch_message(channel.id, message_id).await {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(
                entity_id = %meta.entity_id,
                message_id,
                "Cannot fetch {} message: {}",
                purpose,
                e
            );
            None
        }
    }
}

async fn revive_rate(platform: &dyn Platform, meta: &PostMetadata, message_id: u64) -> bool {
    let Some(message) = fetch(platform, meta, message_id, "rate").await else {
        return false;
    };
    match platform.attach_rate_controls(&message, &meta.entity_id).await {
        Ok(()) => true,
        Err(e) => {
            warn!(entity_id = %meta.entity_id, message_id, "Cannot reattach rate controls: {}", e);
            false
        }
    }
}

/// Reattach rating controls and re-track results messages for every entry.
///
/// Results messages are only remembered for the refresher, not re-rendered.
/// A failure for one entry never stops the others.
pub async fn revive(
    platform: &dyn Platform,
    entries: &[PostMetadata],
    tracker: &ResultsTracker,
) -> RevivalReport {
    let mut report = RevivalReport::default();

    for meta in entries {
        let Some(rate_id) = meta.rate_message_id else { continue };
        if revive_rate(platform, meta, rate_id).await {
            report.rate_revived.push(meta.entity_id.clone());
        } else {
            report.rate_failed.push(meta.entity_id.clone());
        }
    }

    for meta in entries {
        let Some(results_id) = meta.results_message_id else { continue };
        match fetch(platform, meta, results_id, "results").await {
            Some(message) => {
                tracker.track(ResultsKey::from_stored(&meta.entity_id), message);
                report.results_revived.push(meta.entity_id.clone());
            }
            None => report.results_failed.push(meta.entity_id.clone()),
        }
    }

    report.log_summary();
    report
}
