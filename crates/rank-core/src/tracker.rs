//! Tracked results messages and the periodic refresher that rewrites them.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{PlatformError, ResultsError};
use crate::handlers::RankService;
use crate::platform::MessageRef;
use crate::types::ResultsKey;

/// Results messages kept current by the refresher, keyed by filter.
#[derive(Debug, Clone, Default)]
pub struct ResultsTracker {
    targets: Arc<Mutex<BTreeMap<ResultsKey, MessageRef>>>,
}

impl ResultsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `message` under `key`, returning the message it replaces.
    pub fn track(&self, key: ResultsKey, message: MessageRef) -> Option<MessageRef> {
        self.targets.lock().insert(key, message)
    }

    pub fn remove(&self, key: &ResultsKey) -> Option<MessageRef> {
        self.targets.lock().remove(key)
    }

    pub fn get(&self, key: &ResultsKey) -> Option<MessageRef> {
        self.targets.lock().get(key).copied()
    }

    pub fn snapshot(&self) -> Vec<(ResultsKey, MessageRef)> {
        self.targets
            .lock()
            .iter()
            .map(|(k, m)| (k.clone(), *m))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.targets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.lock().is_empty()
    }
}

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub updated: Vec<String>,
    /// Targets whose message or entity is gone; no longer tracked.
    pub dropped: Vec<String>,
    /// Targets that failed for a recoverable reason; retried next pass.
    pub deferred: Vec<String>,
}

enum RefreshFailure {
    Gone(String),
    Retry(String),
}

impl From<ResultsError> for RefreshFailure {
    fn from(err: ResultsError) -> Self {
        match err {
            ResultsError::EntityNotFound(_) => RefreshFailure::Gone(err.to_string()),
            ResultsError::Store(e) => RefreshFailure::Retry(e.to_string()),
        }
    }
}

impl From<PlatformError> for RefreshFailure {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::NotFound(_) | PlatformError::Forbidden(_) => {
                RefreshFailure::Gone(err.to_string())
            }
            _ => RefreshFailure::Retry(err.to_string()),
        }
    }
}

/// Rewrites every tracked results message on a fixed period.
pub struct ResultsRefresher {
    service: Arc<RankService>,
    period: Duration,
}

impl ResultsRefresher {
    pub fn new(service: Arc<RankService>, period: Duration) -> Self {
        Self { service, period }
    }

    /// Regenerate and apply every tracked view once.
    ///
    /// A target whose message or entity no longer exists (or can no longer
    /// be edited) is dropped from the tracked set. Store failures and other
    /// platform errors leave the target tracked for the next pass.
    pub async fn refresh_all(&self) -> RefreshReport {
        let tracker = self.service.tracker();
        let mut report = RefreshReport::default();

        for (key, message) in tracker.snapshot() {
            match self.refresh_one(&key, &message).await {
                Ok(()) => {
                    debug!(
                        "Updated '{}' results in channel {}, message {}",
                        key, message.channel_id, message.message_id
                    );
                    report.updated.push(key.to_string());
                }
                Err(RefreshFailure::Gone(e)) => {
                    warn!(key = %key, message_id = message.message_id, "Dropping results target: {}", e);
                    // Only drop the entry if nobody re-posted it meanwhile.
                    if tracker.get(&key) == Some(message) {
                        tracker.remove(&key);
                    }
                    report.dropped.push(key.to_string());
                }
                Err(RefreshFailure::Retry(e)) => {
                    warn!(key = %key, message_id = message.message_id, "Failed to refresh results, keeping target: {}", e);
                    report.deferred.push(key.to_string());
                }
            }
        }

        info!(
            "Results refresh: {} updated, {} dropped, {} deferred",
            report.updated.len(),
            report.dropped.len(),
            report.deferred.len()
        );
        report
    }

    async fn refresh_one(&self, key: &ResultsKey, message: &MessageRef) -> Result<(), RefreshFailure> {
        let view = self.service.results_view(key).await?;
        self.service.platform().edit_results(message, &view).await?;
        Ok(())
    }

    /// Run [`refresh_all`](Self::refresh_all) every period until shutdown.
    /// The first pass happens one full period after start.
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Results refresher started (every {:?})", self.period);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("Results refresher shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if self.service.tracker().is_empty() {
                            debug!("No tracked results messages");
                            continue;
                        }
                        self.refresh_all().await;
                    }
                }
            }
        })
    }
}
