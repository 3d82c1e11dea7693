//! Read-through cache of the externally compiled rating averages.
//!
//! A populated cache younger than the TTL is served without touching the
//! store. Refreshes are serialized so concurrent callers collapse into one
//! read, and a rate-limited refresh falls back to the last good value.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{ResultsError, StoreError};
use crate::schema::{COMPILED_TABLE, ENTITY_COLUMN};
use crate::store::{Record, StoreClient, Table};
use crate::types::{Category, CompiledRecord};

pub const DEFAULT_RESULTS_TTL: Duration = Duration::from_secs(45 * 60);

#[derive(Debug, Clone)]
struct Snapshot {
    records: Arc<Vec<CompiledRecord>>,
    fetched_at: Instant,
}

pub struct ResultsCache {
    store: Arc<StoreClient>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    current: RwLock<Option<Snapshot>>,
    refresh: Mutex<()>,
}

impl ResultsCache {
    pub fn new(store: Arc<StoreClient>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            current: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    pub async fn get_compiled_records(&self) -> Result<Arc<Vec<CompiledRecord>>, StoreError> {
        if let Some(records) = self.fresh() {
            return Ok(records);
        }

        let _refresh = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(records) = self.fresh() {
            return Ok(records);
        }

        match self.store.read_table(COMPILED_TABLE).await {
            Ok(table) => {
                let records = Arc::new(parse_compiled(&table));
                info!("Fetched {} compiled records", records.len());
                *self.current.write() = Some(Snapshot {
                    records: records.clone(),
                    fetched_at: self.clock.now(),
                });
                Ok(records)
            }
            Err(e) if e.is_rate_limited() => match self.cached() {
                Some(stale) => {
                    warn!("Compiled results refresh rate limited; serving stale copy");
                    Ok(stale)
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Records for one entity, or all of them when `filter` is `None`.
    pub async fn records_for(&self, filter: Option<&str>) -> Result<Vec<CompiledRecord>, ResultsError> {
        let records = self.get_compiled_records().await?;
        match filter {
            None => Ok(records.as_ref().clone()),
            Some(id) => {
                let matching: Vec<_> = records.iter().filter(|r| r.entity_id == id).cloned().collect();
                if matching.is_empty() {
                    Err(ResultsError::EntityNotFound(id.to_string()))
                } else {
                    Ok(matching)
                }
            }
        }
    }

    /// Drop the cached value so the next call reads the store.
    #[cfg(test)]
    pub(crate) fn invalidate(&self) {
        *self.current.write() = None;
    }

    fn fresh(&self) -> Option<Arc<Vec<CompiledRecord>>> {
        let current = self.current.read();
        let snapshot = current.as_ref()?;
        let age = self.clock.now().saturating_duration_since(snapshot.fetched_at);
        (age < self.ttl).then(|| snapshot.records.clone())
    }

    fn cached(&self) -> Option<Arc<Vec<CompiledRecord>>> {
        self.current.read().as_ref().map(|s| s.records.clone())
    }
}

fn parse_compiled(table: &Table) -> Vec<CompiledRecord> {
    table
        .records()
        .filter_map(|record| {
            let entity_id = record.get(ENTITY_COLUMN).trim();
            if entity_id.is_empty() {
                return None;
            }
            Some(CompiledRecord {
                entity_id: entity_id.to_string(),
                complexity: score(&record, Category::Complexity),
                sociability: score(&record, Category::Sociability),
                survivability: score(&record, Category::Survivability),
            })
        })
        .collect()
}

fn score(record: &Record<'_>, category: Category) -> f64 {
    let raw = record.get(category.label()).trim();
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            if !raw.is_empty() {
                debug!("Non-numeric {} score '{}', treating as 0", category, raw);
            }
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory_store::{MemoryStore, StoreOp};

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, ResultsCache) {
        let backend = Arc::new(MemoryStore::new());
        backend.insert_table(
            COMPILED_TABLE,
            vec![
                row(&["dino_id", "Complexity", "Sociability", "Survivability"]),
                row(&["Trex", "4.5", "1", "3.25"]),
                row(&["Raptor", "2", "5", ""]),
            ],
        );
        let clock = Arc::new(ManualClock::new());
        let cache = ResultsCache::new(
            Arc::new(StoreClient::new(backend.clone())),
            clock.clone(),
            DEFAULT_RESULTS_TTL,
        );
        (backend, clock, cache)
    }

    #[tokio::test]
    async fn parses_compiled_rows() {
        let (_backend, _clock, cache) = setup();
        let records = cache.get_compiled_records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].entity_id, "Trex");
        assert_eq!(records[0].complexity, 4.5);
        assert_eq!(records[1].survivability, 0.0);
    }

    #[tokio::test]
    async fn within_ttl_no_store_read() {
        let (backend, clock, cache) = setup();
        cache.get_compiled_records().await.unwrap();
        clock.advance(Duration::from_secs(44 * 60));
        cache.get_compiled_records().await.unwrap();
        cache.records_for(Some("Trex")).await.unwrap();

        assert_eq!(backend.read_count(COMPILED_TABLE), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_cache_refreshes_once_for_concurrent_callers() {
        let (backend, clock, cache) = setup();
        cache.get_compiled_records().await.unwrap();
        clock.advance(DEFAULT_RESULTS_TTL);
        backend.set_read_delay(Duration::from_millis(50));

        let (a, b, c) = tokio::join!(
            cache.get_compiled_records(),
            cache.get_compiled_records(),
            cache.records_for(None),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(backend.read_count(COMPILED_TABLE), 2);
    }

    #[tokio::test]
    async fn rate_limited_refresh_serves_stale_value() {
        let (backend, clock, cache) = setup();
        let first = cache.get_compiled_records().await.unwrap();

        backend.insert_table(COMPILED_TABLE, vec![row(&["dino_id"]), row(&["Stego"])]);
        backend.fail_next(StoreOp::ReadValues, StoreError::RateLimited);
        clock.advance(DEFAULT_RESULTS_TTL + Duration::from_secs(1));

        let stale = cache.get_compiled_records().await.unwrap();
        assert_eq!(stale, first);

        // Stale fallback does not reset the timestamp; the next call retries.
        let fresh = cache.get_compiled_records().await.unwrap();
        assert_eq!(fresh[0].entity_id, "Stego");
    }

    #[tokio::test]
    async fn other_errors_propagate_even_with_cache() {
        let (backend, clock, cache) = setup();
        cache.get_compiled_records().await.unwrap();
        backend.fail_next(
            StoreOp::ReadValues,
            StoreError::Server { status: 500, message: "boom".into() },
        );
        clock.advance(DEFAULT_RESULTS_TTL);

        assert!(matches!(
            cache.get_compiled_records().await,
            Err(StoreError::Server { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn rate_limit_with_empty_cache_propagates() {
        let (backend, _clock, cache) = setup();
        backend.fail_next(StoreOp::ReadValues, StoreError::RateLimited);
        assert_eq!(cache.get_compiled_records().await, Err(StoreError::RateLimited));
    }

    #[tokio::test]
    async fn filter_matching_nothing_is_not_found() {
        let (_backend, _clock, cache) = setup();
        assert_eq!(
            cache.records_for(Some("Bronto")).await,
            Err(ResultsError::EntityNotFound("Bronto".into()))
        );
        assert_eq!(cache.records_for(Some("Raptor")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_read() {
        let (backend, _clock, cache) = setup();
        cache.get_compiled_records().await.unwrap();
        cache.invalidate();
        cache.get_compiled_records().await.unwrap();
        assert_eq!(backend.read_count(COMPILED_TABLE), 2);
    }
}
