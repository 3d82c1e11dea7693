//! Durable entity → (thread, rate message, results message) mapping.
//!
//! Rows live in the Metadata table so interactive posts can be found again
//! after a restart. Rows are appended or patched in place, never deleted.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::schema::{
    ENTITY_COLUMN, METADATA_HEADER, METADATA_RATE_COLUMN, METADATA_RESULTS_COLUMN, METADATA_TABLE,
    RATE_MESSAGE_COLUMN, RESULTS_MESSAGE_COLUMN, THREAD_COLUMN,
};
use crate::store::{Cell, Record, StoreClient};
use crate::types::PostMetadata;

#[derive(Debug, Clone)]
struct Entry {
    meta: PostMetadata,
    /// Sheet row backing this entry.
    row: usize,
}

pub struct MetadataStore {
    store: Arc<StoreClient>,
    entries: Mutex<HashMap<String, Entry>>,
}

/// Parse a purely numeric, non-zero identifier.
fn parse_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u64>().ok().filter(|id| *id > 0)
}

/// Validate one Metadata row. Rows without a numeric thread id or with a
/// blank entity id are rejected; message ids are optional.
pub fn parse_metadata_row(record: &Record<'_>) -> Option<PostMetadata> {
    let thread_id = parse_id(record.get(THREAD_COLUMN))?;
    let entity_id = record.get(ENTITY_COLUMN).trim();
    if entity_id.is_empty() {
        return None;
    }
    Some(PostMetadata {
        entity_id: entity_id.to_string(),
        thread_id,
        rate_message_id: parse_id(record.get(RATE_MESSAGE_COLUMN)),
        results_message_id: parse_id(record.get(RESULTS_MESSAGE_COLUMN)),
    })
}

fn id_cell(id: Option<u64>) -> Cell {
    id.map(|v| Cell::Text(v.to_string())).unwrap_or(Cell::Empty)
}

impl MetadataStore {
    pub fn new(store: Arc<StoreClient>) -> Self {
        Self {
            store,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Create the table if needed and load every valid row.
    ///
    /// When an entity appears on several rows the last one wins, matching
    /// the append-on-move behaviour of [`save`](Self::save).
    pub async fn load(&self) -> Result<HashMap<String, PostMetadata>, StoreError> {
        let table = {
            let writer = self.store.write().await;
            writer.ensure_table(METADATA_TABLE, &METADATA_HEADER).await?;
            writer.read_table(METADATA_TABLE).await?
        };

        let mut loaded = HashMap::new();
        let mut skipped = 0usize;
        for record in table.records() {
            match parse_metadata_row(&record) {
                Some(meta) => {
                    let row = record.sheet_row();
                    loaded.insert(meta.entity_id.clone(), Entry { meta, row });
                }
                None => skipped += 1,
            }
        }

        if loaded.is_empty() {
            info!("Metadata table is empty or every row is invalid");
        } else {
            let mut ids: Vec<&str> = loaded.keys().map(String::as_str).collect();
            ids.sort_unstable();
            info!("Loaded metadata for {} entities: {}", ids.len(), ids.join(", "));
        }
        if skipped > 0 {
            debug!("Skipped {} invalid metadata rows", skipped);
        }

        let result = loaded
            .iter()
            .map(|(k, e)| (k.clone(), e.meta.clone()))
            .collect();
        *self.entries.lock().await = loaded;
        Ok(result)
    }

    /// Persist where an entity's messages live.
    ///
    /// If the entity is already tracked in the same thread, only the message
    /// ids passed as `Some` are patched in place. Otherwise a new row is
    /// appended and becomes the entity's entry.
    pub async fn save(
        &self,
        entity_id: &str,
        thread_id: u64,
        rate_message_id: Option<u64>,
        results_message_id: Option<u64>,
    ) -> Result<PostMetadata, StoreError> {
        let mut entries = self.entries.lock().await;
        let writer = self.store.write().await;

        if let Some(entry) = entries.get_mut(entity_id) {
            if entry.meta.thread_id == thread_id {
                let patches = [
                    (METADATA_RATE_COLUMN, rate_message_id, entry.meta.rate_message_id),
                    (METADATA_RESULTS_COLUMN, results_message_id, entry.meta.results_message_id),
                ];
                for (column, new, old) in patches {
                    if new.is_some() && new != old {
                        writer
                            .update_cell(METADATA_TABLE, entry.row, column, &id_cell(new))
                            .await?;
                    }
                }
                if rate_message_id.is_some() {
                    entry.meta.rate_message_id = rate_message_id;
                }
                if results_message_id.is_some() {
                    entry.meta.results_message_id = results_message_id;
                }
                info!(entity_id, thread_id, row = entry.row, "Updated metadata in place");
                return Ok(entry.meta.clone());
            }
        }

        let meta = PostMetadata {
            entity_id: entity_id.to_string(),
            thread_id,
            rate_message_id,
            results_message_id,
        };
        let row = writer
            .append_row(
                METADATA_TABLE,
                &[
                    Cell::Text(thread_id.to_string()),
                    Cell::text(entity_id),
                    id_cell(rate_message_id),
                    id_cell(results_message_id),
                ],
            )
            .await?;
        info!(entity_id, thread_id, row, "Saved metadata");
        entries.insert(
            entity_id.to_string(),
            Entry {
                meta: meta.clone(),
                row,
            },
        );
        Ok(meta)
    }

    pub async fn get(&self, entity_id: &str) -> Option<PostMetadata> {
        self.entries.lock().await.get(entity_id).map(|e| e.meta.clone())
    }

    /// All known entries, ordered by entity id.
    pub async fn snapshot(&self) -> Vec<PostMetadata> {
        let mut all: Vec<PostMetadata> = self
            .entries
            .lock()
            .await
            .values()
            .map(|e| e.meta.clone())
            .collect();
        all.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        all
    }
}
