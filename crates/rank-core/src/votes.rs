//! Per-voter vote rows: find-or-create, then write one category.

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::retry::RetryPolicy;
use crate::schema::{ENTITY_COLUMN, VOTER_COLUMN, VOTES_HEADER, VOTES_TABLE};
use crate::store::{Cell, HeaderStatus, StoreClient};
use crate::types::{Category, Rating};

/// Outcome of a successful upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteWrite {
    /// Sheet row that now holds the vote.
    pub row: usize,
    /// Whether the row had to be appended first.
    pub created: bool,
}

pub struct VoteBook {
    store: Arc<StoreClient>,
    retry: RetryPolicy,
}

impl VoteBook {
    pub fn new(store: Arc<StoreClient>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Record `rating` for `category` on the voter's row for `entity_id`,
    /// creating the row on first vote. Transient store errors are retried
    /// under the configured policy.
    ///
    /// The write lock is held for the whole read-append-update sequence, so
    /// two first votes from the same voter inside this process resolve to a
    /// single row. Writers outside this process are not coordinated with.
    pub async fn upsert(
        &self,
        entity_id: &str,
        voter_id: &str,
        category: Category,
        rating: Rating,
    ) -> Result<VoteWrite, StoreError> {
        self.retry
            .run(
                "vote upsert",
                || self.try_upsert(entity_id, voter_id, category, rating),
                StoreError::is_transient,
            )
            .await
    }

    async fn try_upsert(
        &self,
        entity_id: &str,
        voter_id: &str,
        category: Category,
        rating: Rating,
    ) -> Result<VoteWrite, StoreError> {
        let writer = self.store.write().await;
        let table = writer.read_table(VOTES_TABLE).await?;

        let existing = table.find_row(|r| {
            r.get(ENTITY_COLUMN).trim() == entity_id && r.get(VOTER_COLUMN).trim() == voter_id
        });

        let (row, created) = match existing {
            Some(row) => (row, false),
            None => {
                let row = writer
                    .append_row(
                        VOTES_TABLE,
                        &[
                            Cell::text(entity_id),
                            Cell::text(voter_id),
                            Cell::Empty,
                            Cell::Empty,
                            Cell::Empty,
                        ],
                    )
                    .await?;
                debug!(entity_id, voter_id, row, "Created vote row");
                (row, true)
            }
        };

        writer
            .update_cell(
                VOTES_TABLE,
                row,
                category.vote_column(),
                &Cell::Int(i64::from(rating.value())),
            )
            .await?;

        info!(entity_id, voter_id, %category, %rating, row, "Recorded vote");
        Ok(VoteWrite { row, created })
    }

    /// Create the Votes table or repair its header row.
    pub async fn ensure_header(&self) -> Result<HeaderStatus, StoreError> {
        let writer = self.store.write().await;
        writer.ensure_table(VOTES_TABLE, &VOTES_HEADER).await
    }
}
