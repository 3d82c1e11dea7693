//! In-process [`SheetStore`] used by tests and dry runs.
//!
//! Supports failure injection per operation, per-table read counters and an
//! artificial read latency, which is enough to reproduce quota exhaustion,
//! flaky writes and concurrent refreshers without a network.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use crate::error::StoreError;
use crate::store::{Cell, SheetStore};

/// Operation selector for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    HasTable,
    CreateTable,
    ReadValues,
    ReadRow,
    WriteRow,
    AppendRow,
    UpdateCell,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<String, Vec<Vec<String>>>>,
    reads: Mutex<HashMap<String, usize>>,
    failures: Mutex<VecDeque<(StoreOp, StoreError)>>,
    read_delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a table with the given rows (header first).
    pub fn insert_table(&self, table: &str, rows: Vec<Vec<String>>) {
        self.tables.lock().insert(table.to_string(), rows);
    }

    /// Snapshot of a table's rows, header included. Empty if absent.
    pub fn rows(&self, table: &str) -> Vec<Vec<String>> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    /// Number of full-table reads issued against `table`.
    pub fn read_count(&self, table: &str) -> usize {
        self.reads.lock().get(table).copied().unwrap_or(0)
    }

    /// Make the next call of `op` fail with `err`. Queued failures are consumed in order.
    pub fn fail_next(&self, op: StoreOp, err: StoreError) {
        self.failures.lock().push_back((op, err));
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock() = Some(delay);
    }

    fn take_failure(&self, op: StoreOp) -> Result<(), StoreError> {
        let mut failures = self.failures.lock();
        match failures.iter().position(|(o, _)| *o == op) {
            Some(i) => Err(failures.remove(i).map(|(_, e)| e).unwrap_or(StoreError::RateLimited)),
            None => Ok(()),
        }
    }

    fn with_table<T>(
        &self,
        table: &str,
        f: impl FnOnce(&mut Vec<Vec<String>>) -> T,
    ) -> Result<T, StoreError> {
        let mut tables = self.tables.lock();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::MissingTable(table.to_string()))?;
        Ok(f(rows))
    }
}

fn ensure_row(rows: &mut Vec<Vec<String>>, row: usize) -> &mut Vec<String> {
    if rows.len() < row {
        rows.resize(row, Vec::new());
    }
    &mut rows[row - 1]
}

fn last_filled_row(rows: &[Vec<String>]) -> usize {
    rows.iter()
        .rposition(|r| r.iter().any(|c| !c.is_empty()))
        .map(|i| i + 1)
        .unwrap_or(0)
}

#[async_trait]
impl SheetStore for MemoryStore {
    async fn has_table(&self, table: &str) -> Result<bool, StoreError> {
        self.take_failure(StoreOp::HasTable)?;
        Ok(self.tables.lock().contains_key(table))
    }

    async fn create_table(&self, table: &str, _rows: usize, _columns: usize) -> Result<(), StoreError> {
        self.take_failure(StoreOp::CreateTable)?;
        self.tables
            .lock()
            .entry(table.to_string())
            .or_insert_with(Vec::new);
        Ok(())
    }

    async fn read_values(&self, table: &str) -> Result<Vec<Vec<String>>, StoreError> {
        *self.reads.lock().entry(table.to_string()).or_insert(0) += 1;
        let delay = *self.read_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.take_failure(StoreOp::ReadValues)?;
        self.with_table(table, |rows| rows.clone())
    }

    async fn read_row(&self, table: &str, row: usize) -> Result<Vec<String>, StoreError> {
        self.take_failure(StoreOp::ReadRow)?;
        self.with_table(table, |rows| rows.get(row - 1).cloned().unwrap_or_default())
    }

    async fn write_row(&self, table: &str, row: usize, values: &[Cell]) -> Result<(), StoreError> {
        self.take_failure(StoreOp::WriteRow)?;
        // Like a range write: cells past `values` keep their contents.
        self.with_table(table, |rows| {
            let target = ensure_row(rows, row);
            for (i, value) in values.iter().enumerate() {
                match target.get_mut(i) {
                    Some(cell) => *cell = value.to_string(),
                    None => target.push(value.to_string()),
                }
            }
        })
    }

    async fn append_row(&self, table: &str, values: &[Cell]) -> Result<usize, StoreError> {
        self.take_failure(StoreOp::AppendRow)?;
        self.with_table(table, |rows| {
            let row = last_filled_row(rows) + 1;
            *ensure_row(rows, row) = values.iter().map(Cell::to_string).collect();
            row
        })
    }

    async fn update_cell(
        &self,
        table: &str,
        row: usize,
        column: usize,
        value: &Cell,
    ) -> Result<(), StoreError> {
        self.take_failure(StoreOp::UpdateCell)?;
        self.with_table(table, |rows| {
            let cells = ensure_row(rows, row);
            if cells.len() < column {
                cells.resize(column, String::new());
            }
            cells[column - 1] = value.to_string();
        })
    }
}
