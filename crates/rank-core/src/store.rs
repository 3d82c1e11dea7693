//! Spreadsheet store seam and the lock-serialized client wrapped around it.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::schema::DEFAULT_TABLE_ROWS;

/// A value written into a single cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Empty,
    /// Stored verbatim; used for identifiers so large ids keep every digit.
    Text(String),
    Int(i64),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Int(n) => write!(f, "{n}"),
        }
    }
}

/// Raw table access offered by a spreadsheet backend.
///
/// Rows and columns are 1-based, row 1 being the header.
#[async_trait]
pub trait SheetStore: Send + Sync {
    async fn has_table(&self, table: &str) -> Result<bool, StoreError>;

    async fn create_table(&self, table: &str, rows: usize, columns: usize) -> Result<(), StoreError>;

    /// Every row of the table, header included. Trailing empty cells may be omitted.
    async fn read_values(&self, table: &str) -> Result<Vec<Vec<String>>, StoreError>;

    async fn read_row(&self, table: &str, row: usize) -> Result<Vec<String>, StoreError>;

    async fn write_row(&self, table: &str, row: usize, values: &[Cell]) -> Result<(), StoreError>;

    /// Append after the last non-empty row and return the row number written.
    async fn append_row(&self, table: &str, values: &[Cell]) -> Result<usize, StoreError>;

    async fn update_cell(
        &self,
        table: &str,
        row: usize,
        column: usize,
        value: &Cell,
    ) -> Result<(), StoreError>;
}

/// Header plus data rows of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn from_values(mut values: Vec<Vec<String>>) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let header = values
            .remove(0)
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();
        Self { header, rows: values }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 0-based index of a header column.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        (0..self.rows.len()).map(move |index| Record { table: self, index })
    }

    /// Sheet row number of the first record matching `pred`.
    pub fn find_row(&self, pred: impl Fn(&Record<'_>) -> bool) -> Option<usize> {
        self.records().find(|r| pred(r)).map(|r| r.sheet_row())
    }
}

/// A data row viewed through its table's header.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    table: &'a Table,
    index: usize,
}

impl<'a> Record<'a> {
    /// Cell under `column`, or `""` when the column or cell is absent.
    pub fn get(&self, column: &str) -> &'a str {
        self.table
            .column(column)
            .and_then(|c| self.table.rows[self.index].get(c))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn sheet_row(&self) -> usize {
        self.index + 2
    }
}

/// What [`StoreWriter::ensure_table`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    Intact,
    Repaired,
    Created,
}

/// Store client shared by every component.
///
/// Reads go straight to the backend. Mutations require a [`StoreWriter`],
/// which holds the single global write lock for as long as it lives, so a
/// read-modify-write sequence performed through one writer is never
/// interleaved with another.
pub struct StoreClient {
    backend: Arc<dyn SheetStore>,
    write_lock: Mutex<()>,
}

impl StoreClient {
    pub fn new(backend: Arc<dyn SheetStore>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn read_table(&self, table: &str) -> Result<Table, StoreError> {
        let values = self.backend.read_values(table).await?;
        Ok(Table::from_values(values))
    }

    /// Acquire the write lock.
    pub async fn write(&self) -> StoreWriter<'_> {
        let guard = self.write_lock.lock().await;
        StoreWriter {
            backend: self.backend.as_ref(),
            _guard: guard,
        }
    }
}

/// Exclusive handle for mutating the store.
pub struct StoreWriter<'a> {
    backend: &'a dyn SheetStore,
    _guard: MutexGuard<'a, ()>,
}

impl StoreWriter<'_> {
    pub async fn read_table(&self, table: &str) -> Result<Table, StoreError> {
        let values = self.backend.read_values(table).await?;
        Ok(Table::from_values(values))
    }

    pub async fn append_row(&self, table: &str, values: &[Cell]) -> Result<usize, StoreError> {
        let row = self.backend.append_row(table, values).await?;
        debug!(table, row, "Appended row");
        Ok(row)
    }

    pub async fn update_cell(
        &self,
        table: &str,
        row: usize,
        column: usize,
        value: &Cell,
    ) -> Result<(), StoreError> {
        self.backend.update_cell(table, row, column, value).await
    }

    /// Make sure `table` exists and its first row is exactly `header`.
    ///
    /// A missing table is created; a missing or mismatched header row is
    /// rewritten in place, blanking any cells past the expected columns.
    pub async fn ensure_table(&self, table: &str, header: &[&str]) -> Result<HeaderStatus, StoreError> {
        let mut cells: Vec<Cell> = header.iter().map(|h| Cell::text(*h)).collect();

        if !self.backend.has_table(table).await? {
            self.backend
                .create_table(table, DEFAULT_TABLE_ROWS, header.len())
                .await?;
            self.backend.write_row(table, 1, &cells).await?;
            info!("Created '{}' table with headers", table);
            return Ok(HeaderStatus::Created);
        }

        let current = self.backend.read_row(table, 1).await?;
        let matches = current.len() >= header.len()
            && current.iter().zip(header).all(|(c, h)| c.trim() == *h)
            && current[header.len()..].iter().all(|c| c.trim().is_empty());
        if matches {
            return Ok(HeaderStatus::Intact);
        }

        cells.resize(current.len().max(header.len()), Cell::Empty);
        self.backend.write_row(table, 1, &cells).await?;
        info!("Rewrote header row of '{}' (found {:?})", table, current);
        Ok(HeaderStatus::Repaired)
    }
}
