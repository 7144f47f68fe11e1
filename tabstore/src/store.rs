use crate::range::A1Range;
use async_trait::async_trait;

/// A single cell value. Values are persisted exactly as given (strings stay
/// strings, booleans stay booleans); reads usually come back as strings.
pub type Cell = serde_json::Value;
pub type Row = Vec<Cell>;
pub type Grid = Vec<Row>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("sheets API returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

/// The operations the publisher needs from a spreadsheet.
///
/// Each call is independent. `batch_write` sends every range in one request but
/// the store applies ranges individually; there is no transaction across them.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Reads a rectangular range. Rows come back with trailing empty cells
    /// dropped, and an empty range yields an empty grid.
    async fn read(&self, range: &A1Range) -> Result<Grid, StoreError>;

    /// Overwrites the cells of `range`, starting at its top-left cell.
    async fn write(&self, range: &A1Range, values: Grid) -> Result<(), StoreError>;

    /// Adds `row` after the last populated row of `tab`.
    async fn append(&self, tab: &str, row: Row) -> Result<(), StoreError>;

    /// Writes several disjoint ranges in one request.
    async fn batch_write(&self, updates: Vec<(A1Range, Grid)>) -> Result<(), StoreError>;
}

/// Renders a cell the way it is compared against keys: strings as-is, null as
/// empty, everything else in its JSON form.
pub fn cell_text(cell: &Cell) -> String {
    match cell {
        Cell::Null => String::new(),
        Cell::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn is_blank(cell: &Cell) -> bool {
    match cell {
        Cell::Null => true,
        Cell::String(s) => s.is_empty(),
        _ => false,
    }
}
