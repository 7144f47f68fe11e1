//! In-process store with the same read/write semantics as the Sheets API:
//! reads drop trailing empty cells and trailing empty rows, writes overwrite
//! from the range origin, appends land after the last populated row.

use crate::range::{A1Range, Span};
use crate::store::{Cell, Grid, Row, StoreError, TabularStore, is_blank};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// One call made against a [`MemoryStore`], recorded in order.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreCall {
    Read(A1Range),
    Write(A1Range),
    Append(String),
    BatchWrite(Vec<A1Range>),
}

#[derive(Default)]
pub struct MemoryStore {
    tabs: Mutex<HashMap<String, Grid>>,
    calls: Mutex<Vec<StoreCall>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `tab` with `rows`, header first.
    pub fn with_tab(self, tab: &str, rows: Grid) -> Self {
        self.tabs.lock().insert(tab.to_string(), rows);
        self
    }

    /// Snapshot of a tab as stored, without any trimming.
    pub fn tab(&self, tab: &str) -> Grid {
        self.tabs.lock().get(tab).cloned().unwrap_or_default()
    }

    /// Number of populated rows in `tab`, header included.
    pub fn row_count(&self, tab: &str) -> usize {
        populated_len(&self.tab(tab))
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().push(call);
    }

    fn write_cells(&self, range: &A1Range, values: Grid) {
        let (row, col) = range.origin();
        let mut tabs = self.tabs.lock();
        let grid = tabs.entry(range.tab.clone()).or_default();

        for (i, values_row) in values.into_iter().enumerate() {
            let row_idx = (row as usize - 1) + i;
            if grid.len() <= row_idx {
                grid.resize(row_idx + 1, Vec::new());
            }
            let target = &mut grid[row_idx];
            for (j, value) in values_row.into_iter().enumerate() {
                let col_idx = (col as usize - 1) + j;
                if target.len() <= col_idx {
                    target.resize(col_idx + 1, Cell::String(String::new()));
                }
                target[col_idx] = value;
            }
        }
    }
}

#[async_trait]
impl TabularStore for MemoryStore {
    async fn read(&self, range: &A1Range) -> Result<Grid, StoreError> {
        self.record(StoreCall::Read(range.clone()));

        let tabs = self.tabs.lock();
        let Some(grid) = tabs.get(&range.tab) else {
            return Ok(Vec::new());
        };

        let rows: Grid = match range.span {
            Span::Row(row) => slice_row(grid, row, 1, None).into_iter().collect(),
            Span::RowCells { row, width } => {
                slice_row(grid, row, 1, Some(width)).into_iter().collect()
            }
            Span::Columns { first, last } => (1..=grid.len() as u32)
                .map(|row| slice_row(grid, row, first, Some(last - first + 1)).unwrap_or_default())
                .collect(),
        };

        Ok(trim_trailing_rows(rows))
    }

    async fn write(&self, range: &A1Range, values: Grid) -> Result<(), StoreError> {
        self.record(StoreCall::Write(range.clone()));
        self.write_cells(range, values);
        Ok(())
    }

    async fn append(&self, tab: &str, row: Row) -> Result<(), StoreError> {
        self.record(StoreCall::Append(tab.to_string()));

        let mut tabs = self.tabs.lock();
        let grid = tabs.entry(tab.to_string()).or_default();
        let next = populated_len(grid);
        grid.truncate(next);
        grid.push(row);
        Ok(())
    }

    async fn batch_write(&self, updates: Vec<(A1Range, Grid)>) -> Result<(), StoreError> {
        self.record(StoreCall::BatchWrite(
            updates.iter().map(|(range, _)| range.clone()).collect(),
        ));

        for (range, values) in updates {
            self.write_cells(&range, values);
        }
        Ok(())
    }
}

/// Cells of sheet row `row` from column `first`, at most `width` of them, with
/// trailing blanks removed. `None` when the row does not exist or is empty.
fn slice_row(grid: &Grid, row: u32, first: u32, width: Option<u32>) -> Option<Row> {
    let cells = grid.get(row.checked_sub(1)? as usize)?;
    let start = (first as usize - 1).min(cells.len());
    let end = match width {
        Some(width) => (start + width as usize).min(cells.len()),
        None => cells.len(),
    };

    let mut out = cells[start..end].to_vec();
    while out.last().is_some_and(is_blank) {
        out.pop();
    }
    (!out.is_empty()).then_some(out)
}

fn trim_trailing_rows(mut rows: Grid) -> Grid {
    while rows.last().is_some_and(|row| row.is_empty()) {
        rows.pop();
    }
    rows
}

fn populated_len(grid: &Grid) -> usize {
    grid.iter()
        .rposition(|row| row.iter().any(|cell| !is_blank(cell)))
        .map_or(0, |idx| idx + 1)
}
