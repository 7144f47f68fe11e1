//! Finding rows by key.

use crate::errors::{PublishError, Result};
use crate::patch::fit_width;
use crate::schema::column_index;
use tabstore::{A1Range, Row, TabularStore, cell_text};

/// A data row together with its 1-based sheet row number.
#[derive(Clone, Debug, PartialEq)]
pub struct SheetRow {
    pub number: u32,
    pub values: Row,
}

/// Reads every data row of `tab` (row 2 onward) in one request.
pub async fn read_data_rows(store: &dyn TabularStore, tab: &str) -> Result<Vec<SheetRow>> {
    let rows = store.read(&A1Range::all_rows(tab)).await?;
    Ok(rows
        .into_iter()
        .zip(1u32..)
        .skip(1)
        .map(|(values, number)| SheetRow { number, values })
        .collect())
}

/// Reads the first `width` cells of sheet row `row`, padded to `width`.
pub async fn read_row(store: &dyn TabularStore, tab: &str, row: u32, width: usize) -> Result<Row> {
    let rows = store.read(&A1Range::row_cells(tab, row, width)).await?;
    let current = rows.into_iter().next().unwrap_or_default();
    Ok(fit_width(current, width))
}

/// Returns the sheet row number of the first data row whose `key_column` cell
/// matches `key_value` after trimming both sides.
pub async fn find_row(
    store: &dyn TabularStore,
    tab: &str,
    headers: &[String],
    key_column: &str,
    key_value: &str,
) -> Result<Option<u32>> {
    let key_idx = key_index(tab, headers, key_column)?;
    let rows = read_data_rows(store, tab).await?;
    Ok(first_match(&rows, key_idx, key_value).map(|row| row.number))
}

/// Index of `key_column`, or [`PublishError::KeyColumnMissing`].
pub fn key_index(tab: &str, headers: &[String], key_column: &str) -> Result<usize> {
    column_index(headers, key_column).ok_or_else(|| PublishError::KeyColumnMissing {
        tab: tab.to_string(),
        column: key_column.to_string(),
    })
}

/// Trimmed text of the cell at `idx`; short rows read as empty.
pub fn cell_key(row: &Row, idx: usize) -> String {
    row.get(idx).map(cell_text).unwrap_or_default().trim().to_string()
}

fn first_match<'a>(rows: &'a [SheetRow], key_idx: usize, key_value: &str) -> Option<&'a SheetRow> {
    let wanted = key_value.trim();
    rows.iter().find(|row| cell_key(&row.values, key_idx) == wanted)
}
