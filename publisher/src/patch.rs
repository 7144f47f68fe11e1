//! Pure row edits. Nothing here touches the store.

use crate::schema::column_index;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tabstore::{Cell, Row};

/// Pads `row` with empty cells or cuts it so it has exactly `width` cells.
pub fn fit_width(mut row: Row, width: usize) -> Row {
    row.resize(width, Cell::String(String::new()));
    row
}

/// Applies the mapped fields of `payload` on top of `current`.
///
/// Only keys present in the payload with a non-null value are written; every
/// other cell keeps its current value. Values are copied verbatim.
pub fn patch_row(
    headers: &[String],
    current: Row,
    payload: &Map<String, Value>,
    mapping: &IndexMap<String, String>,
) -> Row {
    let mut out = fit_width(current, headers.len());
    for (payload_key, column) in mapping {
        let Some(idx) = column_index(headers, column) else {
            continue;
        };
        match payload.get(payload_key) {
            None | Some(Value::Null) => continue,
            Some(value) => out[idx] = value.clone(),
        }
    }
    out
}

/// Overwrites one cell by column name. A column missing from `headers` is
/// ignored.
pub fn set_cell(headers: &[String], row: &mut Row, column: &str, value: Cell) {
    if let Some(idx) = column_index(headers, column) {
        if row.len() <= idx {
            row.resize(idx + 1, Cell::String(String::new()));
        }
        row[idx] = value;
    }
}
