//! Header management. Row 1 of every tab is the header; columns are looked
//! up by name, so the header is the schema.

use crate::errors::{PublishError, Result};
use crate::metrics_defs::HEADER_EXTENSIONS;
use shared::counter;
use std::collections::HashSet;
use tabstore::{A1Range, TabularStore, cell_text};

/// Reads the header row of `tab`. An empty tab has an empty header.
pub async fn read_headers(store: &dyn TabularStore, tab: &str) -> Result<Vec<String>> {
    let rows = store.read(&A1Range::header(tab)).await?;
    Ok(rows
        .into_iter()
        .next()
        .map(|row| row.iter().map(cell_text).collect())
        .unwrap_or_default())
}

/// Makes sure every column in `required` exists on `tab` and returns the
/// resulting header.
///
/// An empty header is replaced by `required`. Otherwise missing columns are
/// appended after the existing ones when `auto_extend` is set, and reported as
/// [`PublishError::SchemaMismatch`] when it is not. The header row is written
/// at most once.
pub async fn ensure_columns(
    store: &dyn TabularStore,
    tab: &str,
    required: &[&str],
    auto_extend: bool,
) -> Result<Vec<String>> {
    let headers = read_headers(store, tab).await?;
    let required = uniq(required);

    if headers.is_empty() {
        tracing::info!(tab, columns = ?required, "Writing header row to empty tab");
        store
            .write(&A1Range::header(tab), vec![to_row(&required)])
            .await?;
        return Ok(required);
    }

    let missing: Vec<String> = required
        .into_iter()
        .filter(|col| !headers.contains(col))
        .collect();
    if missing.is_empty() {
        return Ok(headers);
    }

    if !auto_extend {
        return Err(PublishError::SchemaMismatch {
            tab: tab.to_string(),
            missing,
        });
    }

    tracing::info!(tab, missing = ?missing, "Extending header row");
    counter!(HEADER_EXTENSIONS).increment(missing.len() as u64);

    let mut extended = headers;
    extended.extend(missing);
    store
        .write(&A1Range::header(tab), vec![to_row(&extended)])
        .await?;
    Ok(extended)
}

/// Position of `column` in `headers`.
pub fn column_index(headers: &[String], column: &str) -> Option<usize> {
    headers.iter().position(|h| h == column)
}

/// Drops blanks and repeats, keeping first-seen order.
fn uniq(columns: &[&str]) -> Vec<String> {
    let mut seen = HashSet::new();
    columns
        .iter()
        .filter(|col| !col.is_empty() && seen.insert(**col))
        .map(|col| col.to_string())
        .collect()
}

fn to_row(headers: &[String]) -> tabstore::Row {
    headers
        .iter()
        .map(|h| serde_json::Value::String(h.clone()))
        .collect()
}
