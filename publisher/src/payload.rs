//! Reading the special fields out of a publish payload.

use crate::errors::{PublishError, Result};
use crate::mapping::MappingConfig;
use serde_json::{Map, Value};
use tabstore::{cell_text, is_blank};

pub type Object = Map<String, Value>;

/// First key of `keys` present in `obj`, with its value.
pub fn first_present<'a>(obj: &'a Object, keys: &'a [String]) -> Option<(&'a str, &'a Value)> {
    keys.iter()
        .find_map(|key| obj.get(key).map(|value| (key.as_str(), value)))
}

/// Trimmed text of a payload value; null reads as empty.
pub fn value_text(value: &Value) -> String {
    cell_text(value).trim().to_string()
}

/// Interprets a flag value. Booleans are taken literally; anything else is
/// true only when its trimmed, lower-cased text is `1`, `true`, `yes` or `y`.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        other => matches!(
            value_text(other).to_lowercase().as_str(),
            "1" | "true" | "yes" | "y"
        ),
    }
}

/// The delete flag of `obj`: decided by the first recognized key present.
pub fn delete_flag(obj: &Object, keys: &[String]) -> bool {
    first_present(obj, keys).is_some_and(|(_, value)| truthy(value))
}

/// The parent key of the payload, trimmed and non-blank.
pub fn row_id(body: &Object, mapping: &MappingConfig) -> Result<String> {
    let keys = &mapping.payload.row_id_keys;
    first_present(body, keys)
        .map(|(_, value)| value_text(value))
        .filter(|id| !id.is_empty())
        .ok_or_else(|| PublishError::MissingKey(display_key(keys)))
}

/// The child list of the payload.
///
/// `None` means the payload has no child-list field at all and children must be
/// left alone. A present field yields the list of object entries (non-objects
/// are dropped); null and blank strings yield an empty list.
pub fn child_list(body: &Object, mapping: &MappingConfig) -> Result<Option<Vec<Object>>> {
    let Some((key, raw)) = first_present(body, &mapping.payload.processes_keys) else {
        return Ok(None);
    };

    let decoded;
    let value = match raw {
        Value::String(s) if s.trim().is_empty() => return Ok(Some(Vec::new())),
        Value::String(s) => {
            decoded = serde_json::from_str::<Value>(&escape_control_chars(s.trim())).map_err(
                |e| PublishError::InvalidChildListEncoding {
                    key: key.to_string(),
                    reason: e.to_string(),
                },
            )?;
            &decoded
        }
        other => other,
    };

    match value {
        Value::Null => Ok(Some(Vec::new())),
        Value::Array(items) => Ok(Some(
            items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect(),
        )),
        _ => Err(PublishError::InvalidChildListType(key.to_string())),
    }
}

/// The unique identifier of a child, trimmed and non-blank.
pub fn child_uid(child: &Object, mapping: &MappingConfig, index: usize) -> Result<String> {
    let keys = &mapping.payload.process_uid_keys;
    keys.iter()
        .filter_map(|key| child.get(key))
        .map(value_text)
        .find(|uid| !uid.is_empty())
        .ok_or_else(|| PublishError::MissingChildKey {
            key: display_key(keys),
            index,
        })
}

/// The row-local key a child brought with it, if any.
pub fn child_row_key(child: &Object, mapping: &MappingConfig) -> Option<String> {
    first_present(child, &mapping.payload.process_row_id_keys)
        .map(|(_, value)| value_text(value))
        .filter(|key| !key.is_empty())
}

/// True when every mapped main field other than the row key is blank or absent.
pub fn main_fields_blank(body: &Object, mapping: &MappingConfig) -> bool {
    mapping
        .main_mapping
        .keys()
        .filter(|key| !mapping.payload.row_id_keys.contains(key))
        .all(|key| body.get(key).is_none_or(|value| is_blank_value(value)))
}

fn is_blank_value(value: &Value) -> bool {
    is_blank(value) || value.as_str().is_some_and(|s| s.trim().is_empty())
}

fn display_key(keys: &[String]) -> String {
    keys.first().cloned().unwrap_or_default()
}

/// App platforms embed child lists as JSON text that sometimes carries raw
/// newlines or tabs inside string literals. Those are escaped so the text
/// parses; control characters outside strings are left for the parser to
/// reject.
fn escape_control_chars(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in raw.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            } else if (c as u32) < 0x20 {
                match c {
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    other => out.push_str(&format!("\\u{:04x}", other as u32)),
                }
                continue;
            }
        } else if c == '"' {
            in_string = true;
        }
        out.push(c);
    }
    out
}
