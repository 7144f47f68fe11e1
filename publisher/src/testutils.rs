use crate::mapping::MappingConfig;
use crate::payload::Object;
use serde_json::{Value, json};
use tabstore::MemoryStore;

pub const MAPPING_YAML: &str = r#"
tabs:
  main: Main
  processes: Processes
keys:
  main_pk_col: RowID
  processes_fk_col: ID
  processes_uid_col: UID
  processes_pk_col: Row ID
main_mapping:
  row_id: RowID
  Qty: Qty
  Vendor: Vendor
process_mapping:
  row_id: ID
  UID: UID
  Process: Process
  Status: Status
"#;

pub const T0: &str = "2026-01-01T00:00:00+00:00";
pub const NOW: &str = "2026-10-17T12:00:00+00:00";

pub fn mapping() -> MappingConfig {
    serde_yaml::from_str(MAPPING_YAML).unwrap()
}

pub fn fixed_clock() -> String {
    NOW.to_string()
}

pub fn body(value: Value) -> Object {
    value.as_object().cloned().unwrap()
}

pub fn main_header() -> Vec<Value> {
    ["RowID", "Qty", "Vendor", "is_deleted", "deleted_at", "updated_at"]
        .map(Value::from)
        .to_vec()
}

pub fn process_header() -> Vec<Value> {
    [
        "ID", "UID", "Row ID", "Process", "Status", "is_deleted", "deleted_at", "updated_at",
    ]
    .map(Value::from)
    .to_vec()
}

/// Parent R1 with processes P1 and P2, and parent R2 whose process reuses the
/// uid P1.
pub fn seeded_store() -> MemoryStore {
    MemoryStore::new()
        .with_tab(
            "Main",
            vec![
                main_header(),
                vec![json!("R1"), json!("1"), json!("Acme"), json!(""), json!(""), json!(T0)],
                vec![json!("R2"), json!("2"), json!("Bolt")],
            ],
        )
        .with_tab(
            "Processes",
            vec![
                process_header(),
                vec![json!("R1"), json!("P1"), json!("AAAAAAA"), json!("Cut"), json!("open")],
                vec![json!("R2"), json!("P1"), json!("BBBBBBB"), json!("Weld"), json!("open")],
                vec![json!("R1"), json!("P2"), json!("CCCCCCC"), json!("Paint"), json!("open")],
            ],
        )
}
