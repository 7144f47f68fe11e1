//! Upsert / soft-delete reconciliation of one publish payload against the
//! main and processes tabs.
//!
//! A publish runs in three phases:
//!
//! 1. Validation. The row key, the child list and every child identifier are
//!    checked before anything is written.
//! 2. Planning. Headers are ensured, rows are located and the new content of
//!    every touched row is computed. All row numbers are captured here.
//! 3. Applying. New rows are appended, then every in-place patch is sent as a
//!    single batch. Appends land after the last row and never move an existing
//!    one, so the row numbers captured in phase 2 stay valid.
//!
//! Nothing is rolled back: if an append or the batch fails, writes already
//! made stay in the sheet.

use crate::errors::Result;
use crate::ids::{ROW_KEY_LEN, alnum_id};
use crate::locate::{SheetRow, cell_key, find_row, key_index, read_data_rows, read_row};
use crate::locks::KeyLocks;
use crate::mapping::MappingConfig;
use crate::metrics_defs::{PROCESS_ACTIONS, PUBLISH_REQUESTS};
use crate::patch::{fit_width, patch_row, set_cell};
use crate::payload::{self, Object};
use crate::schema::{ensure_columns, read_headers};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use shared::counter;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tabstore::{A1Range, Grid, Row, TabularStore};

/// Produces the timestamps written to marker columns and the summary.
pub type Clock = fn() -> String;

/// Current UTC time in RFC 3339 form.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Append missing columns to a header instead of failing.
    pub auto_add_columns: bool,
    /// Treat a payload with every mapped main field blank and no children as
    /// a delete.
    pub infer_empty_delete: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MainAction {
    Add,
    Update,
    SoftDelete,
    /// Delete requested for a key that has no row.
    NoopDelete,
}

impl MainAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MainAction::Add => "add",
            MainAction::Update => "update",
            MainAction::SoftDelete => "soft_delete",
            MainAction::NoopDelete => "noop_delete",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProcessActions {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PublishSummary {
    pub ok: bool,
    pub row_id: String,
    pub main_action: MainAction,
    pub process_actions: ProcessActions,
    pub ts: String,
}

/// Writes decided during planning.
#[derive(Debug, Default)]
struct WritePlan {
    appends: Vec<(String, Row)>,
    patches: Vec<(A1Range, Grid)>,
}

impl WritePlan {
    fn append(&mut self, tab: &str, row: Row) {
        self.appends.push((tab.to_string(), row));
    }

    fn patch(&mut self, tab: &str, row_number: u32, row: Row) {
        let range = A1Range::row_cells(tab, row_number, row.len());
        self.patches.push((range, vec![row]));
    }
}

/// Where a planned process row goes.
enum Target {
    Existing(u32),
    New,
}

struct PlannedRow {
    target: Target,
    values: Row,
}

pub struct Reconciler {
    store: Arc<dyn TabularStore>,
    options: ReconcileOptions,
    locks: KeyLocks,
    clock: Clock,
}

impl Reconciler {
    pub fn new(store: Arc<dyn TabularStore>, options: ReconcileOptions) -> Self {
        Reconciler {
            store,
            options,
            locks: KeyLocks::new(),
            clock: now_iso,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> ReconcileOptions {
        self.options
    }

    /// Reconciles one payload. Requests for the same row key are serialized.
    pub async fn publish(&self, mapping: &MappingConfig, body: &Object) -> Result<PublishSummary> {
        let row_id = payload::row_id(body, mapping)?;
        let children = payload::child_list(body, mapping)?;
        let uids = match &children {
            Some(list) => list
                .iter()
                .enumerate()
                .map(|(index, child)| payload::child_uid(child, mapping, index))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let _guard = self.locks.lock(&row_id).await;
        let now = (self.clock)();

        let seed: Vec<&str> = mapping.updated_at.column().into_iter().collect();
        let main_headers = self
            .ensure_base(&mapping.tabs.main, &main_required(mapping), &seed)
            .await?;
        let process_headers = self
            .ensure_base(&mapping.tabs.processes, &process_required(mapping), &seed)
            .await?;

        let delete = payload::delete_flag(body, &mapping.payload.delete_flag_keys)
            || (self.options.infer_empty_delete
                && payload::main_fields_blank(body, mapping)
                && children.as_ref().is_none_or(|list| list.is_empty()));

        let mut plan = WritePlan::default();
        let main_action = self
            .plan_main(mapping, body, &row_id, delete, main_headers, &now, &mut plan)
            .await?;

        let process_actions = match &children {
            Some(list) => {
                self.plan_processes(
                    mapping,
                    &row_id,
                    list,
                    &uids,
                    process_headers,
                    &now,
                    &mut plan,
                )
                .await?
            }
            None => ProcessActions::default(),
        };

        self.apply(plan).await?;

        tracing::info!(
            row_id = %row_id,
            main_action = main_action.as_str(),
            added = process_actions.added,
            updated = process_actions.updated,
            deleted = process_actions.deleted,
            "Publish reconciled"
        );
        counter!(PUBLISH_REQUESTS, "main_action" => main_action.as_str()).increment(1);
        for (action, count) in [
            ("added", process_actions.added),
            ("updated", process_actions.updated),
            ("deleted", process_actions.deleted),
        ] {
            counter!(PROCESS_ACTIONS, "action" => action).increment(count as u64);
        }

        Ok(PublishSummary {
            ok: true,
            row_id,
            main_action,
            process_actions,
            ts: (self.clock)(),
        })
    }

    async fn ensure(&self, tab: &str, required: &[&str]) -> Result<Vec<String>> {
        ensure_columns(self.store.as_ref(), tab, required, self.options.auto_add_columns).await
    }

    /// Ensures the key and mapped columns of `tab`. A tab without a header is
    /// started with `seed` as well, so a fresh sheet carries those columns
    /// from its first write.
    async fn ensure_base(
        &self,
        tab: &str,
        required: &[&str],
        seed: &[&str],
    ) -> Result<Vec<String>> {
        if read_headers(self.store.as_ref(), tab).await?.is_empty() {
            let mut initial = required.to_vec();
            initial.extend_from_slice(seed);
            return self.ensure(tab, &initial).await;
        }
        self.ensure(tab, required).await
    }

    /// Ensures `extra` on top of `headers`. No store call when they are all
    /// present already.
    async fn extend(
        &self,
        tab: &str,
        headers: Vec<String>,
        extra: &[&str],
    ) -> Result<Vec<String>> {
        if extra.iter().all(|col| headers.iter().any(|h| h == col)) {
            return Ok(headers);
        }
        let mut required: Vec<&str> = headers.iter().map(String::as_str).collect();
        required.extend_from_slice(extra);
        self.ensure(tab, &required).await
    }

    async fn ensure_updated_at(
        &self,
        mapping: &MappingConfig,
        tab: &str,
        headers: Vec<String>,
    ) -> Result<Vec<String>> {
        let extra: Vec<&str> = mapping.updated_at.column().into_iter().collect();
        self.extend(tab, headers, &extra).await
    }

    /// Ensures the soft-delete and updated-at columns on top of `headers`.
    async fn ensure_markers(
        &self,
        mapping: &MappingConfig,
        tab: &str,
        headers: Vec<String>,
    ) -> Result<Vec<String>> {
        let mut extra = vec![mapping.soft_delete.col.as_str(), mapping.soft_delete.at_col.as_str()];
        extra.extend(mapping.updated_at.column());
        self.extend(tab, headers, &extra).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn plan_main(
        &self,
        mapping: &MappingConfig,
        body: &Object,
        row_id: &str,
        delete: bool,
        headers: Vec<String>,
        now: &str,
        plan: &mut WritePlan,
    ) -> Result<MainAction> {
        let store = self.store.as_ref();
        let tab = &mapping.tabs.main;
        let pk_col = &mapping.keys.main_pk_col;
        let existing = find_row(store, tab, &headers, pk_col, row_id).await?;

        let action = match (delete, existing) {
            (true, None) => MainAction::NoopDelete,
            (true, Some(row_number)) => {
                let headers = self.ensure_markers(mapping, tab, headers).await?;
                let mut current = read_row(store, tab, row_number, headers.len()).await?;
                mark_deleted(mapping, &headers, &mut current, now);
                plan.patch(tab, row_number, current);
                MainAction::SoftDelete
            }
            (false, None) => {
                let headers = self.ensure_updated_at(mapping, tab, headers).await?;
                let mut new_row = fit_width(Vec::new(), headers.len());
                set_cell(&headers, &mut new_row, pk_col, Value::String(row_id.to_string()));
                let mut new_row = patch_row(&headers, new_row, body, &mapping.main_mapping);
                mark_updated(mapping, &headers, &mut new_row, now);
                plan.append(tab, new_row);
                MainAction::Add
            }
            (false, Some(row_number)) => {
                let headers = self.ensure_updated_at(mapping, tab, headers).await?;
                let current = read_row(store, tab, row_number, headers.len()).await?;
                let mut patched = patch_row(&headers, current, body, &mapping.main_mapping);
                mark_updated(mapping, &headers, &mut patched, now);
                plan.patch(tab, row_number, patched);
                MainAction::Update
            }
        };

        tracing::debug!(row_id, tab = %tab, row = ?existing, action = action.as_str(), "Planned main row");
        Ok(action)
    }

    /// Plans the processes of `row_id`. The incoming list is the full set:
    /// processes recorded for this parent but missing from `children` are
    /// soft-deleted.
    #[allow(clippy::too_many_arguments)]
    async fn plan_processes(
        &self,
        mapping: &MappingConfig,
        row_id: &str,
        children: &[Object],
        uids: &[String],
        headers: Vec<String>,
        now: &str,
        plan: &mut WritePlan,
    ) -> Result<ProcessActions> {
        let tab = &mapping.tabs.processes;
        let keys = &mapping.keys;
        let headers = self.ensure_updated_at(mapping, tab, headers).await?;
        let fk_idx = key_index(tab, &headers, &keys.processes_fk_col)?;
        let uid_idx = key_index(tab, &headers, &keys.processes_uid_col)?;

        let mut existing: HashMap<String, SheetRow> = HashMap::new();
        for row in read_data_rows(self.store.as_ref(), tab).await? {
            if cell_key(&row.values, fk_idx) != row_id {
                continue;
            }
            let uid = cell_key(&row.values, uid_idx);
            if !uid.is_empty() {
                // with duplicate uids the bottom-most row is the one reconciled
                existing.insert(uid, row);
            }
        }

        let incoming: HashSet<&str> = uids.iter().map(String::as_str).collect();
        let mut removed: Vec<&SheetRow> = existing
            .iter()
            .filter(|(uid, _)| !incoming.contains(uid.as_str()))
            .map(|(_, row)| row)
            .collect();
        removed.sort_by_key(|row| row.number);

        let delete_keys = &mapping.payload.delete_flag_keys;
        let any_flagged = children
            .iter()
            .any(|child| payload::delete_flag(child, delete_keys));
        let headers = if any_flagged || (!removed.is_empty() && self.options.auto_add_columns) {
            self.ensure_markers(mapping, tab, headers).await?
        } else {
            headers
        };
        let width = headers.len();

        let row_id_key = first_key(&mapping.payload.row_id_keys);
        let uid_key = first_key(&mapping.payload.process_uid_keys);
        let row_key_key = first_key(&mapping.payload.process_row_id_keys);

        let mut planned: IndexMap<String, PlannedRow> = IndexMap::new();
        for (child, uid) in children.iter().zip(uids) {
            let mut child_payload = child.clone();
            child_payload.insert(row_id_key.to_string(), Value::String(row_id.to_string()));
            child_payload.insert(uid_key.to_string(), Value::String(uid.clone()));

            let supplied_key = payload::child_row_key(child, mapping);
            let (target, base) = if let Some(previous) = planned.shift_remove(uid) {
                // repeated uid in one payload: later entries patch the same row
                (previous.target, previous.values)
            } else if let Some(row) = existing.get(uid) {
                (Target::Existing(row.number), fit_width(row.values.clone(), width))
            } else {
                let row_key = supplied_key.clone().unwrap_or_else(|| alnum_id(ROW_KEY_LEN));
                let mut new_row = fit_width(Vec::new(), width);
                let fk = Value::String(row_id.to_string());
                set_cell(&headers, &mut new_row, &keys.processes_fk_col, fk);
                set_cell(&headers, &mut new_row, &keys.processes_uid_col, Value::String(uid.clone()));
                if let Some(pk_col) = mapping.processes_pk_col() {
                    set_cell(&headers, &mut new_row, pk_col, Value::String(row_key.clone()));
                }
                child_payload.insert(row_key_key.to_string(), Value::String(row_key));
                (Target::New, new_row)
            };
            if let Some(row_key) = supplied_key {
                child_payload.insert(row_key_key.to_string(), Value::String(row_key));
            }

            let mut values = patch_row(&headers, base, &child_payload, &mapping.process_mapping);
            if payload::delete_flag(child, delete_keys) {
                set_cell(&headers, &mut values, &mapping.soft_delete.col, Value::Bool(true));
                let at = Value::String(now.to_string());
                set_cell(&headers, &mut values, &mapping.soft_delete.at_col, at);
            }
            mark_updated(mapping, &headers, &mut values, now);
            planned.insert(uid.clone(), PlannedRow { target, values });
        }

        let mut actions = ProcessActions::default();
        for row in planned.into_values() {
            match row.target {
                Target::Existing(row_number) => {
                    plan.patch(tab, row_number, row.values);
                    actions.updated += 1;
                }
                Target::New => {
                    plan.append(tab, row.values);
                    actions.added += 1;
                }
            }
        }

        for row in removed {
            let mut values = fit_width(row.values.clone(), width);
            mark_deleted(mapping, &headers, &mut values, now);
            plan.patch(tab, row.number, values);
            actions.deleted += 1;
        }
        if actions.deleted > 0 {
            tracing::info!(
                row_id,
                tab = %tab,
                deleted = actions.deleted,
                "Soft-deleting processes missing from payload"
            );
        }

        Ok(actions)
    }

    async fn apply(&self, plan: WritePlan) -> Result<()> {
        for (tab, row) in plan.appends {
            self.store.append(&tab, row).await?;
        }
        if !plan.patches.is_empty() {
            self.store.batch_write(plan.patches).await?;
        }
        Ok(())
    }
}

fn main_required(mapping: &MappingConfig) -> Vec<&str> {
    let mut required = vec![mapping.keys.main_pk_col.as_str()];
    required.extend(mapping.main_mapping.values().map(String::as_str));
    required
}

fn process_required(mapping: &MappingConfig) -> Vec<&str> {
    let keys = &mapping.keys;
    let mut required = vec![keys.processes_fk_col.as_str(), keys.processes_uid_col.as_str()];
    required.extend(mapping.processes_pk_col());
    required.extend(mapping.process_mapping.values().map(String::as_str));
    required
}

fn mark_updated(mapping: &MappingConfig, headers: &[String], row: &mut Row, now: &str) {
    if let Some(col) = mapping.updated_at.column() {
        set_cell(headers, row, col, Value::String(now.to_string()));
    }
}

fn mark_deleted(mapping: &MappingConfig, headers: &[String], row: &mut Row, now: &str) {
    set_cell(headers, row, &mapping.soft_delete.col, Value::Bool(true));
    set_cell(headers, row, &mapping.soft_delete.at_col, Value::String(now.to_string()));
    mark_updated(mapping, headers, row, now);
}

fn first_key(keys: &[String]) -> &str {
    keys.first().map(String::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PublishError;
    use crate::testutils::{NOW, body, fixed_clock, mapping, process_header, seeded_store};
    use serde_json::json;
    use tabstore::{MemoryStore, StoreCall};

    fn row(value: Value) -> Row {
        value.as_array().cloned().unwrap()
    }

    fn reconciler(store: &Arc<MemoryStore>) -> Reconciler {
        reconciler_with(store, ReconcileOptions::default())
    }

    fn reconciler_with(store: &Arc<MemoryStore>, options: ReconcileOptions) -> Reconciler {
        let store: Arc<dyn TabularStore> = store.clone();
        Reconciler::new(store, options).with_clock(fixed_clock)
    }

    fn writes(store: &MemoryStore) -> Vec<StoreCall> {
        store
            .calls()
            .into_iter()
            .filter(|call| !matches!(call, StoreCall::Read(_)))
            .collect()
    }

    #[tokio::test]
    async fn test_add_then_find() {
        let store = Arc::new(seeded_store());
        let summary = reconciler(&store)
            .publish(&mapping(), &body(json!({"row_id": "R9", "Qty": 5})))
            .await
            .unwrap();

        assert_eq!(summary.main_action, MainAction::Add);
        assert_eq!(summary.row_id, "R9");
        assert_eq!(summary.ts, NOW);
        assert_eq!(
            store.tab("Main")[3],
            row(json!(["R9", 5, "", "", "", NOW]))
        );

        let headers: Vec<String> = ["RowID", "Qty"].map(String::from).to_vec();
        let found = find_row(&*store, "Main", &headers, "RowID", "R9")
            .await
            .unwrap();
        assert_eq!(found, Some(4));
        let matches = store
            .tab("Main")
            .iter()
            .filter(|r| r.first() == Some(&json!("R9")))
            .count();
        assert_eq!(matches, 1);
    }

    #[tokio::test]
    async fn test_republish_is_idempotent() {
        let store = Arc::new(seeded_store());
        let reconciler = reconciler(&store);
        let payload = body(json!({"row_id": "R9", "Qty": 5, "Vendor": "X"}));

        let first = reconciler.publish(&mapping(), &payload).await.unwrap();
        let after_first = store.tab("Main");
        let second = reconciler.publish(&mapping(), &payload).await.unwrap();

        assert_eq!(first.main_action, MainAction::Add);
        assert_eq!(second.main_action, MainAction::Update);
        assert_eq!(store.tab("Main"), after_first);
    }

    #[tokio::test]
    async fn test_partial_update_preserves_untouched_fields() {
        let store = Arc::new(seeded_store());
        let summary = reconciler(&store)
            .publish(&mapping(), &body(json!({"row_id": "R1", "Qty": 9})))
            .await
            .unwrap();

        assert_eq!(summary.main_action, MainAction::Update);
        assert_eq!(
            store.tab("Main")[1],
            row(json!(["R1", 9, "Acme", "", "", NOW]))
        );
        assert_eq!(
            writes(&store),
            vec![StoreCall::BatchWrite(vec![A1Range::row_cells("Main", 2, 6)])]
        );
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_row() {
        let store = Arc::new(seeded_store());
        let rows_before = store.row_count("Main");

        let summary = reconciler(&store)
            .publish(&mapping(), &body(json!({"row_id": "R1", "is_deleted": "YES"})))
            .await
            .unwrap();

        assert_eq!(summary.main_action, MainAction::SoftDelete);
        assert_eq!(store.row_count("Main"), rows_before);
        assert_eq!(
            store.tab("Main")[1],
            row(json!(["R1", "1", "Acme", true, NOW, NOW]))
        );
    }

    #[tokio::test]
    async fn test_delete_of_unknown_key_is_noop() {
        let store = Arc::new(seeded_store());
        let summary = reconciler(&store)
            .publish(&mapping(), &body(json!({"row_id": "R404", "is_deleted": true})))
            .await
            .unwrap();

        assert_eq!(summary.main_action, MainAction::NoopDelete);
        assert!(writes(&store).is_empty());
    }

    #[tokio::test]
    async fn test_delete_flag_values() {
        let store = Arc::new(seeded_store());
        let reconciler = reconciler(&store);

        for (flag, expected) in [
            (json!("no"), MainAction::Update),
            (json!(false), MainAction::Update),
            (json!("YES"), MainAction::SoftDelete),
        ] {
            let summary = reconciler
                .publish(&mapping(), &body(json!({"row_id": "R2", "is_deleted": flag})))
                .await
                .unwrap();
            assert_eq!(summary.main_action, expected, "flag {flag}");
        }
    }

    #[tokio::test]
    async fn test_child_inferred_deletion() {
        let store = Arc::new(seeded_store());
        let summary = reconciler(&store)
            .publish(
                &mapping(),
                &body(json!({"row_id": "R1", "processes": [{"UID": "P1", "Process": "Cut v2"}]})),
            )
            .await
            .unwrap();

        assert_eq!(
            summary.process_actions,
            ProcessActions {
                added: 0,
                updated: 1,
                deleted: 1
            }
        );
        let processes = store.tab("Processes");
        assert_eq!(
            processes[1],
            row(json!(["R1", "P1", "AAAAAAA", "Cut v2", "open", "", "", NOW]))
        );
        // same uid under another parent is not touched
        assert_eq!(
            processes[2],
            row(json!(["R2", "P1", "BBBBBBB", "Weld", "open"]))
        );
        assert_eq!(
            processes[3],
            row(json!(["R1", "P2", "CCCCCCC", "Paint", "open", true, NOW, NOW]))
        );
    }

    #[tokio::test]
    async fn test_omitted_child_list_leaves_children_alone() {
        let store = Arc::new(seeded_store());
        let before = store.tab("Processes");

        let summary = reconciler(&store)
            .publish(&mapping(), &body(json!({"row_id": "R1", "Qty": 3})))
            .await
            .unwrap();

        assert_eq!(summary.process_actions, ProcessActions::default());
        assert_eq!(store.tab("Processes"), before);
        assert!(
            !store
                .calls()
                .contains(&StoreCall::Read(A1Range::all_rows("Processes")))
        );
    }

    #[tokio::test]
    async fn test_empty_child_list_deletes_all_children() {
        let store = Arc::new(seeded_store());
        let summary = reconciler(&store)
            .publish(&mapping(), &body(json!({"row_id": "R1", "processes": []})))
            .await
            .unwrap();

        assert_eq!(
            summary.process_actions,
            ProcessActions {
                added: 0,
                updated: 0,
                deleted: 2
            }
        );
        let processes = store.tab("Processes");
        assert_eq!(processes[1][5], json!(true));
        assert_eq!(processes[3][5], json!(true));
        assert_eq!(processes[2].len(), 5);
    }

    #[tokio::test]
    async fn test_new_children_are_appended() {
        let store = Arc::new(seeded_store());
        let summary = reconciler(&store)
            .publish(
                &mapping(),
                &body(json!({
                    "row_id": "R1",
                    "processes": [
                        {"UID": "P1"},
                        {"UID": "P2"},
                        {"UID": "P3", "Process": "Drill"},
                        {"UID": "P4", "_proc_row_id": "ZZZZZZZ"},
                    ]
                })),
            )
            .await
            .unwrap();

        assert_eq!(
            summary.process_actions,
            ProcessActions {
                added: 2,
                updated: 2,
                deleted: 0
            }
        );

        let processes = store.tab("Processes");
        assert_eq!(processes.len(), 6);

        let p3 = &processes[4];
        assert_eq!(p3[0], json!("R1"));
        assert_eq!(p3[1], json!("P3"));
        let generated = p3[2].as_str().unwrap();
        assert_eq!(generated.len(), ROW_KEY_LEN);
        assert!(
            generated
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
        assert_eq!(p3[3], json!("Drill"));
        assert_eq!(p3[7], json!(NOW));

        assert_eq!(
            processes[5],
            row(json!(["R1", "P4", "ZZZZZZZ", "", "", "", "", NOW]))
        );
    }

    #[tokio::test]
    async fn test_child_delete_flag() {
        let store = Arc::new(seeded_store());
        let summary = reconciler(&store)
            .publish(
                &mapping(),
                &body(json!({
                    "row_id": "R1",
                    "processes": [{"UID": "P1", "is_deleted": "y"}, {"UID": "P2"}]
                })),
            )
            .await
            .unwrap();

        assert_eq!(summary.process_actions.updated, 2);
        assert_eq!(summary.process_actions.deleted, 0);
        assert_eq!(
            store.tab("Processes")[1],
            row(json!(["R1", "P1", "AAAAAAA", "Cut", "open", true, NOW, NOW]))
        );
    }

    #[tokio::test]
    async fn test_repeated_uid_yields_one_row() {
        let store = Arc::new(seeded_store());
        let summary = reconciler(&store)
            .publish(
                &mapping(),
                &body(json!({
                    "row_id": "R1",
                    "processes": [
                        {"UID": "P3", "Process": "A"},
                        {"UID": "P3", "Status": "done"},
                    ]
                })),
            )
            .await
            .unwrap();

        assert_eq!(
            summary.process_actions,
            ProcessActions {
                added: 1,
                updated: 0,
                deleted: 2
            }
        );
        let processes = store.tab("Processes");
        assert_eq!(processes.len(), 5);
        assert_eq!(processes[4][3], json!("A"));
        assert_eq!(processes[4][4], json!("done"));
    }

    #[tokio::test]
    async fn test_encoded_child_list() {
        let store = Arc::new(seeded_store());
        let summary = reconciler(&store)
            .publish(
                &mapping(),
                &body(json!({
                    "row_id": "R1",
                    "processes": "[{\"UID\": \"P1\"}, {\"UID\": \"P2\"}]"
                })),
            )
            .await
            .unwrap();

        assert_eq!(
            summary.process_actions,
            ProcessActions {
                added: 0,
                updated: 2,
                deleted: 0
            }
        );
    }

    #[tokio::test]
    async fn test_validation_failures_write_nothing() {
        let store = Arc::new(seeded_store());
        let reconciler = reconciler(&store);

        let err = reconciler
            .publish(
                &mapping(),
                &body(json!({"row_id": "R1", "processes": [{"UID": "P1"}, {"Process": "x"}]})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::MissingChildKey { index: 1, .. }));

        let err = reconciler
            .publish(&mapping(), &body(json!({"Qty": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::MissingKey(_)));

        let err = reconciler
            .publish(&mapping(), &body(json!({"row_id": "R1", "processes": "[oops"})))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::InvalidChildListEncoding { .. }));

        let err = reconciler
            .publish(&mapping(), &body(json!({"row_id": "R1", "processes": 5})))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::InvalidChildListType(_)));

        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_appends_precede_batched_patches() {
        let store = Arc::new(seeded_store());
        reconciler(&store)
            .publish(
                &mapping(),
                &body(json!({
                    "row_id": "R1",
                    "processes": [{"UID": "P1"}, {"UID": "P2"}, {"UID": "P5"}]
                })),
            )
            .await
            .unwrap();

        let calls = store.calls();
        let first_write = calls
            .iter()
            .position(|call| !matches!(call, StoreCall::Read(_)))
            .unwrap();
        assert!(
            calls[first_write..]
                .iter()
                .all(|call| !matches!(call, StoreCall::Read(_)))
        );
        assert_eq!(
            &calls[first_write..],
            &[
                StoreCall::Append("Processes".into()),
                StoreCall::BatchWrite(vec![
                    A1Range::row_cells("Main", 2, 6),
                    A1Range::row_cells("Processes", 2, 8),
                    A1Range::row_cells("Processes", 4, 8),
                ]),
            ]
        );
    }

    #[tokio::test]
    async fn test_schema_mismatch_writes_nothing() {
        let store = Arc::new(MemoryStore::new().with_tab(
            "Main",
            vec![row(json!(["RowID", "Qty", "updated_at"]))],
        ));

        let err = reconciler(&store)
            .publish(&mapping(), &body(json!({"row_id": "R1"})))
            .await
            .unwrap_err();

        match err {
            PublishError::SchemaMismatch { tab, missing } => {
                assert_eq!(tab, "Main");
                assert_eq!(missing, vec!["Vendor"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(writes(&store).is_empty());
    }

    #[tokio::test]
    async fn test_empty_sheet_is_initialized() {
        let store = Arc::new(MemoryStore::new());
        let summary = reconciler(&store)
            .publish(
                &mapping(),
                &body(json!({"row_id": "R1", "Qty": 2, "processes": [{"UID": "P1", "Process": "Cut"}]})),
            )
            .await
            .unwrap();

        assert_eq!(summary.main_action, MainAction::Add);
        assert_eq!(summary.process_actions.added, 1);
        assert_eq!(
            store.tab("Main"),
            vec![
                row(json!(["RowID", "Qty", "Vendor", "updated_at"])),
                row(json!(["R1", 2, "", NOW])),
            ]
        );
        let processes = store.tab("Processes");
        assert_eq!(
            processes[0],
            row(json!(["ID", "UID", "Row ID", "Process", "Status", "updated_at"]))
        );
        assert_eq!(processes[1][..2], [json!("R1"), json!("P1")]);
        assert_eq!(processes[1][3..], [json!("Cut"), json!(""), json!(NOW)]);
    }

    #[tokio::test]
    async fn test_inferred_empty_delete() {
        let store = Arc::new(seeded_store());
        let options = ReconcileOptions {
            infer_empty_delete: true,
            ..Default::default()
        };
        let inferring = reconciler_with(&store, options);

        let summary = inferring
            .publish(
                &mapping(),
                &body(json!({"row_id": "R1", "processes": [{"UID": "P1"}]})),
            )
            .await
            .unwrap();
        assert_eq!(summary.main_action, MainAction::Update);

        let summary = inferring
            .publish(&mapping(), &body(json!({"row_id": "R1", "Qty": ""})))
            .await
            .unwrap();
        assert_eq!(summary.main_action, MainAction::SoftDelete);

        // off by default
        let summary = reconciler(&store)
            .publish(&mapping(), &body(json!({"row_id": "R2"})))
            .await
            .unwrap();
        assert_eq!(summary.main_action, MainAction::Update);
    }

    #[tokio::test]
    async fn test_inferred_delete_marker_columns_follow_policy() {
        let mut header = process_header();
        header.truncate(5);
        header.push(json!("updated_at"));
        let seed = |store: MemoryStore| {
            store.with_tab(
                "Processes",
                vec![
                    header.clone(),
                    row(json!(["R1", "P1", "AAAAAAA", "Cut", "open"])),
                ],
            )
        };
        let payload = body(json!({"row_id": "R1", "processes": []}));

        // without auto extension the markers are skipped, the row is still touched
        let store = Arc::new(seed(seeded_store()));
        let summary = reconciler(&store).publish(&mapping(), &payload).await.unwrap();
        assert_eq!(summary.process_actions.deleted, 1);
        assert_eq!(
            store.tab("Processes")[1],
            row(json!(["R1", "P1", "AAAAAAA", "Cut", "open", NOW]))
        );

        // with it the header grows and the markers are set
        let store = Arc::new(seed(seeded_store()));
        let options = ReconcileOptions {
            auto_add_columns: true,
            ..Default::default()
        };
        reconciler_with(&store, options)
            .publish(&mapping(), &payload)
            .await
            .unwrap();
        let processes = store.tab("Processes");
        assert_eq!(
            processes[0],
            row(json!(["ID", "UID", "Row ID", "Process", "Status", "updated_at", "is_deleted", "deleted_at"]))
        );
        assert_eq!(
            processes[1],
            row(json!(["R1", "P1", "AAAAAAA", "Cut", "open", NOW, true, NOW]))
        );
    }

    #[tokio::test]
    async fn test_main_only_publish_ignores_processes_header() {
        let mut header = process_header();
        header.truncate(5);
        let store = Arc::new(seeded_store().with_tab(
            "Processes",
            vec![header, row(json!(["R1", "P1", "AAAAAAA", "Cut", "open"]))],
        ));
        let before = store.tab("Processes");

        let summary = reconciler(&store)
            .publish(&mapping(), &body(json!({"row_id": "R1", "Qty": 3})))
            .await
            .unwrap();

        assert_eq!(summary.main_action, MainAction::Update);
        assert_eq!(store.tab("Processes"), before);
        assert_eq!(
            writes(&store),
            vec![StoreCall::BatchWrite(vec![A1Range::row_cells("Main", 2, 6)])]
        );
    }

    #[tokio::test]
    async fn test_unknown_delete_needs_no_marker_columns() {
        let store = Arc::new(seeded_store().with_tab(
            "Main",
            vec![row(json!(["RowID", "Qty", "Vendor"]))],
        ));

        let summary = reconciler(&store)
            .publish(&mapping(), &body(json!({"row_id": "R9", "is_deleted": true})))
            .await
            .unwrap();

        assert_eq!(summary.main_action, MainAction::NoopDelete);
        assert!(writes(&store).is_empty());
    }

    #[tokio::test]
    async fn test_child_list_needs_updated_at_on_processes() {
        let mut header = process_header();
        header.truncate(5);
        let store = Arc::new(seeded_store().with_tab("Processes", vec![header]));

        let err = reconciler(&store)
            .publish(&mapping(), &body(json!({"row_id": "R1", "processes": []})))
            .await
            .unwrap_err();

        match err {
            PublishError::SchemaMismatch { tab, missing } => {
                assert_eq!(tab, "Processes");
                assert_eq!(missing, vec!["updated_at"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(writes(&store).is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_uid_on_sheet_updates_last_row() {
        let store = Arc::new(seeded_store().with_tab(
            "Processes",
            vec![
                process_header(),
                row(json!(["R1", "P1", "AAAAAAA", "Cut", "old"])),
                row(json!(["R1", "P1", "DDDDDDD", "Cut", "old"])),
            ],
        ));

        let summary = reconciler(&store)
            .publish(
                &mapping(),
                &body(json!({"row_id": "R1", "processes": [{"UID": "P1", "Status": "new"}]})),
            )
            .await
            .unwrap();

        assert_eq!(summary.process_actions.updated, 1);
        assert_eq!(summary.process_actions.deleted, 0);
        let processes = store.tab("Processes");
        assert_eq!(processes[1], row(json!(["R1", "P1", "AAAAAAA", "Cut", "old"])));
        assert_eq!(processes[2][4], json!("new"));
        assert_eq!(processes[2][7], json!(NOW));
    }

    #[tokio::test]
    async fn test_concurrent_publishes_for_one_key() {
        let store = Arc::new(seeded_store());
        let reconciler = Arc::new(reconciler(&store));
        let mapping = Arc::new(mapping());

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let reconciler = reconciler.clone();
                let mapping = mapping.clone();
                tokio::spawn(async move {
                    reconciler
                        .publish(&mapping, &body(json!({"row_id": "R7", "Qty": 1})))
                        .await
                        .unwrap()
                        .main_action
                })
            })
            .collect();

        let mut actions = Vec::new();
        for task in tasks {
            actions.push(task.await.unwrap());
        }
        actions.sort_by_key(|action| action.as_str());

        assert_eq!(actions, vec![MainAction::Add, MainAction::Update]);
        let rows = store
            .tab("Main")
            .iter()
            .filter(|r| r.first() == Some(&json!("R7")))
            .count();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_summary_serialization() {
        let summary = PublishSummary {
            ok: true,
            row_id: "R1".into(),
            main_action: MainAction::NoopDelete,
            process_actions: ProcessActions {
                added: 1,
                updated: 2,
                deleted: 3,
            },
            ts: NOW.into(),
        };

        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            json!({
                "ok": true,
                "row_id": "R1",
                "main_action": "noop_delete",
                "process_actions": {"added": 1, "updated": 2, "deleted": 3},
                "ts": NOW,
            })
        );
    }
}
