use crate::engine::schema::{build_schema, ErrorMap, Issue};
use crate::engine::visibility::Scope;
use crate::model::{FieldType, TableDecl};
use crate::nav::flatten::{flatten_fields, row_entries};
use crate::nav::keys::{child_table_path, draft_path, row_path};
use crate::nav::path;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum RowError {
    #[error("'{0}' is disabled")]
    Disabled(String),
    #[error("no table is declared at '{0}'")]
    UnknownTable(String),
    #[error("nothing to add: the draft of '{0}' is empty")]
    EmptyDraft(String),
    #[error("no row of '{0}' is selected")]
    NoActiveRow(String),
    #[error("row {index} of '{table}' does not exist")]
    OutOfRange { table: String, index: usize },
    #[error("a row of '{0}' is being edited; update or cancel it first")]
    DraftLocked(String),
    #[error("{} field(s) failed validation", .0.len())]
    Invalid(Vec<Issue>),
}

/// Per-table lifecycle state. `staged` is the add form while no row is
/// active and the edit buffer of the active row otherwise.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowState {
    pub active: Option<usize>,
    pub staged: JsonValue,
    snapshot: Option<JsonValue>,
}

/// Position change of a table's rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shift {
    Inserted(usize),
    Removed(usize),
}

/// Re-key every entry of `map` that lives under a row of `table`
/// (`table.<k>...`). On removal of row `i` entries of row `i` are dropped and
/// rows above shift down; on insertion at `at` rows `>= at` shift up. Keys
/// under `table.draft` and other tables are left alone.
pub fn reindex<V>(map: &mut BTreeMap<String, V>, table: &str, shift: Shift) {
    let prefix = format!("{table}.");
    let keys: Vec<String> = map
        .keys()
        .filter(|k| k.starts_with(&prefix))
        .cloned()
        .collect();
    let mut moved = Vec::new();
    for key in keys {
        let rest = &key[prefix.len()..];
        let (head, tail) = match rest.split_once('.') {
            Some((h, t)) => (h, Some(t)),
            None => (rest, None),
        };
        let Ok(idx) = head.parse::<usize>() else {
            continue;
        };
        let target = match shift {
            Shift::Inserted(at) if idx >= at => Some(idx + 1),
            Shift::Removed(at) if idx == at => None,
            Shift::Removed(at) if idx > at => Some(idx - 1),
            _ => Some(idx),
        };
        if target == Some(idx) {
            continue;
        }
        let Some(value) = map.remove(&key) else {
            continue;
        };
        if let Some(n) = target {
            let rekeyed = match tail {
                Some(t) => format!("{prefix}{n}.{t}"),
                None => format!("{prefix}{n}"),
            };
            moved.push((rekeyed, value));
        }
    }
    map.extend(moved);
}

/// Named leaf fields of a table's own row schema (nested tables excluded).
pub fn leaf_fields(decl: &TableDecl) -> Vec<(String, FieldType)> {
    flatten_fields(&decl.fields, &JsonValue::Null, Scope::default(), true)
        .into_iter()
        .filter_map(|f| Some((path::normalize(f.decl.name.as_deref()?), f.decl.field_type)))
        .collect()
}

fn empty_buffer(fields: &[(String, FieldType)]) -> JsonValue {
    let mut buf = JsonValue::Object(Map::new());
    for (name, ty) in fields {
        path::write_path(&mut buf, name, ty.empty_value());
    }
    buf
}

fn normalized_row(mut base: JsonValue, staged: &JsonValue, fields: &[(String, FieldType)]) -> JsonValue {
    if !base.is_object() {
        base = JsonValue::Object(Map::new());
    }
    for (name, ty) in fields {
        let raw = path::get_by_path(staged, name).cloned().unwrap_or(JsonValue::Null);
        path::write_path(&mut base, name, ty.normalize(&raw));
    }
    base
}

/// Any non-empty, non-false scalar anywhere in the buffer.
fn has_content(v: &JsonValue) -> bool {
    match v {
        JsonValue::Null | JsonValue::Bool(false) => false,
        JsonValue::String(s) => !s.trim().is_empty(),
        JsonValue::Array(items) => items.iter().any(has_content),
        JsonValue::Object(map) => map.values().any(has_content),
        _ => true,
    }
}

fn clear_errors(errors: &mut ErrorMap, prefix: &str, fields: &[(String, FieldType)]) {
    for (name, _) in fields {
        errors.remove(&path::join(prefix, name));
    }
}

/// Table contents and lifecycle state, both keyed by absolute table path.
/// Nested tables live under `parent.<row>.<relative>`; parent rows never
/// carry the child array themselves.
#[derive(Clone, Debug, Default)]
pub struct TableStore {
    contents: BTreeMap<String, Vec<JsonValue>>,
    states: BTreeMap<String, RowState>,
}

impl TableStore {
    /// Take every declared table's array out of `source` and return the
    /// remaining base document.
    pub fn load(&mut self, source: &JsonValue, tables: &[&TableDecl]) -> JsonValue {
        self.contents.clear();
        self.states.clear();
        let mut base = source.clone();
        for decl in tables {
            let table = path::normalize(&decl.data_source);
            let rows = path::remove_path(&mut base, &table);
            self.absorb(&table, rows, decl);
        }
        base
    }

    fn absorb(&mut self, table: &str, rows: Option<JsonValue>, decl: &TableDecl) {
        let rows = match rows {
            Some(JsonValue::Array(rows)) => rows,
            _ => Vec::new(),
        };
        let children = decl.child_tables();
        let mut kept = Vec::with_capacity(rows.len());
        for (i, mut row) in rows.into_iter().enumerate() {
            for child in &children {
                let rel = path::normalize(&child.data_source);
                let nested = path::remove_path(&mut row, &rel);
                self.absorb(&child_table_path(table, i, &rel), nested, child);
            }
            kept.push(row);
        }
        self.contents.insert(table.to_string(), kept);
    }

    /// Base document with every table array written back, parents first.
    pub fn compose(&self, base: &JsonValue) -> JsonValue {
        self.compose_where(base.clone(), |_| true)
    }

    fn compose_where(&self, mut doc: JsonValue, keep: impl Fn(&str) -> bool) -> JsonValue {
        let mut keys: Vec<&String> = self.contents.keys().filter(|k| keep(k)).collect();
        keys.sort_by(|a, b| {
            (path::segments(a).len(), a.as_str()).cmp(&(path::segments(b).len(), b.as_str()))
        });
        for key in keys {
            if let Some(rows) = self.contents.get(key) {
                path::write_path(&mut doc, key, JsonValue::Array(rows.clone()));
            }
        }
        doc
    }

    pub fn rows(&self, table: &str) -> &[JsonValue] {
        self.contents.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rows of `table` with their nested tables folded back in.
    pub fn display_rows(&self, table: &str) -> Vec<JsonValue> {
        let doc = self.compose_where(JsonValue::Null, |k| path::is_within(k, table));
        match path::get_by_path(&doc, table) {
            Some(JsonValue::Array(rows)) => rows.clone(),
            _ => Vec::new(),
        }
    }

    pub fn contains(&self, table: &str) -> bool {
        self.contents.contains_key(table)
    }

    pub fn state(&self, table: &str) -> Option<&RowState> {
        self.states.get(table)
    }

    pub fn active_row(&self, table: &str) -> Option<usize> {
        self.states.get(table).and_then(|s| s.active)
    }

    pub fn staged(&self, table: &str, field: &str) -> Option<&JsonValue> {
        self.states
            .get(table)
            .and_then(|s| path::get_by_path(&s.staged, field))
    }

    pub fn has_draft(&self, table: &str) -> bool {
        self.states
            .get(table)
            .is_some_and(|s| s.active.is_none() && has_content(&s.staged))
    }

    /// The staged buffer normalized as it would be stored, with the path
    /// namespace its errors belong to. `None` for an idle table.
    pub fn candidate(&self, table: &str, decl: &TableDecl) -> Option<(String, JsonValue)> {
        let state = self.states.get(table)?;
        let fields = leaf_fields(decl);
        match state.active {
            Some(i) => {
                let current = self.rows(table).get(i)?.clone();
                Some((row_path(table, i), normalized_row(current, &state.staged, &fields)))
            }
            None if has_content(&state.staged) => Some((
                draft_path(table),
                normalized_row(JsonValue::Object(Map::new()), &state.staged, &fields),
            )),
            None => None,
        }
    }

    pub fn can_add(&self, table: &str, disabled: bool) -> bool {
        !disabled && self.has_draft(table)
    }

    pub fn can_edit(&self, table: &str, disabled: bool) -> bool {
        !disabled && self.active_row(table).is_some()
    }

    /// Write raw input into the draft (`index == None`) or the active row's
    /// edit buffer.
    pub fn stage(
        &mut self,
        table: &str,
        index: Option<usize>,
        field: &str,
        value: JsonValue,
    ) -> Result<(), RowError> {
        let state = self.states.entry(table.to_string()).or_default();
        match (index, state.active) {
            (None, Some(_)) => Err(RowError::DraftLocked(table.to_string())),
            (Some(i), active) if active != Some(i) => Err(RowError::NoActiveRow(table.to_string())),
            _ => {
                path::write_path(&mut state.staged, field, value);
                Ok(())
            }
        }
    }

    /// Seed the edit buffer from row `index`. Returns `false` when the same
    /// unchanged row is already selected.
    pub fn select(
        &mut self,
        table: &str,
        decl: &TableDecl,
        index: usize,
        errors: &mut ErrorMap,
    ) -> Result<bool, RowError> {
        let row = self
            .rows(table)
            .get(index)
            .cloned()
            .ok_or_else(|| RowError::OutOfRange {
                table: table.to_string(),
                index,
            })?;
        let fields = leaf_fields(decl);
        let state = self.states.entry(table.to_string()).or_default();
        if state.active == Some(index) && state.snapshot.as_ref() == Some(&row) {
            return Ok(false);
        }
        let previous = match state.active {
            Some(i) => row_path(table, i),
            None => draft_path(table),
        };
        clear_errors(errors, &previous, &fields);
        let mut staged = JsonValue::Object(Map::new());
        for (name, ty) in &fields {
            let v = match path::get_by_path(&row, name) {
                Some(v) if !v.is_null() => v.clone(),
                _ => ty.empty_value(),
            };
            path::write_path(&mut staged, name, v);
        }
        state.active = Some(index);
        state.staged = staged;
        state.snapshot = Some(row);
        debug!(table, index, "row selected");
        Ok(true)
    }

    /// Drop the active row (or the draft) without touching the rows.
    pub fn cancel(&mut self, table: &str, decl: &TableDecl, errors: &mut ErrorMap) {
        let fields = leaf_fields(decl);
        let prefix = match self.active_row(table) {
            Some(i) => row_path(table, i),
            None => draft_path(table),
        };
        clear_errors(errors, &prefix, &fields);
        self.reset_state(table, &fields);
        debug!(table, "row edit cancelled");
    }

    fn reset_state(&mut self, table: &str, fields: &[(String, FieldType)]) {
        let state = self.states.entry(table.to_string()).or_default();
        state.active = None;
        state.snapshot = None;
        state.staged = empty_buffer(fields);
    }

    fn check(
        table: &str,
        decl: &TableDecl,
        values: &JsonValue,
        candidate: &JsonValue,
        prefix: &str,
        errors: &mut ErrorMap,
    ) -> Result<(), RowError> {
        let issues = build_schema(&row_entries(decl, values, ""), values).validate(candidate);
        if issues.is_empty() {
            return Ok(());
        }
        for issue in &issues {
            errors.insert(path::join(prefix, &issue.path), issue.message.clone());
        }
        debug!(table, count = issues.len(), "row rejected");
        Err(RowError::Invalid(issues))
    }

    /// Validate the draft and prepend it as row 0. On failure the draft and
    /// its state are kept and errors land on the draft paths.
    pub fn add(
        &mut self,
        table: &str,
        decl: &TableDecl,
        values: &JsonValue,
        disabled: bool,
        errors: &mut ErrorMap,
    ) -> Result<(), RowError> {
        if disabled {
            return Err(RowError::Disabled(table.to_string()));
        }
        if self.active_row(table).is_some() {
            return Err(RowError::DraftLocked(table.to_string()));
        }
        if !self.has_draft(table) {
            return Err(RowError::EmptyDraft(table.to_string()));
        }
        let fields = leaf_fields(decl);
        let staged = self
            .states
            .get(table)
            .map(|s| s.staged.clone())
            .unwrap_or_default();
        let row = normalized_row(JsonValue::Object(Map::new()), &staged, &fields);
        let prefix = draft_path(table);
        clear_errors(errors, &prefix, &fields);
        Self::check(table, decl, values, &row, &prefix, errors)?;

        reindex(&mut self.contents, table, Shift::Inserted(0));
        reindex(&mut self.states, table, Shift::Inserted(0));
        reindex(errors, table, Shift::Inserted(0));
        self.contents.entry(table.to_string()).or_default().insert(0, row);
        for child in decl.child_tables() {
            let rel = path::normalize(&child.data_source);
            self.contents.insert(child_table_path(table, 0, &rel), Vec::new());
        }
        self.reset_state(table, &fields);
        debug!(table, rows = self.rows(table).len(), "row added");
        Ok(())
    }

    /// Validate the edit buffer and write it back into the active row, then
    /// deselect.
    pub fn update(
        &mut self,
        table: &str,
        decl: &TableDecl,
        values: &JsonValue,
        disabled: bool,
        errors: &mut ErrorMap,
    ) -> Result<usize, RowError> {
        if disabled {
            return Err(RowError::Disabled(table.to_string()));
        }
        let index = self
            .active_row(table)
            .ok_or_else(|| RowError::NoActiveRow(table.to_string()))?;
        let current = self
            .rows(table)
            .get(index)
            .cloned()
            .ok_or_else(|| RowError::OutOfRange {
                table: table.to_string(),
                index,
            })?;
        let fields = leaf_fields(decl);
        let staged = self
            .states
            .get(table)
            .map(|s| s.staged.clone())
            .unwrap_or_default();
        let row = normalized_row(current, &staged, &fields);
        let prefix = row_path(table, index);
        clear_errors(errors, &prefix, &fields);
        Self::check(table, decl, values, &row, &prefix, errors)?;

        if let Some(slot) = self.contents.get_mut(table).and_then(|rows| rows.get_mut(index)) {
            *slot = row;
        }
        self.reset_state(table, &fields);
        debug!(table, index, "row updated");
        Ok(index)
    }

    /// Remove the active row together with everything keyed under it.
    pub fn delete(
        &mut self,
        table: &str,
        decl: &TableDecl,
        disabled: bool,
        errors: &mut ErrorMap,
    ) -> Result<JsonValue, RowError> {
        if disabled {
            return Err(RowError::Disabled(table.to_string()));
        }
        let index = self
            .active_row(table)
            .ok_or_else(|| RowError::NoActiveRow(table.to_string()))?;
        let removed = match self.contents.get_mut(table) {
            Some(rows) if index < rows.len() => rows.remove(index),
            _ => {
                return Err(RowError::OutOfRange {
                    table: table.to_string(),
                    index,
                })
            }
        };
        reindex(&mut self.contents, table, Shift::Removed(index));
        reindex(&mut self.states, table, Shift::Removed(index));
        reindex(errors, table, Shift::Removed(index));
        self.reset_state(table, &leaf_fields(decl));
        debug!(table, index, "row deleted");
        Ok(removed)
    }

    /// Whole-array replacement coming from the table control. Nested arrays
    /// inside `rows` are split out again; state under old rows is dropped.
    pub fn replace(
        &mut self,
        table: &str,
        decl: &TableDecl,
        rows: Vec<JsonValue>,
        errors: &mut ErrorMap,
    ) {
        let prefix = format!("{table}.");
        let draft = draft_path(table);
        let under_rows = |k: &str| k.starts_with(&prefix) && !path::is_within(k, &draft);
        self.contents.retain(|k, _| !under_rows(k));
        self.states.retain(|k, _| !under_rows(k));
        errors.retain(|k, _| !under_rows(k));
        let len = rows.len();
        self.absorb(table, Some(JsonValue::Array(rows)), decl);
        if self.active_row(table).is_some_and(|i| i >= len) {
            self.reset_state(table, &leaf_fields(decl));
        } else if let Some(state) = self.states.get_mut(table) {
            // a kept selection re-seeds on its next select
            state.snapshot = None;
        }
        debug!(table, rows = len, "rows replaced");
    }

    /// Paths of all tables currently tracked, parents first.
    pub fn table_paths(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.contents.keys().cloned().collect();
        keys.sort_by_key(|k| (path::segments(k).len(), k.clone()));
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::constraint::Constraint;
    use crate::model::{FieldDecl, Node};
    use proptest::prelude::*;
    use serde_json::json;

    fn items() -> TableDecl {
        TableDecl::new(
            "items",
            vec![
                Node::Field(
                    FieldDecl::new("name", FieldType::Text).validate(|_| Constraint::new().required()),
                ),
                Node::Field(FieldDecl::new("qty", FieldType::Number)),
                Node::Table(TableDecl::new(
                    "parts",
                    vec![Node::Field(FieldDecl::new("sku", FieldType::Text))],
                )),
            ],
        )
    }

    fn loaded(doc: JsonValue) -> (TableStore, TableDecl, JsonValue) {
        let decl = items();
        let mut store = TableStore::default();
        let base = store.load(&doc, &[&decl]);
        (store, decl, base)
    }

    #[test]
    fn load_splits_nested_tables_and_compose_restores_them() {
        let doc = json!({"title": "t", "items": [
            {"name": "a", "qty": 1, "parts": [{"sku": "x"}]},
            {"name": "b", "qty": 2}
        ]});
        let (store, _, base) = loaded(doc);
        assert_eq!(base, json!({"title": "t"}));
        assert_eq!(store.rows("items")[0], json!({"name": "a", "qty": 1}));
        assert_eq!(store.rows("items.0.parts"), &[json!({"sku": "x"})]);
        assert!(store.rows("items.1.parts").is_empty());
        let full = store.compose(&base);
        assert_eq!(full["items"][0]["parts"][0]["sku"], json!("x"));
        assert_eq!(full["items"][1]["parts"], json!([]));
        assert_eq!(store.display_rows("items").len(), 2);
    }

    #[test]
    fn add_prepends_normalized_draft_and_clears_it() {
        let (mut store, decl, base) = loaded(json!({"items": [{"name": "Seed", "qty": 2}]}));
        let mut errors = ErrorMap::new();
        assert!(!store.can_add("items", false));
        store.stage("items", None, "name", json!("NewItem")).unwrap();
        store.stage("items", None, "qty", json!("5")).unwrap();
        assert!(store.can_add("items", false));
        assert!(!store.can_add("items", true));
        store.add("items", &decl, &base, false, &mut errors).unwrap();
        assert_eq!(
            store.rows("items"),
            &[json!({"name": "NewItem", "qty": 5}), json!({"name": "Seed", "qty": 2})]
        );
        assert_eq!(store.state("items").unwrap().staged, json!({"name": "", "qty": ""}));
        assert!(store.contains("items.0.parts"));
        assert!(store.contains("items.1.parts"));
    }

    #[test]
    fn failed_add_keeps_draft_and_reports_on_draft_paths() {
        let (mut store, decl, base) = loaded(json!({"items": []}));
        let mut errors = ErrorMap::new();
        store.stage("items", None, "qty", json!("3")).unwrap();
        let err = store.add("items", &decl, &base, false, &mut errors).unwrap_err();
        assert!(matches!(err, RowError::Invalid(ref issues) if issues.len() == 1));
        assert_eq!(errors.get("items.draft.name").map(String::as_str), Some("This field is required"));
        assert_eq!(store.staged("items", "qty"), Some(&json!("3")));
        assert!(store.rows("items").is_empty());
    }

    #[test]
    fn empty_or_false_draft_cannot_be_added() {
        let (mut store, decl, base) = loaded(json!({}));
        let mut errors = ErrorMap::new();
        store.stage("items", None, "name", json!("  ")).unwrap();
        assert_eq!(
            store.add("items", &decl, &base, false, &mut errors),
            Err(RowError::EmptyDraft("items".into()))
        );
    }

    #[test]
    fn selection_is_idempotent_and_locks_the_draft() {
        let (mut store, decl, _) = loaded(json!({"items": [{"name": "a"}]}));
        let mut errors = ErrorMap::new();
        assert_eq!(store.select("items", &decl, 0, &mut errors), Ok(true));
        let seeded = store.state("items").cloned();
        assert_eq!(seeded.as_ref().unwrap().staged, json!({"name": "a", "qty": ""}));
        assert_eq!(store.select("items", &decl, 0, &mut errors), Ok(false));
        assert_eq!(store.state("items").cloned(), seeded);
        assert_eq!(
            store.stage("items", None, "name", json!("x")),
            Err(RowError::DraftLocked("items".into()))
        );
        assert_eq!(
            store.stage("items", Some(1), "name", json!("x")),
            Err(RowError::NoActiveRow("items".into()))
        );
        assert!(store.select("items", &decl, 4, &mut errors).is_err());
    }

    #[test]
    fn update_writes_back_and_deselects() {
        let (mut store, decl, base) = loaded(json!({"items": [{"name": "a", "qty": 1, "extra": true}]}));
        let mut errors = ErrorMap::new();
        store.select("items", &decl, 0, &mut errors).unwrap();
        store.stage("items", Some(0), "name", json!("")).unwrap();
        assert!(store.update("items", &decl, &base, false, &mut errors).is_err());
        assert!(errors.contains_key("items.0.name"));
        assert_eq!(store.active_row("items"), Some(0));

        store.stage("items", Some(0), "name", json!("b")).unwrap();
        store.stage("items", Some(0), "qty", json!("7")).unwrap();
        assert_eq!(store.update("items", &decl, &base, false, &mut errors), Ok(0));
        assert!(errors.is_empty());
        assert_eq!(store.active_row("items"), None);
        assert_eq!(store.rows("items")[0], json!({"name": "b", "qty": 7, "extra": true}));
    }

    #[test]
    fn guards_refuse_when_disabled_or_idle() {
        let (mut store, decl, base) = loaded(json!({"items": [{"name": "a"}]}));
        let mut errors = ErrorMap::new();
        assert_eq!(
            store.update("items", &decl, &base, false, &mut errors),
            Err(RowError::NoActiveRow("items".into()))
        );
        store.select("items", &decl, 0, &mut errors).unwrap();
        assert!(store.can_edit("items", false));
        assert!(!store.can_edit("items", true));
        assert_eq!(
            store.delete("items", &decl, true, &mut errors),
            Err(RowError::Disabled("items".into()))
        );
        assert_eq!(store.rows("items").len(), 1);
    }

    #[test]
    fn delete_reindexes_child_tables_and_errors() {
        let (mut store, decl, _) = loaded(json!({"items": [
            {"name": "a", "parts": [{"sku": "a1"}]},
            {"name": "b", "parts": [{"sku": "b1"}]},
            {"name": "c", "parts": [{"sku": "c1"}]}
        ]}));
        let mut errors = ErrorMap::new();
        store.select("items", &decl, 1, &mut errors).unwrap();
        errors.insert("items.2.name".into(), "bad".into());
        errors.insert("items.draft.name".into(), "draft".into());
        let removed = store.delete("items", &decl, false, &mut errors).unwrap();
        assert_eq!(removed["name"], json!("b"));
        assert_eq!(store.rows("items.1.parts"), &[json!({"sku": "c1"})]);
        assert_eq!(store.rows("items.0.parts"), &[json!({"sku": "a1"})]);
        assert!(!store.contains("items.2.parts"));
        assert!(errors.contains_key("items.1.name"));
        assert!(errors.contains_key("items.draft.name"));
        assert_eq!(store.active_row("items"), None);
    }

    #[test]
    fn cancel_leaves_rows_untouched() {
        let (mut store, decl, _) = loaded(json!({"items": [{"name": "a"}]}));
        let mut errors = ErrorMap::new();
        store.select("items", &decl, 0, &mut errors).unwrap();
        store.stage("items", Some(0), "name", json!("zzz")).unwrap();
        store.cancel("items", &decl, &mut errors);
        assert_eq!(store.active_row("items"), None);
        assert_eq!(store.rows("items"), &[json!({"name": "a"})]);
        assert!(!store.has_draft("items"));
    }

    #[test]
    fn replace_drops_stale_row_state() {
        let (mut store, decl, _) = loaded(json!({"items": [{"name": "a"}, {"name": "b"}]}));
        let mut errors = ErrorMap::new();
        errors.insert("items.1.name".into(), "bad".into());
        store.select("items", &decl, 1, &mut errors).unwrap();
        store.replace("items", &decl, vec![json!({"name": "z", "parts": [{"sku": "p"}]})], &mut errors);
        assert_eq!(store.active_row("items"), None);
        assert_eq!(store.rows("items"), &[json!({"name": "z"})]);
        assert_eq!(store.rows("items.0.parts"), &[json!({"sku": "p"})]);
        assert!(!store.contains("items.1.parts"));
        assert!(errors.is_empty());
    }

    #[test]
    fn reindex_ignores_draft_and_other_tables() {
        let mut map: BTreeMap<String, u8> = BTreeMap::new();
        map.insert("items.draft.name".into(), 1);
        map.insert("items.3.parts".into(), 2);
        map.insert("itemsx.3".into(), 3);
        map.insert("items".into(), 4);
        reindex(&mut map, "items", Shift::Inserted(0));
        assert_eq!(map.get("items.4.parts"), Some(&2));
        assert_eq!(map.get("items.draft.name"), Some(&1));
        assert_eq!(map.get("itemsx.3"), Some(&3));
        assert_eq!(map.get("items"), Some(&4));
    }

    proptest! {
        #[test]
        fn child_key_follows_its_row(n in 1usize..12, k_seed in 0usize..100, i_seed in 0usize..100) {
            let k = k_seed % n;
            let i = i_seed % n;
            let mut map: BTreeMap<String, usize> = BTreeMap::new();
            map.insert(format!("items.{k}.parts"), k);

            let mut inserted = map.clone();
            reindex(&mut inserted, "items", Shift::Inserted(0));
            prop_assert_eq!(inserted.get(&format!("items.{}.parts", k + 1)), Some(&k));

            let mut removed = map.clone();
            reindex(&mut removed, "items", Shift::Removed(i));
            if i < k {
                prop_assert_eq!(removed.get(&format!("items.{}.parts", k - 1)), Some(&k));
            } else if i == k {
                prop_assert!(removed.is_empty());
            } else {
                prop_assert_eq!(removed, map.clone());
            }

            let mut round = map.clone();
            reindex(&mut round, "items", Shift::Inserted(i));
            reindex(&mut round, "items", Shift::Removed(i));
            prop_assert_eq!(round, map);
        }
    }
}
