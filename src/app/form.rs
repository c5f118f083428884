use crate::config::EngineConfig;
use crate::engine::binding::FieldTarget;
use crate::engine::declarations::{audit, DeclarationReport};
use crate::engine::focus::PanelState;
use crate::engine::navigator::{ErrorNavigator, NavStatus, ViewportHost};
use crate::engine::registry::ControlRegistry;
use crate::engine::rows::{RowError, TableStore};
use crate::engine::scheduler::{RevealScheduler, ValidationQueue};
use crate::engine::schema::{build_schema, ErrorMap, Issue, SchemaEntry};
use crate::engine::tracker::ChangeTracker;
use crate::engine::visibility::Scope;
use crate::model::{tables_in, FieldType, FormSpec, Node, TableDecl};
use crate::nav::flatten::{flatten_fields, flatten_tables, row_entries, FlatField};
use crate::nav::keys::row_path;
use crate::nav::path;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InvalidField {
    pub field: String,
    pub error: String,
    pub value: JsonValue,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubmitOutcome {
    pub valid: bool,
    pub values: JsonValue,
    #[serde(rename = "invalidFields")]
    pub invalid_fields: Vec<InvalidField>,
    pub updated: bool,
}

/// A table declaration resolved against an absolute table path.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TableCtx<'a> {
    pub decl: &'a TableDecl,
    pub scope: Scope,
}

impl TableCtx<'_> {
    pub fn blocked(&self) -> bool {
        self.scope.hidden || self.scope.disabled
    }
}

/// Resolve `target` (`items`, `items.2.parts`, ...) to its declaration.
/// A nested table counts as disabled unless its parent row is the active one.
pub(crate) fn find_table<'a>(
    nodes: &'a [Node],
    tables: &TableStore,
    global_disabled: bool,
    target: &str,
    doc: &JsonValue,
) -> Option<TableCtx<'a>> {
    fn find_in<'a>(
        candidates: Vec<(&'a TableDecl, Scope)>,
        prefix: &str,
        tables: &TableStore,
        target: &str,
        doc: &JsonValue,
    ) -> Option<TableCtx<'a>> {
        for (decl, scope) in candidates {
            let abs = path::join(prefix, &path::normalize(&decl.data_source));
            if abs.is_empty() || abs == prefix {
                continue;
            }
            if abs == target {
                return Some(TableCtx { decl, scope });
            }
            let Some(rest) = target.strip_prefix(&format!("{abs}.")) else {
                continue;
            };
            let head = rest.split('.').next().unwrap_or(rest);
            let Ok(index) = head.parse::<usize>() else {
                continue;
            };
            let mut row_scope = scope;
            if tables.active_row(&abs) != Some(index) {
                row_scope.disabled = true;
            }
            let children = flatten_tables(&decl.fields, doc, row_scope);
            return find_in(children, &row_path(&abs, index), tables, target, doc);
        }
        None
    }
    let roots = flatten_tables(nodes, doc, Scope::root(global_disabled));
    find_in(roots, "", tables, &path::normalize(target), doc)
}

/// Equality that treats `5` and `5.0` as the same number.
fn same_value(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// The form engine: declarations, the document split into base values and
/// table contents, and every piece of per-edit state.
pub struct FormEngine {
    pub(crate) spec: FormSpec,
    pub(crate) report: DeclarationReport,
    pub(crate) config: EngineConfig,
    source: JsonValue,
    pub(crate) base: JsonValue,
    pub(crate) tables: TableStore,
    pub(crate) errors: ErrorMap,
    touched: BTreeSet<String>,
    tracker: ChangeTracker,
    pub(crate) panels: PanelState,
    queue: ValidationQueue,
    pub(crate) reveal: RevealScheduler,
    navigator: ErrorNavigator,
    registry: ControlRegistry,
    pub(crate) loading: bool,
    pub(crate) disabled: bool,
}

impl FormEngine {
    pub fn new(spec: FormSpec, source: JsonValue, config: EngineConfig) -> Self {
        let report = audit(&spec.nodes);
        let mut engine = Self {
            panels: PanelState::seeded(&spec.nodes),
            queue: ValidationQueue::new(config.debounce),
            reveal: RevealScheduler::new(config.reveal_chunk),
            navigator: ErrorNavigator::new(config.focus_attempts, config.settle_checks),
            spec,
            report,
            config,
            source: JsonValue::Null,
            base: JsonValue::Null,
            tables: TableStore::default(),
            errors: ErrorMap::new(),
            touched: BTreeSet::new(),
            tracker: ChangeTracker::default(),
            registry: ControlRegistry::default(),
            loading: false,
            disabled: false,
        };
        engine.set_source(source);
        engine
    }

    pub fn spec(&self) -> &FormSpec {
        &self.spec
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn declaration_report(&self) -> &DeclarationReport {
        &self.report
    }

    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    pub fn tables(&self) -> &TableStore {
        &self.tables
    }

    pub fn registry_mut(&mut self) -> &mut ControlRegistry {
        &mut self.registry
    }

    pub fn panels_mut(&mut self) -> &mut PanelState {
        &mut self.panels
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Supply a source document. The same document again is a no-op; a new
    /// one replaces the state and becomes the change baseline.
    pub fn set_source(&mut self, source: JsonValue) {
        if self.tracker.observe_source(&source) {
            self.source = source;
            self.load();
        }
    }

    /// Back to the last supplied source document.
    pub fn reset(&mut self) {
        self.load();
    }

    fn load(&mut self) {
        let decls: Vec<&TableDecl> = tables_in(&self.spec.nodes)
            .into_iter()
            .filter(|t| !path::normalize(&t.data_source).is_empty())
            .collect();
        self.base = self.tables.load(&self.source, &decls);
        self.errors.clear();
        self.touched.clear();
        self.queue.take();
        self.reveal.restart();
        self.navigator.cancel();
        self.panels = PanelState::seeded(&self.spec.nodes);
        let doc = self.values();
        self.tracker.rebase(&doc);
        debug!(tables = self.tables.table_paths().len(), "document loaded");
    }

    /// Full logical document: base values with every table array.
    pub fn values(&self) -> JsonValue {
        self.tables.compose(&self.base)
    }

    pub fn is_updated(&self) -> bool {
        self.tracker.is_updated(&self.values())
    }

    fn visible_fields<'a>(&'a self, doc: &JsonValue) -> Vec<FlatField<'a>> {
        flatten_fields(&self.spec.nodes, doc, Scope::root(self.disabled), false)
            .into_iter()
            .filter(|f| !self.report.is_broken(&f.key) && f.decl.name.is_some())
            .collect()
    }

    fn base_field(&self, name: &str, doc: &JsonValue) -> Option<(FieldType, Scope)> {
        flatten_fields(&self.spec.nodes, doc, Scope::root(self.disabled), true)
            .into_iter()
            .filter(|f| !self.report.is_broken(&f.key))
            .find(|f| f.decl.name.as_deref().map(path::normalize).as_deref() == Some(name))
            .map(|f| (f.decl.field_type, f.scope))
    }

    pub(crate) fn table_ctx(&self, table: &str, doc: &JsonValue) -> Result<TableCtx<'_>, RowError> {
        find_table(&self.spec.nodes, &self.tables, self.disabled, table, doc)
            .ok_or_else(|| RowError::UnknownTable(table.to_string()))
    }

    /// Visible tables currently holding rows, deepest first.
    fn live_tables(&self, doc: &JsonValue) -> Vec<(String, TableCtx<'_>)> {
        let mut out: Vec<(String, TableCtx<'_>)> = self
            .tables
            .table_paths()
            .into_iter()
            .filter_map(|p| {
                let ctx = find_table(&self.spec.nodes, &self.tables, self.disabled, &p, doc)?;
                (!ctx.scope.hidden).then_some((p, ctx))
            })
            .collect();
        out.sort_by_key(|(p, _)| std::cmp::Reverse(path::segments(p).len()));
        out
    }

    /// Schema entries for visible base fields and table-level constraints.
    fn entries(&self, doc: &JsonValue, live: &[(String, TableCtx<'_>)]) -> Vec<SchemaEntry> {
        let mut entries: Vec<SchemaEntry> = self
            .visible_fields(doc)
            .into_iter()
            .filter_map(|f| {
                Some(SchemaEntry {
                    path: path::normalize(f.decl.name.as_deref()?),
                    factory: f.decl.validation.clone()?,
                })
            })
            .collect();
        for (p, ctx) in live {
            if let Some(factory) = &ctx.decl.validation {
                entries.push(SchemaEntry {
                    path: p.clone(),
                    factory: factory.clone(),
                });
            }
        }
        entries
    }

    /// Every current violation with its offending value, in declaration
    /// order. Staged rows of enabled tables are included.
    fn current_issues(&self, doc: &JsonValue) -> Vec<(Issue, JsonValue)> {
        let live = self.live_tables(doc);
        let schema = build_schema(&self.entries(doc, &live), doc);
        let mut out: Vec<(Issue, JsonValue)> = schema
            .validate(doc)
            .into_iter()
            .map(|issue| {
                let value = path::get_by_path(doc, &issue.path)
                    .cloned()
                    .unwrap_or(JsonValue::Null);
                (issue, value)
            })
            .collect();
        for (p, ctx) in &live {
            if ctx.blocked() {
                continue;
            }
            let Some((prefix, candidate)) = self.tables.candidate(p, ctx.decl) else {
                continue;
            };
            let row_schema = build_schema(&row_entries(ctx.decl, doc, ""), doc);
            for issue in row_schema.validate(&candidate) {
                let value = path::get_by_path(&candidate, &issue.path)
                    .cloned()
                    .unwrap_or(JsonValue::Null);
                out.push((
                    Issue {
                        path: path::join(&prefix, &issue.path),
                        message: issue.message,
                    },
                    value,
                ));
            }
        }
        let order = self.declaration_order();
        let rank = |p: &str| {
            order
                .iter()
                .position(|o| path::is_within(p, o))
                .unwrap_or(usize::MAX)
        };
        out.sort_by_key(|(issue, _)| rank(&issue.path));
        out
    }

    fn declaration_order(&self) -> Vec<String> {
        fn walk(nodes: &[Node], out: &mut Vec<String>) {
            for node in nodes {
                match node {
                    Node::Field(f) => {
                        if let Some(name) = &f.name {
                            out.push(path::normalize(name));
                        }
                    }
                    Node::Table(t) => out.push(path::normalize(&t.data_source)),
                    other => {
                        for branch in other.branches() {
                            walk(branch, out);
                        }
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.spec.nodes, &mut out);
        out.retain(|p| !p.is_empty());
        out
    }

    /// Can the path still be shown? Errors on unreachable paths are dropped.
    fn is_reachable(&self, p: &str, doc: &JsonValue, live: &[(String, TableCtx<'_>)]) -> bool {
        for (table, ctx) in live {
            if !path::is_within(p, table) {
                continue;
            }
            if p == table {
                return true;
            }
            let rest = &p[table.len() + 1..];
            let Some((_, field)) = rest.split_once('.') else {
                return false;
            };
            return flatten_fields(&ctx.decl.fields, doc, ctx.scope, false)
                .iter()
                .any(|f| f.decl.name.as_deref().map(path::normalize).as_deref() == Some(field));
        }
        self.visible_fields(doc)
            .iter()
            .any(|f| f.decl.name.as_deref().map(path::normalize).as_deref() == Some(p))
    }

    fn prune_hidden(&mut self, doc: &JsonValue) {
        let live = self.live_tables(doc);
        let stale: Vec<String> = self
            .errors
            .keys()
            .filter(|p| !self.is_reachable(p, doc, &live))
            .cloned()
            .collect();
        drop(live);
        for p in stale {
            debug!(path = %p, "clearing error of hidden field");
            self.errors.remove(&p);
        }
    }

    /// Re-validate `paths` plus every path already carrying an error.
    pub fn validate_paths(&mut self, paths: BTreeSet<String>) {
        let doc = self.values();
        let current: ErrorMap = self
            .current_issues(&doc)
            .into_iter()
            .map(|(issue, _)| (issue.path, issue.message))
            .collect();
        let mut targets = paths;
        targets.extend(self.errors.keys().cloned());
        for p in targets {
            match current.get(&p) {
                Some(message) => {
                    self.errors.insert(p, message.clone());
                }
                None => {
                    self.errors.remove(&p);
                }
            }
        }
        self.prune_hidden(&doc);
    }

    pub fn change(&mut self, target: FieldTarget, value: JsonValue) -> Result<(), RowError> {
        self.change_at(target, value, Instant::now())
    }

    /// Write raw control input. Validation of the path is queued.
    pub fn change_at(
        &mut self,
        target: FieldTarget,
        value: JsonValue,
        now: Instant,
    ) -> Result<(), RowError> {
        let id = target.path();
        let doc = self.values();
        match &target {
            FieldTarget::Base(_) => {
                if self.disabled || self.base_field(&id, &doc).is_some_and(|(_, s)| s.disabled) {
                    return Err(RowError::Disabled(id));
                }
                path::write_path(&mut self.base, &id, value);
                self.touched.insert(id.clone());
            }
            FieldTarget::Draft { table, field } => {
                if self.table_ctx(table, &doc)?.blocked() {
                    return Err(RowError::Disabled(table.clone()));
                }
                self.tables.stage(table, None, field, value)?;
            }
            FieldTarget::Row {
                table,
                index,
                field,
            } => {
                if self.table_ctx(table, &doc)?.blocked() {
                    return Err(RowError::Disabled(table.clone()));
                }
                self.tables.stage(table, Some(*index), field, value)?;
            }
        }
        self.queue.push(id, now);
        let doc = self.values();
        self.prune_hidden(&doc);
        Ok(())
    }

    /// Normalize a touched base value and validate its path right away.
    pub fn blur(&mut self, target: &FieldTarget) {
        let id = target.path();
        if matches!(target, FieldTarget::Base(_)) {
            self.normalize_touched(Some(&id));
        }
        self.validate_paths(BTreeSet::from([id]));
    }

    fn normalize_touched(&mut self, only: Option<&str>) {
        let doc = self.values();
        let touched: Vec<String> = self
            .touched
            .iter()
            .filter(|p| only.map_or(true, |o| o == p.as_str()))
            .cloned()
            .collect();
        for p in touched {
            let Some((ty, _)) = self.base_field(&p, &doc) else {
                continue;
            };
            let Some(current) = path::get_by_path(&self.base, &p) else {
                continue;
            };
            let normalized = ty.normalize(current);
            // input equivalent to the loaded value keeps the loaded form
            let kept = match path::get_by_path(&self.source, &p) {
                Some(original) if same_value(&ty.normalize(original), &normalized) => {
                    original.clone()
                }
                _ => normalized,
            };
            if &kept != current {
                path::write_path(&mut self.base, &p, kept);
            }
        }
    }

    /// Idle work: flush debounced validation, advance progressive reveal.
    /// Returns `true` when a redraw is due.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut dirty = false;
        if let Some(paths) = self.queue.take_ready(now) {
            self.validate_paths(paths);
            dirty = true;
        }
        dirty |= self.reveal.tick();
        dirty
    }

    /// Advance a pending error navigation by one frame.
    pub fn navigate(&mut self, host: &mut dyn ViewportHost) -> NavStatus {
        self.navigator.tick(&self.registry, host, &mut self.reveal)
    }

    pub fn navigation_target(&self) -> Option<&str> {
        self.navigator.target()
    }

    pub fn submit(&mut self) -> SubmitOutcome {
        self.queue.take();
        self.normalize_touched(None);
        let doc = self.values();
        let issues = self.current_issues(&doc);
        self.errors = issues
            .iter()
            .map(|(issue, _)| (issue.path.clone(), issue.message.clone()))
            .collect();
        let updated = self.tracker.is_updated(&doc);
        self.tracker.rebase(&doc);
        let invalid_fields: Vec<InvalidField> = issues
            .into_iter()
            .map(|(issue, value)| InvalidField {
                field: issue.path,
                error: issue.message,
                value,
            })
            .collect();
        match invalid_fields.first() {
            Some(first) => {
                let target = self.open_enclosing_rows(&first.field, &doc);
                self.navigator.start(
                    &target,
                    &self.spec.nodes,
                    &mut self.panels,
                    &mut self.reveal,
                );
            }
            None => self.navigator.cancel(),
        }
        let valid = invalid_fields.is_empty();
        info!(valid, updated, invalid = invalid_fields.len(), "form submitted");
        SubmitOutcome {
            valid,
            values: doc,
            invalid_fields,
            updated,
        }
    }

    /// Select every row enclosing `target`, outermost first, so controls of
    /// nested tables get rendered. A table already editing another row is
    /// left alone and becomes the navigation target instead.
    fn open_enclosing_rows(&mut self, target: &str, doc: &JsonValue) -> String {
        for table in self.tables.table_paths() {
            let Some(rest) = target.strip_prefix(&format!("{table}.")) else {
                continue;
            };
            let Some(index) = rest.split('.').next().and_then(|h| h.parse::<usize>().ok()) else {
                continue;
            };
            let Some(ctx) = find_table(&self.spec.nodes, &self.tables, self.disabled, &table, doc)
            else {
                continue;
            };
            if self.tables.active_row(&table).is_some_and(|i| i != index) {
                debug!(table = %table, index, "another row is being edited");
                return table;
            }
            if let Err(e) = self.tables.select(&table, ctx.decl, index, &mut self.errors) {
                debug!(table = %table, error = %e, "could not open row");
                return table;
            }
        }
        target.to_string()
    }

    pub fn select_row(&mut self, table: &str, index: usize) -> Result<bool, RowError> {
        let doc = self.values();
        let ctx = find_table(&self.spec.nodes, &self.tables, self.disabled, table, &doc)
            .ok_or_else(|| RowError::UnknownTable(table.to_string()))?;
        if ctx.scope.hidden {
            return Err(RowError::Disabled(table.to_string()));
        }
        self.tables.select(table, ctx.decl, index, &mut self.errors)
    }

    pub fn add_row(&mut self, table: &str) -> Result<(), RowError> {
        let doc = self.values();
        let ctx = find_table(&self.spec.nodes, &self.tables, self.disabled, table, &doc)
            .ok_or_else(|| RowError::UnknownTable(table.to_string()))?;
        self.tables
            .add(table, ctx.decl, &doc, ctx.blocked(), &mut self.errors)?;
        self.after_rows_changed(table);
        Ok(())
    }

    pub fn update_row(&mut self, table: &str) -> Result<usize, RowError> {
        let doc = self.values();
        let ctx = find_table(&self.spec.nodes, &self.tables, self.disabled, table, &doc)
            .ok_or_else(|| RowError::UnknownTable(table.to_string()))?;
        let index = self
            .tables
            .update(table, ctx.decl, &doc, ctx.blocked(), &mut self.errors)?;
        self.after_rows_changed(table);
        Ok(index)
    }

    pub fn delete_row(&mut self, table: &str) -> Result<JsonValue, RowError> {
        let doc = self.values();
        let ctx = find_table(&self.spec.nodes, &self.tables, self.disabled, table, &doc)
            .ok_or_else(|| RowError::UnknownTable(table.to_string()))?;
        let removed = self
            .tables
            .delete(table, ctx.decl, ctx.blocked(), &mut self.errors)?;
        self.after_rows_changed(table);
        Ok(removed)
    }

    pub fn cancel_row(&mut self, table: &str) -> Result<(), RowError> {
        let doc = self.values();
        let ctx = find_table(&self.spec.nodes, &self.tables, self.disabled, table, &doc)
            .ok_or_else(|| RowError::UnknownTable(table.to_string()))?;
        self.tables.cancel(table, ctx.decl, &mut self.errors);
        Ok(())
    }

    /// Whole-array edit raised by the table control.
    pub fn replace_rows(&mut self, table: &str, rows: Vec<JsonValue>) -> Result<(), RowError> {
        let doc = self.values();
        let ctx = find_table(&self.spec.nodes, &self.tables, self.disabled, table, &doc)
            .ok_or_else(|| RowError::UnknownTable(table.to_string()))?;
        if ctx.blocked() {
            return Err(RowError::Disabled(table.to_string()));
        }
        self.tables
            .replace(table, ctx.decl, rows, &mut self.errors);
        self.after_rows_changed(table);
        Ok(())
    }

    fn after_rows_changed(&mut self, table: &str) {
        self.queue.push(table.to_string(), Instant::now());
        let doc = self.values();
        self.prune_hidden(&doc);
    }
}
