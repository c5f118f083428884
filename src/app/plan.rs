use crate::app::form::FormEngine;
use crate::engine::binding::{ControlBinding, FieldTarget, RenderItem, TableBinding};
use crate::engine::schema::{build_schema, Schema};
use crate::engine::visibility::Scope;
use crate::model::{default_label, FieldDecl, Node, TableDecl};
use crate::nav::flatten::{row_entries, schema_entries};
use crate::nav::keys::{branch_key, child_table_path, node_key};
use crate::nav::path;
use serde_json::Value as JsonValue;

/// Where the controls of the node list being walked write to.
enum Mode<'s> {
    Base,
    Staged {
        table: String,
        active: Option<usize>,
        schema: &'s Schema,
    },
}

struct Planner<'e> {
    engine: &'e FormEngine,
    doc: JsonValue,
    base_schema: Schema,
    out: Vec<RenderItem>,
    ordinal: usize,
}

impl Planner<'_> {
    fn walk(&mut self, nodes: &[Node], parent: &str, scope: Scope, depth: usize, mode: &Mode<'_>) {
        let engine = self.engine;
        for (i, node) in nodes.iter().enumerate() {
            let key = node_key(parent, i);
            match node {
                Node::Field(f) => {
                    let s = scope.enter(&f.hidden, Some(&f.disabled), &self.doc);
                    if s.hidden {
                        continue;
                    }
                    if let Some(err) = engine.report.get(&key) {
                        self.out.push(RenderItem::DeclarationError {
                            key,
                            message: err.to_string(),
                            depth,
                        });
                        continue;
                    }
                    self.control(f, key, s, depth, mode);
                }
                Node::Fields(g) => {
                    let s = scope.enter(&g.hidden, None, &self.doc);
                    if s.hidden {
                        continue;
                    }
                    let inner = match &g.title {
                        Some(title) => {
                            self.out.push(RenderItem::GroupHeader {
                                key: key.clone(),
                                title: title.clone(),
                                depth,
                            });
                            depth + 1
                        }
                        None => depth,
                    };
                    self.walk(&g.fields, &branch_key(&key, 0), s, inner, mode);
                }
                Node::Tabs(t) => {
                    let s = scope.enter(&t.hidden, None, &self.doc);
                    if s.hidden {
                        continue;
                    }
                    let visible: Vec<(usize, String, Scope)> = t
                        .tabs
                        .iter()
                        .enumerate()
                        .map(|(b, tab)| (b, tab.title.clone(), s.enter(&tab.hidden, None, &self.doc)))
                        .filter(|(_, _, bs)| !bs.hidden)
                        .collect();
                    let Some(first) = visible.first().map(|(b, _, _)| *b) else {
                        continue;
                    };
                    let wanted = engine.panels.active_tab(&key);
                    let active = if visible.iter().any(|(b, _, _)| *b == wanted) {
                        wanted
                    } else {
                        first
                    };
                    let active_scope = visible
                        .iter()
                        .find(|(b, _, _)| *b == active)
                        .map(|(_, _, bs)| *bs)
                        .unwrap_or(s);
                    self.out.push(RenderItem::TabBar {
                        key: key.clone(),
                        tabs: visible.into_iter().map(|(b, title, _)| (b, title)).collect(),
                        active,
                        depth,
                    });
                    self.walk(
                        &t.tabs[active].fields,
                        &branch_key(&key, active),
                        active_scope,
                        depth + 1,
                        mode,
                    );
                }
                Node::Accordion(a) => {
                    let s = scope.enter(&a.hidden, None, &self.doc);
                    if s.hidden {
                        continue;
                    }
                    for (b, sec) in a.sections.iter().enumerate() {
                        let bs = s.enter(&sec.hidden, None, &self.doc);
                        if bs.hidden {
                            continue;
                        }
                        let open = engine.panels.is_open(&key, b);
                        self.out.push(RenderItem::SectionHeader {
                            key: key.clone(),
                            index: b,
                            title: sec.title.clone(),
                            open,
                            allow_multiple: a.allow_multiple,
                            depth,
                        });
                        if open {
                            self.walk(&sec.fields, &branch_key(&key, b), bs, depth + 1, mode);
                        }
                    }
                }
                Node::Table(t) => {
                    let s = scope.enter(&t.hidden, Some(&t.disabled), &self.doc);
                    if s.hidden {
                        continue;
                    }
                    if let Some(err) = engine.report.get(&key) {
                        self.out.push(RenderItem::DeclarationError {
                            key,
                            message: err.to_string(),
                            depth,
                        });
                        continue;
                    }
                    let rel = path::normalize(&t.data_source);
                    let abs = match mode {
                        Mode::Base => rel,
                        Mode::Staged {
                            table,
                            active: Some(row),
                            ..
                        } => child_table_path(table, *row, &rel),
                        // child rows only exist once the parent row does
                        Mode::Staged { active: None, .. } => continue,
                    };
                    self.table(t, abs, key, s, depth);
                }
            }
        }
    }

    fn control(&mut self, f: &FieldDecl, key: String, s: Scope, depth: usize, mode: &Mode<'_>) {
        let Some(name) = f.name.as_deref().map(path::normalize) else {
            return;
        };
        let (target, value, required) = match mode {
            Mode::Base => (
                FieldTarget::Base(name.clone()),
                path::get_by_path(&self.doc, &name).cloned(),
                self.base_schema
                    .constraint_at(&name)
                    .is_some_and(|c| c.required),
            ),
            Mode::Staged {
                table,
                active,
                schema,
            } => {
                let target = match active {
                    Some(index) => FieldTarget::Row {
                        table: table.clone(),
                        index: *index,
                        field: name.clone(),
                    },
                    None => FieldTarget::Draft {
                        table: table.clone(),
                        field: name.clone(),
                    },
                };
                (
                    target,
                    self.engine.tables.staged(table, &name).cloned(),
                    schema.constraint_at(&name).is_some_and(|c| c.required),
                )
            }
        };
        let id = target.path();
        let ordinal = self.ordinal;
        self.ordinal += 1;
        if self.engine.loading || !self.engine.reveal.is_revealed(ordinal, &id) {
            self.out.push(RenderItem::Placeholder { key, depth });
            return;
        }
        let value = match value {
            Some(v) if !v.is_null() => v,
            _ => f.field_type.empty_value(),
        };
        let label = if f.label.is_empty() {
            default_label(&name)
        } else {
            f.label.clone()
        };
        let binding = ControlBinding {
            help_text: self.engine.errors.get(&id).cloned(),
            target,
            id,
            value,
            label,
            placeholder: f.placeholder.clone(),
            required,
            disabled: s.disabled,
            field_type: f.field_type,
            options: f.options.clone(),
        };
        let custom = f.render.as_ref().map(|render| render(&binding));
        self.out.push(RenderItem::Control {
            binding,
            custom,
            depth,
        });
    }

    fn table(&mut self, t: &TableDecl, abs: String, key: String, s: Scope, depth: usize) {
        self.ordinal += 1;
        let engine = self.engine;
        if engine.loading {
            self.out.push(RenderItem::Placeholder { key, depth });
            return;
        }
        let tables = &engine.tables;
        let active = tables.active_row(&abs);
        let columns = if t.columns.is_empty() {
            crate::engine::rows::leaf_fields(t)
                .into_iter()
                .map(|(name, _)| name)
                .collect()
        } else {
            t.columns.clone()
        };
        let binding = TableBinding {
            title: t.title.clone(),
            columns,
            rows: tables.display_rows(&abs),
            active_row: active,
            disabled: s.disabled,
            can_add: tables.can_add(&abs, s.disabled),
            can_update: tables.can_edit(&abs, s.disabled),
            can_delete: tables.can_edit(&abs, s.disabled),
            help_text: engine.errors.get(&abs).cloned(),
            path: abs.clone(),
        };
        self.out.push(RenderItem::Table { binding, depth });
        let schema = build_schema(&row_entries(t, &self.doc, ""), &self.doc);
        let mode = Mode::Staged {
            table: abs,
            active,
            schema: &schema,
        };
        self.walk(&t.fields, &branch_key(&key, 0), s, depth + 1, &mode);
    }
}

impl FormEngine {
    /// Ordered render items for the current state. Also tells the reveal
    /// scheduler how many controls the form wants to show.
    pub fn render_plan(&mut self) -> Vec<RenderItem> {
        let doc = self.values();
        let base_schema = build_schema(&schema_entries(&self.spec.nodes, &doc, ""), &doc);
        let engine: &FormEngine = self;
        let mut planner = Planner {
            engine,
            doc,
            base_schema,
            out: Vec::new(),
            ordinal: 0,
        };
        planner.walk(&engine.spec.nodes, "", Scope::root(engine.disabled), 0, &Mode::Base);
        let total = planner.ordinal;
        let out = planner.out;
        self.reveal.set_total(total);
        out
    }
}
