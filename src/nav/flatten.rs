use crate::engine::schema::SchemaEntry;
use crate::engine::visibility::Scope;
use crate::model::{FieldDecl, Flag, Node, TableDecl};
use crate::nav::keys::{branch_key, node_key};
use crate::nav::path;
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

/// A leaf field reached by flattening, with the scope it inherits.
#[derive(Clone, Debug)]
pub struct FlatField<'a> {
    pub key: String,
    pub decl: &'a FieldDecl,
    pub scope: Scope,
}

/// Walk `nodes` inlining plain groups, tabs and accordion sections. Tables
/// are not entered. Hidden branches are skipped unless `include_hidden`.
pub fn flatten_fields<'a>(
    nodes: &'a [Node],
    values: &JsonValue,
    scope: Scope,
    include_hidden: bool,
) -> Vec<FlatField<'a>> {
    fn walk<'a>(
        nodes: &'a [Node],
        parent: &str,
        values: &JsonValue,
        scope: Scope,
        include_hidden: bool,
        out: &mut Vec<FlatField<'a>>,
    ) {
        for (i, node) in nodes.iter().enumerate() {
            let key = node_key(parent, i);
            match node {
                Node::Field(f) => {
                    let s = scope.enter(&f.hidden, Some(&f.disabled), values);
                    if include_hidden || !s.hidden {
                        out.push(FlatField {
                            key,
                            decl: f,
                            scope: s,
                        });
                    }
                }
                Node::Table(_) => {}
                Node::Fields(g) => {
                    let s = scope.enter(&g.hidden, None, values);
                    if include_hidden || !s.hidden {
                        walk(&g.fields, &branch_key(&key, 0), values, s, include_hidden, out);
                    }
                }
                Node::Tabs(t) => {
                    let s = scope.enter(&t.hidden, None, values);
                    for (b, tab) in t.tabs.iter().enumerate() {
                        let bs = s.enter(&tab.hidden, None, values);
                        if include_hidden || !bs.hidden {
                            walk(&tab.fields, &branch_key(&key, b), values, bs, include_hidden, out);
                        }
                    }
                }
                Node::Accordion(a) => {
                    let s = scope.enter(&a.hidden, None, values);
                    for (b, sec) in a.sections.iter().enumerate() {
                        let bs = s.enter(&sec.hidden, None, values);
                        if include_hidden || !bs.hidden {
                            walk(&sec.fields, &branch_key(&key, b), values, bs, include_hidden, out);
                        }
                    }
                }
            }
        }
    }
    let mut out = Vec::new();
    walk(nodes, "", values, scope, include_hidden, &mut out);
    out
}

/// Top-level tables reachable from `nodes` (through groups, not through other
/// tables), with their inherited scope.
pub fn flatten_tables<'a>(
    nodes: &'a [Node],
    values: &JsonValue,
    scope: Scope,
) -> Vec<(&'a TableDecl, Scope)> {
    fn walk<'a>(
        nodes: &'a [Node],
        values: &JsonValue,
        scope: Scope,
        out: &mut Vec<(&'a TableDecl, Scope)>,
    ) {
        let always = Flag::Const(false);
        for node in nodes {
            let (hidden, branches): (&Flag, Vec<(&Flag, &'a [Node])>) = match node {
                Node::Field(_) => continue,
                Node::Table(t) => {
                    out.push((t, scope.enter(&t.hidden, Some(&t.disabled), values)));
                    continue;
                }
                Node::Fields(g) => (&g.hidden, vec![(&always, g.fields.as_slice())]),
                Node::Tabs(t) => (
                    &t.hidden,
                    t.tabs.iter().map(|b| (&b.hidden, b.fields.as_slice())).collect(),
                ),
                Node::Accordion(a) => (
                    &a.hidden,
                    a.sections
                        .iter()
                        .map(|s| (&s.hidden, s.fields.as_slice()))
                        .collect(),
                ),
            };
            let s = scope.enter(hidden, None, values);
            for (flag, branch) in branches {
                walk(branch, values, s.enter(flag, None, values), out);
            }
        }
    }
    let mut out = Vec::new();
    walk(nodes, values, scope, &mut out);
    out
}

/// Schema entries for the visible, named, validated fields of `nodes`,
/// each path prefixed with `prefix`.
pub fn schema_entries(nodes: &[Node], values: &JsonValue, prefix: &str) -> Vec<SchemaEntry> {
    flatten_fields(nodes, values, Scope::default(), false)
        .into_iter()
        .filter_map(|f| {
            let name = f.decl.name.as_deref()?;
            let factory = f.decl.validation.clone()?;
            Some(SchemaEntry {
                path: path::join(prefix, name),
                factory,
            })
        })
        .collect()
}

/// Row schema of a table: its own leaf fields, relative to the row unless a
/// prefix (draft or row namespace) is given. Nested tables are excluded.
pub fn row_entries(table: &TableDecl, values: &JsonValue, prefix: &str) -> Vec<SchemaEntry> {
    schema_entries(&table.fields, values, prefix)
}

/// Every field name and table data source declared under `nodes`, hidden or
/// not. Used to decide which tab/section holds an invalid path.
#[derive(Clone, Debug, Default)]
pub struct NameSet {
    names: BTreeSet<String>,
    tables: Vec<String>,
}

impl NameSet {
    pub fn of(nodes: &[Node]) -> Self {
        fn walk(nodes: &[Node], set: &mut NameSet) {
            for node in nodes {
                match node {
                    Node::Field(f) => {
                        if let Some(name) = &f.name {
                            set.names.insert(path::normalize(name));
                        }
                    }
                    Node::Table(t) => set.tables.push(path::normalize(&t.data_source)),
                    other => {
                        for branch in other.branches() {
                            walk(branch, set);
                        }
                    }
                }
            }
        }
        let mut set = NameSet::default();
        walk(nodes, &mut set);
        set
    }

    pub fn contains(&self, p: &str) -> bool {
        let p = path::normalize(p);
        self.names.contains(&p) || self.tables.iter().any(|t| path::is_within(&p, t))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.tables.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BranchKind {
    Tab,
    Section,
}

/// One tab switch / section open needed to reveal a path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchStep {
    pub group: String,
    pub kind: BranchKind,
    pub index: usize,
    pub allow_multiple: bool,
}

/// Outermost-first chain of branches that must be shown for `target` to be
/// reachable. First matching branch in declaration order wins.
pub fn branch_chain(nodes: &[Node], target: &str) -> Vec<BranchStep> {
    fn walk(nodes: &[Node], parent: &str, target: &str, out: &mut Vec<BranchStep>) -> bool {
        for (i, node) in nodes.iter().enumerate() {
            let key = node_key(parent, i);
            let (kind, allow_multiple) = match node {
                Node::Field(_) | Node::Table(_) => continue,
                Node::Fields(g) => {
                    if NameSet::of(&g.fields).contains(target) {
                        return walk(&g.fields, &branch_key(&key, 0), target, out);
                    }
                    continue;
                }
                Node::Tabs(_) => (BranchKind::Tab, false),
                Node::Accordion(a) => (BranchKind::Section, a.allow_multiple),
            };
            for (b, branch) in node.branches().into_iter().enumerate() {
                if NameSet::of(branch).contains(target) {
                    out.push(BranchStep {
                        group: key.clone(),
                        kind,
                        index: b,
                        allow_multiple,
                    });
                    walk(branch, &branch_key(&key, b), target, out);
                    return true;
                }
            }
        }
        false
    }
    let mut out = Vec::new();
    walk(nodes, "", target, &mut out);
    out
}
