use crate::engine::constraint::Constraint;
use crate::model::ConstraintFactory;
use crate::nav::path;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Validation messages keyed by full path.
pub type ErrorMap = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

/// One flattened declaration: a path plus the factory producing its
/// constraint from the current document.
#[derive(Clone)]
pub struct SchemaEntry {
    pub path: String,
    pub factory: ConstraintFactory,
}

impl std::fmt::Debug for SchemaEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SchemaEntry({})", self.path)
    }
}

/// Composite schema mirroring the path tree of its entries.
#[derive(Clone, Debug)]
pub enum Schema {
    Leaf(Constraint),
    Object {
        own: Option<Constraint>,
        fields: Vec<(String, Schema)>,
    },
    Array {
        own: Option<Constraint>,
        items: Vec<(usize, Schema)>,
    },
}

#[derive(Default)]
struct Pending {
    own: Option<Constraint>,
    children: Vec<(String, Pending)>,
}

impl Pending {
    fn child(&mut self, key: &str) -> &mut Pending {
        let pos = match self.children.iter().position(|(k, _)| k == key) {
            Some(pos) => pos,
            None => {
                self.children.push((key.to_string(), Pending::default()));
                self.children.len() - 1
            }
        };
        &mut self.children[pos].1
    }

    fn claim(&mut self, c: Constraint) {
        self.own = Some(match self.own.take() {
            Some(prev) => prev.merge(c),
            None => c,
        });
    }

    fn finish(self) -> Schema {
        if self.children.is_empty() {
            return Schema::Leaf(self.own.unwrap_or_default());
        }
        let numeric: Option<Vec<usize>> = self
            .children
            .iter()
            .map(|(k, _)| k.parse::<usize>().ok())
            .collect();
        match numeric {
            Some(indices) => Schema::Array {
                own: self.own,
                items: indices
                    .into_iter()
                    .zip(self.children)
                    .map(|(i, (_, p))| (i, p.finish()))
                    .collect(),
            },
            None => Schema::Object {
                own: self.own,
                fields: self
                    .children
                    .into_iter()
                    .map(|(k, p)| (k, p.finish()))
                    .collect(),
            },
        }
    }
}

/// Evaluate every factory against `values` and fold the results into one
/// schema. A path claimed both as a leaf and as a parent keeps the leaf
/// constraint as the container's own constraint.
pub fn build_schema(entries: &[SchemaEntry], values: &JsonValue) -> Schema {
    let mut root = Pending::default();
    for entry in entries {
        let constraint = (entry.factory)(values);
        let mut node = &mut root;
        for seg in path::normalize(&entry.path).split('.').filter(|s| !s.is_empty()) {
            node = node.child(seg);
        }
        node.claim(constraint);
    }
    root.finish()
}

impl Schema {
    /// Validate `root`, reporting issues in declaration order with paths
    /// relative to `root`.
    pub fn validate(&self, root: &JsonValue) -> Vec<Issue> {
        let mut out = Vec::new();
        self.walk("", Some(root), &mut out);
        out
    }

    fn walk(&self, at: &str, value: Option<&JsonValue>, out: &mut Vec<Issue>) {
        let null = JsonValue::Null;
        let own = match self {
            Schema::Leaf(c) => Some(c),
            Schema::Object { own, .. } | Schema::Array { own, .. } => own.as_ref(),
        };
        if let Some(c) = own {
            if !at.is_empty() {
                if let Err(message) = c.check(value.unwrap_or(&null)) {
                    out.push(Issue {
                        path: at.to_string(),
                        message,
                    });
                }
            }
        }
        match self {
            Schema::Leaf(_) => {}
            Schema::Object { fields, .. } => {
                for (key, child) in fields {
                    let v = value.and_then(|v| v.get(key.as_str()));
                    child.walk(&path::join(at, key), v, out);
                }
            }
            Schema::Array { items, .. } => {
                for (idx, child) in items {
                    let v = value.and_then(|v| match v {
                        JsonValue::Array(arr) => arr.get(*idx),
                        JsonValue::Object(map) => map.get(&idx.to_string()),
                        _ => None,
                    });
                    child.walk(&path::join(at, &idx.to_string()), v, out);
                }
            }
        }
    }

    /// The constraint declared at exactly `path`, if any.
    pub fn constraint_at(&self, p: &str) -> Option<&Constraint> {
        let mut node = self;
        for seg in path::normalize(p).split('.').filter(|s| !s.is_empty()) {
            node = match node {
                Schema::Leaf(_) => return None,
                Schema::Object { fields, .. } => &fields.iter().find(|(k, _)| k == seg)?.1,
                Schema::Array { items, .. } => {
                    let idx = seg.parse::<usize>().ok()?;
                    &items.iter().find(|(i, _)| *i == idx)?.1
                }
            };
        }
        match node {
            Schema::Leaf(c) => Some(c),
            Schema::Object { own, .. } | Schema::Array { own, .. } => own.as_ref(),
        }
    }

    /// Every path carrying a constraint, in declaration order.
    pub fn paths(&self) -> Vec<String> {
        fn collect(s: &Schema, at: String, out: &mut Vec<String>) {
            match s {
                Schema::Leaf(_) => out.push(at),
                Schema::Object { own, fields } => {
                    if own.is_some() {
                        out.push(at.clone());
                    }
                    for (k, child) in fields {
                        collect(child, path::join(&at, k), out);
                    }
                }
                Schema::Array { own, items } => {
                    if own.is_some() {
                        out.push(at.clone());
                    }
                    for (i, child) in items {
                        collect(child, path::join(&at, &i.to_string()), out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        collect(self, String::new(), &mut out);
        out.retain(|p| !p.is_empty());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::rc::Rc;

    fn entry(path: &str, f: impl Fn(&JsonValue) -> Constraint + 'static) -> SchemaEntry {
        SchemaEntry {
            path: path.into(),
            factory: Rc::new(f),
        }
    }

    #[test]
    fn builds_nested_objects_and_reports_full_paths() {
        let entries = vec![
            entry("customer.name", |_| Constraint::new().required()),
            entry("customer.email", |_| Constraint::new().email()),
            entry("note", |_| Constraint::new()),
        ];
        let schema = build_schema(&entries, &json!({}));
        assert!(matches!(schema, Schema::Object { .. }));
        assert_eq!(schema.paths(), vec!["customer.name", "customer.email", "note"]);
        let issues = schema.validate(&json!({"customer": {"email": "nope"}}));
        assert_eq!(
            issues,
            vec![
                Issue {
                    path: "customer.name".into(),
                    message: "This field is required".into()
                },
                Issue {
                    path: "customer.email".into(),
                    message: "Invalid email".into()
                },
            ]
        );
    }

    #[test]
    fn numeric_siblings_become_an_array_schema() {
        let entries = vec![
            entry("items.0.name", |_| Constraint::new().required()),
            entry("items.1.name", |_| Constraint::new().required()),
        ];
        let schema = build_schema(&entries, &json!({}));
        match &schema {
            Schema::Object { fields, .. } => {
                assert!(matches!(fields[0].1, Schema::Array { .. }));
            }
            _ => panic!("expected object root"),
        }
        let issues = schema.validate(&json!({"items": [{"name": "a"}, {"name": ""}]}));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "items.1.name");
    }

    #[test]
    fn leaf_and_parent_at_same_path_are_merged() {
        let entries = vec![
            entry("address", |_| Constraint::new().custom("needs a city", |v| {
                v.get("city").is_some()
            })),
            entry("address.zip", |_| Constraint::new().min_length(5)),
        ];
        let schema = build_schema(&entries, &json!({}));
        let issues = schema.validate(&json!({"address": {"zip": "12"}}));
        let paths: Vec<_> = issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["address", "address.zip"]);
        assert!(schema.constraint_at("address").is_some());
        assert!(schema.constraint_at("address.zip").is_some());
        assert!(schema.constraint_at("address.street").is_none());
    }

    #[test]
    fn shape_follows_current_values() {
        let entries = vec![entry("vat_id", |v: &JsonValue| {
            Constraint::new().required_if(v.get("kind") == Some(&json!("business")))
        })];
        let private = build_schema(&entries, &json!({"kind": "private"}));
        assert!(private.validate(&json!({"kind": "private"})).is_empty());
        let business = build_schema(&entries, &json!({"kind": "business"}));
        assert_eq!(business.validate(&json!({"kind": "business"})).len(), 1);
        assert!(business.constraint_at("vat_id").is_some_and(|c| c.required));
    }

    #[test]
    fn duplicate_leaf_claims_intersect() {
        let entries = vec![
            entry("code", |_| Constraint::new().min_length(2)),
            entry("code", |_| Constraint::new().max_length(3)),
        ];
        let schema = build_schema(&entries, &json!({}));
        assert!(schema.validate(&json!({"code": "ab"})).is_empty());
        assert_eq!(schema.validate(&json!({"code": "abcd"})).len(), 1);
        assert_eq!(schema.validate(&json!({"code": "a"})).len(), 1);
    }
}
