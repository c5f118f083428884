use crate::model::Node;
use crate::nav::keys::{branch_key, node_key};
use crate::nav::path;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// A broken declaration. Contained to the one node it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DeclarationError {
    #[error("field declared without a name")]
    MissingName,
    #[error("table declared without a data source")]
    MissingDataSource,
    #[error("field '{name}' overlaps the namespace of table '{table}'")]
    Collision { name: String, table: String },
}

/// Declaration errors keyed by node key.
#[derive(Clone, Debug, Default)]
pub struct DeclarationReport {
    errors: BTreeMap<String, DeclarationError>,
}

impl DeclarationReport {
    pub fn get(&self, key: &str) -> Option<&DeclarationError> {
        self.errors.get(key)
    }

    pub fn is_broken(&self, key: &str) -> bool {
        self.errors.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DeclarationError)> {
        self.errors.iter()
    }
}

/// Check every level of the tree (the root and each table's row schema)
/// for unnamed fields and for names colliding with a sibling table's path.
pub fn audit(nodes: &[Node]) -> DeclarationReport {
    fn collect<'a>(
        nodes: &'a [Node],
        parent: &str,
        fields: &mut Vec<(String, Option<&'a str>)>,
        tables: &mut Vec<(String, &'a crate::model::TableDecl)>,
    ) {
        for (i, node) in nodes.iter().enumerate() {
            let key = node_key(parent, i);
            match node {
                Node::Field(f) => fields.push((key, f.name.as_deref())),
                Node::Table(t) => tables.push((key, t)),
                other => {
                    for (b, branch) in other.branches().into_iter().enumerate() {
                        collect(branch, &branch_key(&key, b), fields, tables);
                    }
                }
            }
        }
    }

    fn level(nodes: &[Node], parent: &str, report: &mut DeclarationReport) {
        let mut fields = Vec::new();
        let mut tables = Vec::new();
        collect(nodes, parent, &mut fields, &mut tables);
        let sources: Vec<String> = tables
            .iter()
            .map(|(_, t)| path::normalize(&t.data_source))
            .filter(|s| !s.is_empty())
            .collect();
        for (key, name) in fields {
            let name = match name.map(path::normalize) {
                Some(n) if !n.is_empty() => n,
                _ => {
                    warn!(node = %key, "field without a name");
                    report.errors.insert(key, DeclarationError::MissingName);
                    continue;
                }
            };
            let clash = sources
                .iter()
                .find(|t| path::is_within(&name, t) || path::is_within(t, &name));
            if let Some(table) = clash {
                warn!(node = %key, field = %name, table = %table, "field collides with table");
                report.errors.insert(
                    key,
                    DeclarationError::Collision {
                        name,
                        table: table.clone(),
                    },
                );
            }
        }
        for (key, table) in tables {
            if path::normalize(&table.data_source).is_empty() {
                warn!(node = %key, "table without a data source");
                report.errors.insert(key, DeclarationError::MissingDataSource);
                continue;
            }
            level(&table.fields, &branch_key(&key, 0), report);
        }
    }

    let mut report = DeclarationReport::default();
    level(nodes, "", &mut report);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDecl, FieldType, Group, TableDecl};

    #[test]
    fn missing_name_is_reported_per_node() {
        let nodes = vec![
            Node::Field(FieldDecl::new("ok", FieldType::Text)),
            Node::Field(FieldDecl::default()),
            Node::Fields(Group {
                fields: vec![Node::Field(FieldDecl {
                    name: Some(" ".into()),
                    ..Default::default()
                })],
                ..Default::default()
            }),
        ];
        let report = audit(&nodes);
        assert_eq!(report.get("1"), Some(&DeclarationError::MissingName));
        assert!(!report.is_broken("0"));
        assert!(report.is_broken("2#0/0"));
        assert_eq!(report.iter().count(), 2);
    }

    #[test]
    fn field_under_table_namespace_collides() {
        let nodes = vec![
            Node::Field(FieldDecl::new("items.draft.name", FieldType::Text)),
            Node::Field(FieldDecl::new("itemsx", FieldType::Text)),
            Node::Table(TableDecl::new(
                "items",
                vec![
                    Node::Field(FieldDecl::new("parts", FieldType::Text)),
                    Node::Table(TableDecl::new("parts", vec![])),
                ],
            )),
            Node::Table(TableDecl::new("", vec![])),
        ];
        let report = audit(&nodes);
        assert!(matches!(
            report.get("0"),
            Some(DeclarationError::Collision { table, .. }) if table == "items"
        ));
        assert!(!report.is_broken("1"));
        assert!(report.is_broken("2#0/0"));
        assert_eq!(report.get("3"), Some(&DeclarationError::MissingDataSource));
        assert!(!audit(&[]).is_broken("0"));
        assert!(audit(&[]).is_empty());
    }
}
