use super::*;
use serde_json::json;
use std::io::Write;

fn yaml(src: &str) -> JsonValue {
    serde_yaml::from_str(src).unwrap()
}

fn constraint_of(node: &Node, doc: &JsonValue) -> Constraint {
    let factory = match node {
        Node::Field(f) => f.validation.clone(),
        Node::Table(t) => t.validation.clone(),
        _ => None,
    };
    factory.map(|f| f(doc)).unwrap_or_default()
}

const ORDER_FORM: &str = r#"
title: Order
fields:
  - name: customer.email
    type: email
    validation: { required: true, email: true }
  - tabs:
      - title: Shipping
        fields:
          - name: address
            type: textarea
      - title: Billing
        hidden: { field: same_billing, truthy: true }
        fields:
          - name: vat_id
            validation:
              required_when: { field: kind, equals: business }
  - accordion:
      - title: Notes
        open: true
        fields:
          - name: note
    allow_multiple: true
  - table:
      data_source: items
      title: Line items
      columns: [name, qty]
      validation: { min_items: 1 }
      fields:
        - name: name
          validation: { required: true }
        - name: qty
          type: number
        - table:
            data_source: parts
            fields:
              - name: sku
"#;

#[test]
fn parses_every_node_shape() {
    let spec = parse_form(&yaml(ORDER_FORM)).unwrap();
    assert_eq!(spec.title, "Order");
    assert_eq!(spec.nodes.len(), 4);
    match &spec.nodes[0] {
        Node::Field(f) => {
            assert_eq!(f.name.as_deref(), Some("customer.email"));
            assert_eq!(f.field_type, FieldType::Email);
            assert_eq!(f.label, "Email");
        }
        other => panic!("expected field, got {other:?}"),
    }
    match &spec.nodes[1] {
        Node::Tabs(t) => {
            assert_eq!(t.tabs.len(), 2);
            assert_eq!(t.tabs[1].title, "Billing");
        }
        other => panic!("expected tabs, got {other:?}"),
    }
    match &spec.nodes[2] {
        Node::Accordion(a) => {
            assert!(a.allow_multiple);
            assert!(a.sections[0].open);
        }
        other => panic!("expected accordion, got {other:?}"),
    }
    match &spec.nodes[3] {
        Node::Table(t) => {
            assert_eq!(t.data_source, "items");
            assert_eq!(t.columns, vec!["name", "qty"]);
            assert_eq!(t.child_tables().len(), 1);
            assert_eq!(t.child_tables()[0].data_source, "parts");
        }
        other => panic!("expected table, got {other:?}"),
    }
}

#[test]
fn conditions_are_evaluated_against_the_document() {
    let spec = parse_form(&yaml(ORDER_FORM)).unwrap();
    let Node::Tabs(t) = &spec.nodes[1] else {
        panic!("expected tabs");
    };
    let Flag::When(hidden) = &t.tabs[1].hidden else {
        panic!("expected a predicate");
    };
    assert!(hidden(&json!({"same_billing": true})));
    assert!(!hidden(&json!({"same_billing": false})));
    assert!(!hidden(&json!({})));

    let Node::Field(vat) = &t.tabs[1].fields[0] else {
        panic!("expected field");
    };
    let node = Node::Field(vat.clone());
    assert!(constraint_of(&node, &json!({"kind": "business"})).required);
    assert!(!constraint_of(&node, &json!({"kind": "private"})).required);
}

#[test]
fn compound_conditions() {
    let c = Condition::parse(
        &json!({"any": [
            {"field": "a", "in": [1, 2]},
            {"all": [{"field": "b", "empty": false}, {"field": "c", "not_equals": "x"}]}
        ]}),
        "hidden",
    )
    .unwrap();
    assert!(c.eval(&json!({"a": 2})));
    assert!(c.eval(&json!({"a": 3, "b": "set", "c": "y"})));
    assert!(!c.eval(&json!({"a": 3, "b": "", "c": "y"})));
    assert!(!c.eval(&json!({"a": 3, "b": "set", "c": "x"})));
}

#[test]
fn validation_compiles_to_constraints() {
    let spec = parse_form(&yaml(
        r#"
fields:
  - name: code
    validation:
      pattern: "^[A-Z]{3}$"
      min_length: 3
      message: Three capitals
  - name: age
    type: integer
    validation: { integer: true, min: 18, max: 99 }
"#,
    ))
    .unwrap();
    let doc = json!({});
    let code = constraint_of(&spec.nodes[0], &doc);
    assert_eq!(code.check(&json!("abc")).unwrap_err(), "Three capitals");
    assert!(code.check(&json!("ABC")).is_ok());
    let age = constraint_of(&spec.nodes[1], &doc);
    assert_eq!(age.check(&json!(17)).unwrap_err(), "Must be at least 18");
    assert_eq!(age.check(&json!(20.5)).unwrap_err(), "Invalid integer");
}

#[test]
fn table_validation_applies_to_the_array() {
    let spec = parse_form(&yaml(ORDER_FORM)).unwrap();
    let c = constraint_of(&spec.nodes[3], &json!({}));
    assert_eq!(c.check(&json!([])).unwrap_err(), "At least 1 item(s) required");
    assert!(c.check(&json!([{"name": "a"}])).is_ok());
}

#[test]
fn conflicting_shape_keys_name_the_location() {
    let err = parse_form(&yaml(
        r#"
fields:
  - name: ok
  - fields:
      - name: a
        tabs: []
"#,
    ))
    .unwrap_err();
    assert_eq!(
        err,
        LoadError::ConflictingShape {
            at: "fields[1].fields[0]".into(),
            keys: vec!["name", "tabs"],
        }
    );
    assert!(err.to_string().starts_with("fields[1].fields[0]: conflicting"));
}

#[test]
fn malformed_declarations_are_rejected() {
    let bad_condition = parse_form(&yaml("fields:\n  - name: a\n    hidden: { field: b }\n"));
    assert!(matches!(bad_condition, Err(LoadError::Invalid { at, .. }) if at == "fields[0].hidden"));

    let bad_pattern = parse_form(&yaml("fields:\n  - name: a\n    validation: { pattern: '(' }\n"));
    assert!(matches!(bad_pattern, Err(LoadError::Invalid { .. })));

    let unknown_rule = parse_form(&yaml("fields:\n  - name: a\n    validation: { requried: true }\n"));
    assert!(matches!(unknown_rule, Err(LoadError::Invalid { .. })));

    let bad_type = parse_form(&yaml("fields:\n  - name: a\n    type: slider\n"));
    assert!(matches!(bad_type, Err(LoadError::Invalid { at, .. }) if at == "fields[0].type"));
}

#[test]
fn unnamed_field_loads_for_in_place_reporting() {
    let spec = parse_form(&yaml("fields:\n  - label: Orphan\n  - table: { title: T }\n")).unwrap();
    match &spec.nodes[0] {
        Node::Field(f) => {
            assert!(f.name.is_none());
            assert_eq!(f.label, "Orphan");
        }
        other => panic!("expected field, got {other:?}"),
    }
    assert!(matches!(&spec.nodes[1], Node::Table(t) if t.data_source.is_empty()));
}

#[test]
fn options_accept_strings_pairs_and_records() {
    let spec = parse_form(&yaml(
        r#"
fields:
  - name: tier
    type: select
    options:
      - gold
      - { label: Silver, value: s }
      - { id: 3, title: Bronze }
"#,
    ))
    .unwrap();
    let Node::Field(f) = &spec.nodes[0] else {
        panic!("expected field");
    };
    let pairs: Vec<(String, JsonValue)> = f
        .options
        .iter()
        .map(|o| (o.label.clone(), o.value.clone()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("gold".to_string(), json!("gold")),
            ("Silver".to_string(), json!("s")),
            ("Bronze".to_string(), json!(3)),
        ]
    );
}

#[test]
fn loads_files_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let form_path = dir.path().join("form.yaml");
    std::fs::write(&form_path, ORDER_FORM).unwrap();
    let spec = load_form(&form_path).unwrap();
    assert_eq!(spec.nodes.len(), 4);

    let doc_path = dir.path().join("doc.json");
    let mut f = std::fs::File::create(&doc_path).unwrap();
    write!(f, r#"{{"items": [{{"name": "a", "qty": 1.5}}]}}"#).unwrap();
    assert_eq!(
        load_document(&doc_path).unwrap(),
        json!({"items": [{"name": "a", "qty": 1.5}]})
    );

    let yaml_doc = dir.path().join("doc.yaml");
    std::fs::write(&yaml_doc, "customer:\n  email: a@b.co\n").unwrap();
    assert_eq!(
        load_document(&yaml_doc).unwrap(),
        json!({"customer": {"email": "a@b.co"}})
    );

    let empty = dir.path().join("empty.yaml");
    std::fs::write(&empty, "").unwrap();
    assert_eq!(load_document(&empty).unwrap(), json!({}));
}

#[test]
fn yaml_errors_carry_file_location() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "fields:\n  - name: a\n   bad: [").unwrap();
    let err = load_form(file.path()).unwrap_err().to_string();
    assert!(err.contains(&file.path().display().to_string()));
    assert!(err.contains(':'));

    let missing = load_form(Path::new("/nonexistent/form.yaml")).unwrap_err();
    assert!(format!("{missing:#}").contains("reading"));
}
