use crate::engine::constraint::{is_empty_value, Constraint, Rule};
use crate::model::{
    AccordionGroup, FieldDecl, FieldType, Flag, FormSpec, Group, Node, SectionSpec, SelectOption,
    TabSpec, TableDecl, TabsGroup,
};
use crate::nav::path::get_by_path;
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum LoadError {
    #[error("{at}: expected a mapping")]
    NotAMapping { at: String },
    #[error("{at}: conflicting shape keys {}", .keys.join(", "))]
    ConflictingShape { at: String, keys: Vec<&'static str> },
    #[error("{at}: {message}")]
    Invalid { at: String, message: String },
}

fn invalid(at: &str, message: impl Into<String>) -> LoadError {
    LoadError::Invalid {
        at: at.to_string(),
        message: message.into(),
    }
}

fn child_at(at: &str, key: &str, i: usize) -> String {
    if at.is_empty() {
        format!("{key}[{i}]")
    } else {
        format!("{at}.{key}[{i}]")
    }
}

fn key_at(at: &str, key: &str) -> String {
    if at.is_empty() {
        key.to_string()
    } else {
        format!("{at}.{key}")
    }
}

/// Predicate over the whole document, as written in `hidden`/`disabled`/
/// `required_when`.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Equals { field: String, value: JsonValue },
    NotEquals { field: String, value: JsonValue },
    In { field: String, values: Vec<JsonValue> },
    Truthy { field: String, expect: bool },
    Empty { field: String, expect: bool },
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

fn truthy(v: Option<&JsonValue>) -> bool {
    match v {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(JsonValue::String(s)) => !s.is_empty(),
        Some(JsonValue::Array(a)) => !a.is_empty(),
        Some(JsonValue::Object(o)) => !o.is_empty(),
    }
}

impl Condition {
    pub fn eval(&self, doc: &JsonValue) -> bool {
        let at = |field: &str| get_by_path(doc, field);
        match self {
            Condition::Equals { field, value } => at(field) == Some(value),
            Condition::NotEquals { field, value } => at(field) != Some(value),
            Condition::In { field, values } => at(field).is_some_and(|v| values.contains(v)),
            Condition::Truthy { field, expect } => truthy(at(field)) == *expect,
            Condition::Empty { field, expect } => {
                at(field).map_or(true, is_empty_value) == *expect
            }
            Condition::All(cs) => cs.iter().all(|c| c.eval(doc)),
            Condition::Any(cs) => cs.iter().any(|c| c.eval(doc)),
        }
    }

    pub fn parse(v: &JsonValue, at: &str) -> Result<Condition, LoadError> {
        let obj = v.as_object().ok_or_else(|| LoadError::NotAMapping {
            at: at.to_string(),
        })?;
        for key in ["all", "any"] {
            if let Some(list) = obj.get(key) {
                let items = list
                    .as_array()
                    .ok_or_else(|| invalid(at, format!("'{key}' must be a list")))?;
                let parsed = items
                    .iter()
                    .enumerate()
                    .map(|(i, c)| Condition::parse(c, &child_at(at, key, i)))
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(if key == "all" {
                    Condition::All(parsed)
                } else {
                    Condition::Any(parsed)
                });
            }
        }
        let field = obj
            .get("field")
            .and_then(|f| f.as_str())
            .ok_or_else(|| invalid(at, "condition needs 'field'"))?
            .to_string();
        let flag = |key: &str| obj.get(key).map(|b| b.as_bool().unwrap_or(true));
        if let Some(value) = obj.get("equals") {
            Ok(Condition::Equals {
                field,
                value: value.clone(),
            })
        } else if let Some(value) = obj.get("not_equals") {
            Ok(Condition::NotEquals {
                field,
                value: value.clone(),
            })
        } else if let Some(values) = obj.get("in") {
            let values = values
                .as_array()
                .ok_or_else(|| invalid(at, "'in' must be a list"))?
                .clone();
            Ok(Condition::In { field, values })
        } else if let Some(expect) = flag("truthy") {
            Ok(Condition::Truthy { field, expect })
        } else if let Some(expect) = flag("empty") {
            Ok(Condition::Empty { field, expect })
        } else {
            Err(invalid(
                at,
                "condition needs one of equals, not_equals, in, truthy, empty",
            ))
        }
    }
}

fn parse_flag(v: Option<&JsonValue>, at: &str) -> Result<Flag, LoadError> {
    match v {
        None | Some(JsonValue::Null) => Ok(Flag::default()),
        Some(JsonValue::Bool(b)) => Ok(Flag::Const(*b)),
        Some(other) => {
            let cond = Condition::parse(other, at)?;
            Ok(Flag::when(move |doc| cond.eval(doc)))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawValidation {
    required: bool,
    required_when: Option<JsonValue>,
    email: bool,
    number: bool,
    integer: bool,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<String>,
    min: Option<f64>,
    max: Option<f64>,
    one_of: Option<Vec<JsonValue>>,
    min_items: Option<usize>,
    max_items: Option<usize>,
    message: Option<String>,
}

/// Compiles a `validation:` block into a constraint factory. Everything but
/// `required_when` is fixed at load time.
fn parse_validation(
    v: Option<&JsonValue>,
    at: &str,
) -> Result<Option<Rc<dyn Fn(&JsonValue) -> Constraint>>, LoadError> {
    let Some(v) = v.filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let raw: RawValidation =
        serde_json::from_value(v.clone()).map_err(|e| invalid(at, e.to_string()))?;
    let required_when = raw
        .required_when
        .as_ref()
        .map(|c| Condition::parse(c, &key_at(at, "required_when")))
        .transpose()?;

    let mut base = Constraint::new();
    base.required = raw.required;
    base.message = raw.message;
    if raw.email {
        base = base.email();
    }
    if raw.number {
        base = base.number();
    }
    if raw.integer {
        base = base.integer();
    }
    if let Some(n) = raw.min_length {
        base = base.min_length(n);
    }
    if let Some(n) = raw.max_length {
        base = base.max_length(n);
    }
    if let Some(p) = raw.pattern {
        let re = Regex::new(&p).map_err(|e| invalid(at, format!("bad pattern: {e}")))?;
        base = base.pattern(re);
    }
    if let Some(n) = raw.min {
        base = base.min(n);
    }
    if let Some(n) = raw.max {
        base = base.max(n);
    }
    if let Some(values) = raw.one_of {
        base = base.one_of(values);
    }
    if let Some(n) = raw.min_items {
        base = base.rule(Rule::MinItems(n));
    }
    if let Some(n) = raw.max_items {
        base = base.rule(Rule::MaxItems(n));
    }
    Ok(Some(Rc::new(move |doc: &JsonValue| {
        let c = base.clone();
        match &required_when {
            Some(cond) => c.required_if(cond.eval(doc)),
            None => c,
        }
    })))
}

/// Options are a list of plain strings, `{label, value}` pairs, or records
/// with `id` and `title`/`name`.
fn parse_options(v: Option<&JsonValue>, at: &str) -> Result<Vec<SelectOption>, LoadError> {
    let Some(v) = v else {
        return Ok(Vec::new());
    };
    let items = v
        .as_array()
        .ok_or_else(|| invalid(at, "'options' must be a list"))?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let opt = match item {
            JsonValue::String(s) => SelectOption {
                label: s.clone(),
                value: item.clone(),
            },
            JsonValue::Object(obj) => {
                let value = obj
                    .get("value")
                    .or_else(|| obj.get("id"))
                    .cloned()
                    .unwrap_or_else(|| item.clone());
                let label = obj
                    .get("label")
                    .or_else(|| obj.get("title"))
                    .or_else(|| obj.get("name"))
                    .and_then(|l| l.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| match &value {
                        JsonValue::String(s) => s.clone(),
                        other => other.to_string(),
                    });
                SelectOption { label, value }
            }
            other => SelectOption {
                label: other.to_string(),
                value: other.clone(),
            },
        };
        out.push(opt);
    }
    Ok(out)
}

fn str_of(obj: &serde_json::Map<String, JsonValue>, key: &str) -> Option<String> {
    obj.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn parse_nodes(list: Option<&JsonValue>, at: &str, key: &str) -> Result<Vec<Node>, LoadError> {
    let Some(list) = list else {
        return Ok(Vec::new());
    };
    let items = list
        .as_array()
        .ok_or_else(|| invalid(&key_at(at, key), "must be a list"))?;
    items
        .iter()
        .enumerate()
        .map(|(i, n)| parse_node(n, &child_at(at, key, i)))
        .collect()
}

const SHAPE_KEYS: [&str; 5] = ["name", "fields", "tabs", "accordion", "table"];

fn parse_node(v: &JsonValue, at: &str) -> Result<Node, LoadError> {
    let obj = v.as_object().ok_or_else(|| LoadError::NotAMapping {
        at: at.to_string(),
    })?;
    let keys: Vec<&'static str> = SHAPE_KEYS
        .into_iter()
        .filter(|k| obj.contains_key(*k))
        .collect();
    if keys.len() > 1 {
        return Err(LoadError::ConflictingShape {
            at: at.to_string(),
            keys,
        });
    }
    let hidden = parse_flag(obj.get("hidden"), &key_at(at, "hidden"))?;
    match keys.first().copied() {
        Some("fields") => Ok(Node::Fields(Group {
            title: str_of(obj, "title"),
            fields: parse_nodes(obj.get("fields"), at, "fields")?,
            hidden,
        })),
        Some("tabs") => {
            let tabs = obj
                .get("tabs")
                .and_then(|t| t.as_array())
                .ok_or_else(|| invalid(&key_at(at, "tabs"), "must be a list"))?
                .iter()
                .enumerate()
                .map(|(i, tab)| {
                    let tat = child_at(at, "tabs", i);
                    let t = tab
                        .as_object()
                        .ok_or_else(|| LoadError::NotAMapping { at: tat.clone() })?;
                    Ok(TabSpec {
                        title: str_of(t, "title").unwrap_or_else(|| format!("Tab {}", i + 1)),
                        fields: parse_nodes(t.get("fields"), &tat, "fields")?,
                        hidden: parse_flag(t.get("hidden"), &key_at(&tat, "hidden"))?,
                    })
                })
                .collect::<Result<Vec<_>, LoadError>>()?;
            Ok(Node::Tabs(TabsGroup { tabs, hidden }))
        }
        Some("accordion") => {
            let sections = obj
                .get("accordion")
                .and_then(|t| t.as_array())
                .ok_or_else(|| invalid(&key_at(at, "accordion"), "must be a list"))?
                .iter()
                .enumerate()
                .map(|(i, sec)| {
                    let sat = child_at(at, "accordion", i);
                    let s = sec
                        .as_object()
                        .ok_or_else(|| LoadError::NotAMapping { at: sat.clone() })?;
                    Ok(SectionSpec {
                        title: str_of(s, "title").unwrap_or_else(|| format!("Section {}", i + 1)),
                        fields: parse_nodes(s.get("fields"), &sat, "fields")?,
                        hidden: parse_flag(s.get("hidden"), &key_at(&sat, "hidden"))?,
                        open: s.get("open").and_then(|o| o.as_bool()).unwrap_or(false),
                    })
                })
                .collect::<Result<Vec<_>, LoadError>>()?;
            Ok(Node::Accordion(AccordionGroup {
                sections,
                allow_multiple: obj
                    .get("allow_multiple")
                    .and_then(|b| b.as_bool())
                    .unwrap_or(false),
                hidden,
            }))
        }
        Some("table") => {
            let tat = key_at(at, "table");
            let t = obj
                .get("table")
                .and_then(|t| t.as_object())
                .ok_or_else(|| LoadError::NotAMapping { at: tat.clone() })?;
            let columns = match t.get("columns") {
                Some(JsonValue::Array(cols)) => cols
                    .iter()
                    .filter_map(|c| c.as_str().map(str::to_string))
                    .collect(),
                _ => Vec::new(),
            };
            Ok(Node::Table(TableDecl {
                // empty stays empty; the engine reports it in place
                data_source: str_of(t, "data_source").unwrap_or_default(),
                title: str_of(t, "title"),
                columns,
                fields: parse_nodes(t.get("fields"), &tat, "fields")?,
                // a hidden flag on either level applies
                hidden: match t.get("hidden") {
                    Some(h) => parse_flag(Some(h), &key_at(&tat, "hidden"))?,
                    None => hidden,
                },
                disabled: parse_flag(t.get("disabled"), &key_at(&tat, "disabled"))?,
                validation: parse_validation(t.get("validation"), &key_at(&tat, "validation"))?,
            }))
        }
        _ => {
            let field_type = match obj.get("type") {
                Some(t) => serde_json::from_value::<FieldType>(t.clone())
                    .map_err(|e| invalid(&key_at(at, "type"), e.to_string()))?,
                None => FieldType::default(),
            };
            let name = str_of(obj, "name").filter(|n| !n.trim().is_empty());
            let mut decl = match &name {
                Some(n) => FieldDecl::new(n.clone(), field_type),
                None => FieldDecl {
                    field_type,
                    ..Default::default()
                },
            };
            if let Some(label) = str_of(obj, "label") {
                decl.label = label;
            }
            decl.placeholder = str_of(obj, "placeholder");
            decl.hidden = hidden;
            decl.disabled = parse_flag(obj.get("disabled"), &key_at(at, "disabled"))?;
            decl.options = parse_options(obj.get("options"), &key_at(at, "options"))?;
            decl.validation = parse_validation(obj.get("validation"), &key_at(at, "validation"))?;
            Ok(Node::Field(decl))
        }
    }
}

/// Typed form declaration from an already-parsed YAML/JSON value.
pub fn parse_form(v: &JsonValue) -> Result<FormSpec, LoadError> {
    let obj = v.as_object().ok_or_else(|| LoadError::NotAMapping {
        at: "<root>".into(),
    })?;
    Ok(FormSpec {
        title: str_of(obj, "title").unwrap_or_default(),
        nodes: parse_nodes(obj.get("fields"), "", "fields")?,
    })
}

fn read_yaml(path: &Path) -> Result<JsonValue> {
    let s = std::fs::read_to_string(path).with_context(|| format!("reading {path:?}"))?;
    if s.trim().is_empty() {
        return Ok(JsonValue::Null);
    }
    let v: JsonValue = serde_yaml::from_str(&s).map_err(|e| match e.location() {
        Some(loc) => anyhow::anyhow!(
            "{}:{}:{}: {}",
            path.display(),
            loc.line(),
            loc.column(),
            e
        ),
        None => anyhow::anyhow!("{}: {}", path.display(), e),
    })?;
    Ok(v)
}

/// Loads a form declaration file (YAML, which also accepts JSON).
pub fn load_form(path: &Path) -> Result<FormSpec> {
    let v = read_yaml(path)?;
    let spec = parse_form(&v).with_context(|| format!("loading form {}", path.display()))?;
    debug!(path = %path.display(), nodes = spec.nodes.len(), "form loaded");
    Ok(spec)
}

/// Loads the source document. `.json` files go through serde_json so number
/// formatting survives; everything else is read as YAML.
pub fn load_document(path: &Path) -> Result<JsonValue> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let v = if is_json {
        let s = std::fs::read_to_string(path).with_context(|| format!("reading {path:?}"))?;
        serde_json::from_str(&s).with_context(|| format!("parsing {}", path.display()))?
    } else {
        read_yaml(path)?
    };
    if v.is_null() {
        return Ok(JsonValue::Object(Default::default()));
    }
    Ok(v)
}

#[cfg(test)]
mod loader_tests;
