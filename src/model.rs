use crate::engine::binding::ControlBinding;
use crate::engine::constraint::Constraint;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::fmt;
use std::rc::Rc;

pub type Predicate = Rc<dyn Fn(&JsonValue) -> bool>;
pub type ConstraintFactory = Rc<dyn Fn(&JsonValue) -> Constraint>;
pub type RenderFn = Rc<dyn Fn(&ControlBinding) -> String>;

/// A `hidden`/`disabled` declaration: either a constant or a predicate over
/// the whole document.
#[derive(Clone)]
pub enum Flag {
    Const(bool),
    When(Predicate),
}

impl Default for Flag {
    fn default() -> Self {
        Flag::Const(false)
    }
}

impl Flag {
    pub fn when(f: impl Fn(&JsonValue) -> bool + 'static) -> Self {
        Flag::When(Rc::new(f))
    }
}

impl From<bool> for Flag {
    fn from(b: bool) -> Self {
        Flag::Const(b)
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flag::Const(b) => write!(f, "Const({b})"),
            Flag::When(_) => write!(f, "When(<fn>)"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Email,
    Password,
    #[serde(alias = "text_area")]
    TextArea,
    Number,
    Integer,
    Date,
    Select,
    #[serde(alias = "multi-select", alias = "multi_select")]
    MultiSelect,
    Checkbox,
}

impl FieldType {
    /// Value a control of this type shows when nothing has been entered.
    pub fn empty_value(&self) -> JsonValue {
        match self {
            FieldType::Checkbox => JsonValue::Bool(false),
            FieldType::MultiSelect => JsonValue::Array(Vec::new()),
            _ => JsonValue::String(String::new()),
        }
    }

    /// Coerce raw control input into the value stored in the document.
    pub fn normalize(&self, v: &JsonValue) -> JsonValue {
        match (self, v) {
            (_, JsonValue::Null) => self.empty_value(),
            (FieldType::Number | FieldType::Integer, JsonValue::String(s)) => {
                let raw = s.trim();
                if raw.is_empty() {
                    return JsonValue::String(String::new());
                }
                if let Ok(i) = raw.parse::<i64>() {
                    return JsonValue::from(i);
                }
                match raw.parse::<f64>() {
                    Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                        JsonValue::from(f as i64)
                    }
                    Ok(f) => serde_json::Number::from_f64(f)
                        .map(JsonValue::Number)
                        .unwrap_or_else(|| v.clone()),
                    // left as typed; the constraint reports it
                    Err(_) => v.clone(),
                }
            }
            (FieldType::Checkbox, JsonValue::String(s)) => match s.trim() {
                "true" | "on" | "yes" | "1" => JsonValue::Bool(true),
                "" | "false" | "off" | "no" | "0" => JsonValue::Bool(false),
                _ => v.clone(),
            },
            (FieldType::MultiSelect, JsonValue::String(s)) => JsonValue::Array(
                s.split(',')
                    .map(|t| t.trim())
                    .filter(|t| !t.is_empty())
                    .map(|t| JsonValue::String(t.to_string()))
                    .collect(),
            ),
            (FieldType::Text | FieldType::Email | FieldType::Date, JsonValue::String(s)) => {
                JsonValue::String(s.trim().to_string())
            }
            _ => v.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: JsonValue,
}

#[derive(Clone, Default)]
pub struct FieldDecl {
    pub name: Option<String>,
    pub label: String,
    pub placeholder: Option<String>,
    pub field_type: FieldType,
    pub validation: Option<ConstraintFactory>,
    pub hidden: Flag,
    pub disabled: Flag,
    pub options: Vec<SelectOption>,
    pub render: Option<RenderFn>,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        let label = default_label(&name);
        Self {
            name: Some(name),
            label,
            field_type,
            ..Default::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn placeholder(mut self, text: impl Into<String>) -> Self {
        self.placeholder = Some(text.into());
        self
    }

    pub fn validate(mut self, f: impl Fn(&JsonValue) -> Constraint + 'static) -> Self {
        self.validation = Some(Rc::new(f));
        self
    }

    pub fn hidden(mut self, flag: impl Into<Flag>) -> Self {
        self.hidden = flag.into();
        self
    }

    pub fn disabled(mut self, flag: impl Into<Flag>) -> Self {
        self.disabled = flag.into();
        self
    }

    pub fn options(mut self, options: Vec<SelectOption>) -> Self {
        self.options = options;
        self
    }

    pub fn render(mut self, f: impl Fn(&ControlBinding) -> String + 'static) -> Self {
        self.render = Some(Rc::new(f));
        self
    }
}

impl fmt::Debug for FieldDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDecl")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("field_type", &self.field_type)
            .field("validation", &self.validation.is_some())
            .field("hidden", &self.hidden)
            .field("disabled", &self.disabled)
            .finish()
    }
}

/// "customer.first_name" -> "First name"
pub fn default_label(name: &str) -> String {
    let leaf = name.rsplit('.').next().unwrap_or(name).replace(['_', '-'], " ");
    let mut chars = leaf.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Clone, Debug, Default)]
pub struct Group {
    pub title: Option<String>,
    pub fields: Vec<Node>,
    pub hidden: Flag,
}

#[derive(Clone, Debug, Default)]
pub struct TabSpec {
    pub title: String,
    pub fields: Vec<Node>,
    pub hidden: Flag,
}

#[derive(Clone, Debug, Default)]
pub struct TabsGroup {
    pub tabs: Vec<TabSpec>,
    pub hidden: Flag,
}

#[derive(Clone, Debug, Default)]
pub struct SectionSpec {
    pub title: String,
    pub fields: Vec<Node>,
    pub hidden: Flag,
    pub open: bool,
}

#[derive(Clone, Debug, Default)]
pub struct AccordionGroup {
    pub sections: Vec<SectionSpec>,
    pub allow_multiple: bool,
    pub hidden: Flag,
}

#[derive(Clone, Default)]
pub struct TableDecl {
    /// Absolute document path for top-level tables; relative to the parent
    /// row for nested ones.
    pub data_source: String,
    pub title: Option<String>,
    pub columns: Vec<String>,
    pub fields: Vec<Node>,
    pub hidden: Flag,
    pub disabled: Flag,
    pub validation: Option<ConstraintFactory>,
}

impl TableDecl {
    pub fn new(data_source: impl Into<String>, fields: Vec<Node>) -> Self {
        Self {
            data_source: data_source.into(),
            fields,
            ..Default::default()
        }
    }

    /// Nested tables declared directly in this table's row schema.
    pub fn child_tables(&self) -> Vec<&TableDecl> {
        tables_in(&self.fields)
    }
}

/// Tables reachable from `nodes` through groups, tabs and sections, without
/// descending into other tables. Flags are not evaluated.
pub fn tables_in(nodes: &[Node]) -> Vec<&TableDecl> {
    fn walk<'a>(nodes: &'a [Node], out: &mut Vec<&'a TableDecl>) {
        for n in nodes {
            match n {
                Node::Table(t) => out.push(t),
                other => {
                    for branch in other.branches() {
                        walk(branch, out);
                    }
                }
            }
        }
    }
    let mut out = Vec::new();
    walk(nodes, &mut out);
    out
}

impl fmt::Debug for TableDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableDecl")
            .field("data_source", &self.data_source)
            .field("title", &self.title)
            .field("columns", &self.columns)
            .field("fields", &self.fields)
            .field("hidden", &self.hidden)
            .field("disabled", &self.disabled)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub enum Node {
    Field(FieldDecl),
    Fields(Group),
    Tabs(TabsGroup),
    Accordion(AccordionGroup),
    Table(TableDecl),
}

impl Node {
    /// Child node lists of a grouping node, in declaration order. Fields and
    /// tables have none (a table's row schema is not inlined).
    pub fn branches(&self) -> Vec<&[Node]> {
        match self {
            Node::Field(_) | Node::Table(_) => Vec::new(),
            Node::Fields(g) => vec![g.fields.as_slice()],
            Node::Tabs(t) => t.tabs.iter().map(|b| b.fields.as_slice()).collect(),
            Node::Accordion(a) => a.sections.iter().map(|s| s.fields.as_slice()).collect(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FormSpec {
    pub title: String,
    pub nodes: Vec<Node>,
}
