use crate::model::{FieldType, SelectOption};
use crate::nav::keys::{draft_path, row_path};
use crate::nav::path;
use serde_json::Value as JsonValue;

/// Where a control's value lives: the base document, a table's add-form
/// buffer, or the edit buffer of the active row.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldTarget {
    Base(String),
    Draft { table: String, field: String },
    Row { table: String, index: usize, field: String },
}

impl FieldTarget {
    /// Full path; also the control's identifier for focus and errors.
    pub fn path(&self) -> String {
        match self {
            FieldTarget::Base(p) => path::normalize(p),
            FieldTarget::Draft { table, field } => path::join(&draft_path(table), field),
            FieldTarget::Row {
                table,
                index,
                field,
            } => path::join(&row_path(table, *index), field),
        }
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            FieldTarget::Base(_) => None,
            FieldTarget::Draft { table, .. } | FieldTarget::Row { table, .. } => Some(table),
        }
    }
}

/// Everything the rendering layer needs to draw one control. Edits come
/// back as `FormMsg::Change`/`FormMsg::Blur` carrying `target`.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlBinding {
    pub target: FieldTarget,
    pub id: String,
    pub value: JsonValue,
    pub label: String,
    pub placeholder: Option<String>,
    pub help_text: Option<String>,
    pub required: bool,
    pub disabled: bool,
    pub field_type: FieldType,
    pub options: Vec<SelectOption>,
}

impl ControlBinding {
    /// Text shown in a one-line control.
    pub fn display_value(&self) -> String {
        match &self.value {
            JsonValue::Null => String::new(),
            JsonValue::String(s) => s.clone(),
            JsonValue::Bool(b) => if *b { "On" } else { "Off" }.to_string(),
            JsonValue::Array(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join(", "),
            other => other.to_string(),
        }
    }
}

/// What a table control receives. Selection changes come back as
/// `FormMsg::SelectRow`, whole-array edits as `FormMsg::ReplaceRows`.
#[derive(Clone, Debug, PartialEq)]
pub struct TableBinding {
    pub path: String,
    pub title: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<JsonValue>,
    pub active_row: Option<usize>,
    pub disabled: bool,
    pub can_add: bool,
    pub can_update: bool,
    pub can_delete: bool,
    pub help_text: Option<String>,
}

/// One entry of the render plan, in display order. `depth` is the nesting
/// level for indentation.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderItem {
    GroupHeader {
        key: String,
        title: String,
        depth: usize,
    },
    TabBar {
        key: String,
        /// Visible tabs as (declaration index, title).
        tabs: Vec<(usize, String)>,
        active: usize,
        depth: usize,
    },
    SectionHeader {
        key: String,
        index: usize,
        title: String,
        open: bool,
        allow_multiple: bool,
        depth: usize,
    },
    Control {
        binding: ControlBinding,
        /// Output of the field's own `render` override.
        custom: Option<String>,
        depth: usize,
    },
    Table {
        binding: TableBinding,
        depth: usize,
    },
    DeclarationError {
        key: String,
        message: String,
        depth: usize,
    },
    Placeholder {
        key: String,
        depth: usize,
    },
}

impl RenderItem {
    pub fn depth(&self) -> usize {
        match self {
            RenderItem::GroupHeader { depth, .. }
            | RenderItem::TabBar { depth, .. }
            | RenderItem::SectionHeader { depth, .. }
            | RenderItem::Control { depth, .. }
            | RenderItem::Table { depth, .. }
            | RenderItem::DeclarationError { depth, .. }
            | RenderItem::Placeholder { depth, .. } => *depth,
        }
    }

    /// Path a control or table registers under, for focus lookups.
    pub fn focus_path(&self) -> Option<String> {
        match self {
            RenderItem::Control { binding, .. } => Some(binding.id.clone()),
            RenderItem::Table { binding, .. } => Some(binding.path.clone()),
            _ => None,
        }
    }
}
