pub mod form;
mod plan;


pub use form::{FormEngine, InvalidField, SubmitOutcome};

use crate::engine::binding::FieldTarget;
use crate::engine::rows::RowError;
use serde_json::Value as JsonValue;
use std::time::Instant;

pub enum FormMsg {
    Change {
        target: FieldTarget,
        value: JsonValue,
    },
    Blur(FieldTarget),
    SelectTab {
        group: String,
        index: usize,
    },
    ToggleSection {
        group: String,
        index: usize,
        allow_multiple: bool,
    },
    SelectRow {
        table: String,
        index: usize,
    },
    AddRow(String),
    UpdateRow(String),
    DeleteRow(String),
    CancelRow(String),
    ReplaceRows {
        table: String,
        rows: Vec<JsonValue>,
    },
    Submit,
    Reset,
    SetSource(JsonValue),
    SetDisabled(bool),
    SetLoading(bool),
    Tick(Instant),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Redraw,
    Submitted(SubmitOutcome),
    ShowToast { text: String, level: ToastLevel },
}

fn toast(text: impl Into<String>, level: ToastLevel) -> Effect {
    Effect::ShowToast {
        text: text.into(),
        level,
    }
}

fn row_effects(result: Result<String, RowError>, effects: &mut Vec<Effect>) {
    match result {
        Ok(text) => effects.push(toast(text, ToastLevel::Success)),
        // the offending paths already carry their messages
        Err(RowError::Invalid(issues)) => effects.push(toast(
            format!("{} field(s) need attention", issues.len()),
            ToastLevel::Error,
        )),
        Err(e) => effects.push(toast(e.to_string(), ToastLevel::Error)),
    }
}

pub fn update(engine: &mut FormEngine, msg: FormMsg) -> Vec<Effect> {
    use FormMsg::*;
    let mut effects: Vec<Effect> = Vec::new();
    match msg {
        Change { target, value } => {
            if let Err(e) = engine.change(target, value) {
                effects.push(toast(e.to_string(), ToastLevel::Error));
            }
        }
        Blur(target) => engine.blur(&target),
        SelectTab { group, index } => engine.panels_mut().select_tab(&group, index),
        ToggleSection {
            group,
            index,
            allow_multiple,
        } => engine
            .panels_mut()
            .toggle_section(&group, index, allow_multiple),
        SelectRow { table, index } => {
            if let Err(e) = engine.select_row(&table, index) {
                effects.push(toast(e.to_string(), ToastLevel::Error));
            }
        }
        AddRow(table) => row_effects(
            engine.add_row(&table).map(|_| "Row added".to_string()),
            &mut effects,
        ),
        UpdateRow(table) => row_effects(
            engine
                .update_row(&table)
                .map(|i| format!("Row {} updated", i + 1)),
            &mut effects,
        ),
        DeleteRow(table) => row_effects(
            engine.delete_row(&table).map(|_| "Row deleted".to_string()),
            &mut effects,
        ),
        CancelRow(table) => {
            if let Err(e) = engine.cancel_row(&table) {
                effects.push(toast(e.to_string(), ToastLevel::Error));
            }
        }
        ReplaceRows { table, rows } => {
            if let Err(e) = engine.replace_rows(&table, rows) {
                effects.push(toast(e.to_string(), ToastLevel::Error));
            }
        }
        Submit => {
            let outcome = engine.submit();
            if outcome.valid {
                let text = if outcome.updated {
                    "Saved"
                } else {
                    "Nothing changed"
                };
                effects.push(toast(text, ToastLevel::Success));
            } else {
                effects.push(toast(
                    format!("{} invalid field(s)", outcome.invalid_fields.len()),
                    ToastLevel::Error,
                ));
            }
            effects.push(Effect::Submitted(outcome));
        }
        Reset => {
            engine.reset();
            effects.push(toast("Form reset", ToastLevel::Info));
        }
        SetSource(source) => engine.set_source(source),
        SetDisabled(disabled) => engine.set_disabled(disabled),
        SetLoading(loading) => engine.set_loading(loading),
        Tick(now) => {
            if !engine.tick(now) {
                return effects;
            }
        }
    }
    effects.push(Effect::Redraw);
    effects
}
