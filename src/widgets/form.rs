use crate::engine::binding::{ControlBinding, RenderItem};
use crate::engine::registry::ControlHandle;
use crate::model::FieldType;
use crate::theme::Theme;
use crate::widgets::chrome::panel_block;
use crate::widgets::table::table_lines;
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::collections::HashMap;

/// Where a render item landed in the laid-out form, in content lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    pub item: usize,
    pub line: u16,
    pub height: u16,
}

impl Slot {
    pub fn handle(&self) -> ControlHandle {
        ControlHandle {
            line: self.line,
            height: self.height,
        }
    }
}

/// Inputs for one layout pass.
pub struct LayoutState<'a> {
    pub cursor: Option<usize>,
    pub row_cursors: &'a HashMap<String, usize>,
    /// Text being typed into the selected control.
    pub editing: Option<&'a str>,
    pub cursor_on: bool,
}

pub struct FormLayout {
    pub lines: Vec<Line<'static>>,
    pub slots: Vec<Slot>,
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

fn option_label(b: &ControlBinding) -> Option<String> {
    b.options
        .iter()
        .find(|o| o.value == b.value || (o.value.as_str().is_some() && o.value.as_str() == b.value.as_str()))
        .map(|o| o.label.clone())
}

fn control_lines(
    b: &ControlBinding,
    custom: Option<&str>,
    pad: &str,
    selected: bool,
    state: &LayoutState<'_>,
    theme: &Theme,
) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let sel = if selected { '›' } else { ' ' };
    let req = if b.required { " *" } else { "" };
    let editing = if selected { state.editing } else { None };
    let value_style = if b.disabled {
        theme.text_muted()
    } else if editing.is_some() {
        theme.text_editing_bold()
    } else if selected {
        theme.text_active_bold()
    } else {
        Style::default()
    };
    let head = format!("{pad}{sel} {}{req}: ", b.label);
    if let Some(text) = custom {
        lines.push(Line::from(vec![
            Span::raw(head),
            Span::styled(text.to_string(), value_style),
        ]));
    } else {
        match b.field_type {
            FieldType::Checkbox => {
                let val = if b.value.as_bool() == Some(true) {
                    "[x]"
                } else {
                    "[ ]"
                };
                lines.push(Line::from(vec![
                    Span::raw(head),
                    Span::styled(val.to_string(), value_style),
                ]));
            }
            FieldType::TextArea => {
                lines.push(Line::from(Span::raw(head.trim_end().to_string())));
                let text = editing.map(str::to_string).unwrap_or_else(|| b.display_value());
                let mut body: Vec<String> = if text.is_empty() {
                    vec![String::new()]
                } else {
                    text.lines().map(str::to_string).collect()
                };
                if editing.is_some() && state.cursor_on {
                    if let Some(last) = body.last_mut() {
                        last.push('▏');
                    }
                }
                for l in body {
                    lines.push(Line::from(vec![
                        Span::raw(format!("{pad}    ")),
                        Span::styled(l, value_style),
                    ]));
                }
            }
            _ => {
                let mut val = match editing {
                    Some(t) => t.to_string(),
                    None => match b.field_type {
                        FieldType::Select => option_label(b).unwrap_or_else(|| b.display_value()),
                        FieldType::Password => "•".repeat(b.display_value().chars().count()),
                        _ => b.display_value(),
                    },
                };
                if editing.is_some() && b.field_type == FieldType::Password {
                    val = "•".repeat(val.chars().count());
                }
                if editing.is_some() && state.cursor_on {
                    val.push('▏');
                }
                let mut spans = vec![Span::raw(head)];
                if val.is_empty() && editing.is_none() {
                    if let Some(ph) = &b.placeholder {
                        spans.push(Span::styled(ph.clone(), theme.text_muted()));
                    }
                }
                spans.push(Span::styled(val, value_style));
                lines.push(Line::from(spans));
            }
        }
    }
    if let Some(err) = &b.help_text {
        lines.push(Line::from(Span::styled(
            format!("{pad}    ! {err}"),
            theme.text_error(),
        )));
    }
    lines
}

/// Turns a render plan into text lines and records where each item went.
pub fn lay_out(items: &[RenderItem], state: &LayoutState<'_>, theme: &Theme) -> FormLayout {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut slots = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let start = lines.len();
        let pad = indent(item.depth());
        let selected = state.cursor == Some(i);
        let sel = if selected { '›' } else { ' ' };
        match item {
            RenderItem::GroupHeader { title, .. } => {
                lines.push(Line::from(Span::styled(
                    format!("{pad}-- {title} --"),
                    theme.heading(),
                )));
            }
            RenderItem::TabBar { tabs, active, .. } => {
                let mut spans = vec![Span::raw(format!("{pad}{sel} "))];
                for (n, (idx, title)) in tabs.iter().enumerate() {
                    if n > 0 {
                        spans.push(Span::styled(" │ ", theme.text_muted()));
                    }
                    if idx == active {
                        let st = if selected {
                            theme.list_cursor_style()
                        } else {
                            theme.text_active_bold()
                        };
                        spans.push(Span::styled(format!("[{title}]"), st));
                    } else {
                        spans.push(Span::styled(format!(" {title} "), theme.text_muted()));
                    }
                }
                lines.push(Line::from(spans));
            }
            RenderItem::SectionHeader { title, open, .. } => {
                let arrow = if *open { '▾' } else { '▸' };
                let st = if selected {
                    theme.text_active_bold()
                } else {
                    theme.heading()
                };
                lines.push(Line::from(vec![
                    Span::raw(format!("{pad}{sel} ")),
                    Span::styled(format!("{arrow} {title}"), st),
                ]));
            }
            RenderItem::Control {
                binding, custom, ..
            } => {
                lines.extend(control_lines(
                    binding,
                    custom.as_deref(),
                    &pad,
                    selected,
                    state,
                    theme,
                ));
            }
            RenderItem::Table { binding, .. } => {
                let row_cursor = state.row_cursors.get(&binding.path).copied();
                lines.extend(table_lines(binding, &pad, selected, row_cursor, theme));
            }
            RenderItem::DeclarationError { message, .. } => {
                lines.push(Line::from(Span::styled(
                    format!("{pad}✗ {message}"),
                    theme.text_error(),
                )));
            }
            RenderItem::Placeholder { .. } => {
                lines.push(Line::from(Span::styled(
                    format!("{pad}  ░░░░░░░░░░░░░░░░"),
                    theme.text_muted(),
                )));
            }
        }
        slots.push(Slot {
            item: i,
            line: start.min(u16::MAX as usize) as u16,
            height: (lines.len() - start).min(u16::MAX as usize) as u16,
        });
    }
    FormLayout { lines, slots }
}

pub fn draw_form(
    f: &mut Frame,
    area: Rect,
    title: &str,
    lines: Vec<Line<'static>>,
    scroll: u16,
    focused: bool,
    theme: &Theme,
) {
    let block = panel_block(title, focused, theme);
    let p = Paragraph::new(lines)
        .block(block)
        .style(theme.base_style())
        .scroll((scroll, 0));
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::binding::{FieldTarget, TableBinding};
    use crate::model::SelectOption;
    use ratatui::backend::TestBackend;
    use serde_json::json;

    fn control(name: &str, field_type: FieldType, value: serde_json::Value) -> ControlBinding {
        ControlBinding {
            target: FieldTarget::Base(name.into()),
            id: name.into(),
            value,
            label: crate::model::default_label(name),
            placeholder: None,
            help_text: None,
            required: false,
            disabled: false,
            field_type,
            options: Vec::new(),
        }
    }

    fn plan() -> Vec<RenderItem> {
        let mut email = control("email", FieldType::Email, json!("nope"));
        email.required = true;
        email.help_text = Some("Invalid email".into());
        let mut tier = control("tier", FieldType::Select, json!("g"));
        tier.options = vec![SelectOption {
            label: "Gold".into(),
            value: json!("g"),
        }];
        vec![
            RenderItem::TabBar {
                key: "0".into(),
                tabs: vec![(0, "Profile".into()), (1, "Contact".into())],
                active: 1,
                depth: 0,
            },
            RenderItem::Control {
                binding: email,
                custom: None,
                depth: 1,
            },
            RenderItem::Control {
                binding: tier,
                custom: None,
                depth: 1,
            },
            RenderItem::Control {
                binding: control("agree", FieldType::Checkbox, json!(true)),
                custom: None,
                depth: 1,
            },
            RenderItem::Table {
                binding: TableBinding {
                    path: "items".into(),
                    title: Some("Items".into()),
                    columns: vec!["name".into()],
                    rows: vec![json!({"name": "a"})],
                    active_row: None,
                    disabled: false,
                    can_add: true,
                    can_update: false,
                    can_delete: false,
                    help_text: None,
                },
                depth: 0,
            },
        ]
    }

    #[test]
    fn slots_track_item_heights() {
        let cursors = HashMap::new();
        let state = LayoutState {
            cursor: Some(1),
            row_cursors: &cursors,
            editing: None,
            cursor_on: false,
        };
        let layout = lay_out(&plan(), &state, &Theme::default());
        let spans: Vec<(u16, u16)> = layout.slots.iter().map(|s| (s.line, s.height)).collect();
        // the email error adds a line; the table has title, header, row, actions
        assert_eq!(spans, vec![(0, 1), (1, 2), (3, 1), (4, 1), (5, 4)]);
        assert_eq!(layout.lines.len(), 9);
    }

    #[test]
    fn golden_form_renders_expected_text() {
        let cursors = HashMap::new();
        let state = LayoutState {
            cursor: Some(1),
            row_cursors: &cursors,
            editing: None,
            cursor_on: false,
        };
        let theme = Theme::default();
        let layout = lay_out(&plan(), &state, &theme);
        let backend = TestBackend::new(40, 12);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal
            .draw(|f| draw_form(f, f.area(), "Order", layout.lines.clone(), 0, true, &theme))
            .unwrap();
        let buf = terminal.backend().buffer().clone();
        let mut inner: Vec<String> = Vec::new();
        for y in 1..(buf.area.height - 1) {
            let mut line = String::new();
            for x in 1..(buf.area.width - 1) {
                line.push(buf[(x, y)].symbol().chars().next().unwrap_or(' '));
            }
            inner.push(line.trim_end().to_string());
        }
        let expected = [
            "   Profile  │ [Contact]",
            "  › Email *: nope",
            "      ! Invalid email",
            "    Tier: Gold",
            "    Agree: [x]",
            "  Items (1)",
            "      name",
            "     a",
        ];
        assert_eq!(&inner[..expected.len()], &expected[..]);
    }

    #[test]
    fn editing_shows_typed_text_with_cursor() {
        let cursors = HashMap::new();
        let state = LayoutState {
            cursor: Some(1),
            row_cursors: &cursors,
            editing: Some("a@b"),
            cursor_on: true,
        };
        let layout = lay_out(&plan(), &state, &Theme::default());
        let text: String = layout.lines[1]
            .spans
            .iter()
            .map(|s| s.content.as_ref())
            .collect();
        assert_eq!(text, "  › Email *: a@b▏");
    }
}
