use crate::app::FormMsg;
use crate::engine::binding::{ControlBinding, FieldTarget, RenderItem};
use crate::engine::navigator::ViewportHost;
use crate::engine::registry::{ControlHandle, ControlRegistry};
use crate::model::FieldType;
use crate::theme::Theme;
use crate::widgets::form::{draw_form, lay_out, LayoutState, Slot};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::crossterm::event as rt_event;
use ratatui::prelude::*;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tui_textarea::TextArea;

struct Editor {
    target: FieldTarget,
    multiline: bool,
    ta: TextArea<'static>,
}

impl Editor {
    fn text(&self) -> String {
        self.ta.lines().join("\n")
    }
}

/// Identity of a selectable item that survives re-planning.
fn ident(item: &RenderItem) -> Option<String> {
    match item {
        RenderItem::Control { binding, .. } => Some(binding.id.clone()),
        RenderItem::Table { binding, .. } => Some(format!("table:{}", binding.path)),
        RenderItem::TabBar { key, .. } => Some(format!("tabs:{key}")),
        RenderItem::SectionHeader { key, index, .. } => Some(format!("section:{key}:{index}")),
        _ => None,
    }
}

// crossterm 0.27 events into the crossterm version tui-textarea speaks
fn to_textarea_key(key: KeyEvent) -> Option<rt_event::KeyEvent> {
    let code = match key.code {
        KeyCode::Char(c) => rt_event::KeyCode::Char(c),
        KeyCode::Backspace => rt_event::KeyCode::Backspace,
        KeyCode::Delete => rt_event::KeyCode::Delete,
        KeyCode::Enter => rt_event::KeyCode::Enter,
        KeyCode::Left => rt_event::KeyCode::Left,
        KeyCode::Right => rt_event::KeyCode::Right,
        KeyCode::Up => rt_event::KeyCode::Up,
        KeyCode::Down => rt_event::KeyCode::Down,
        KeyCode::Home => rt_event::KeyCode::Home,
        KeyCode::End => rt_event::KeyCode::End,
        KeyCode::Tab => rt_event::KeyCode::Tab,
        _ => return None,
    };
    let mods = rt_event::KeyModifiers::from_bits_truncate(key.modifiers.bits());
    Some(rt_event::KeyEvent::new(code, mods))
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

/// Browses and edits a render plan. Holds no form values of its own: every
/// edit leaves as a `FormMsg`.
pub struct FormWidget {
    pub title: String,
    plan: Vec<RenderItem>,
    cursor: Option<usize>,
    row_cursors: HashMap<String, usize>,
    editor: Option<Editor>,
    slots: Vec<Slot>,
    scroll: u16,
    total_lines: u16,
    viewport: (u16, u16),
    /// Viewport was placed explicitly; cursor moves release it.
    pinned: bool,
}

impl FormWidget {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            plan: Vec::new(),
            cursor: None,
            row_cursors: HashMap::new(),
            editor: None,
            slots: Vec::new(),
            scroll: 0,
            total_lines: 0,
            viewport: (0, 0),
            pinned: false,
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editor.is_some()
    }

    pub fn selected_path(&self) -> Option<String> {
        self.cursor
            .and_then(|i| self.plan.get(i))
            .and_then(|item| item.focus_path())
    }

    /// Swap in a fresh plan, keeping the cursor on the same item when it is
    /// still there.
    pub fn set_plan(&mut self, plan: Vec<RenderItem>) {
        let keep = self.cursor.and_then(|i| self.plan.get(i)).and_then(ident);
        let old = self.cursor.unwrap_or(0);
        self.plan = plan;
        self.cursor = keep
            .and_then(|k| self.plan.iter().position(|it| ident(it).as_deref() == Some(k.as_str())))
            .or_else(|| self.nearest_selectable(old));
        if let Some(ed) = &self.editor {
            let id = ed.target.path();
            let still_there = self.plan.iter().any(|it| {
                matches!(it, RenderItem::Control { binding, .. } if binding.id == id && !binding.disabled)
            });
            if !still_there {
                self.editor = None;
            }
        }
        for item in &self.plan {
            if let RenderItem::Table { binding, .. } = item {
                let cur = self.row_cursors.entry(binding.path.clone()).or_insert(0);
                *cur = (*cur).min(binding.rows.len().saturating_sub(1));
            }
        }
    }

    fn nearest_selectable(&self, from: usize) -> Option<usize> {
        let from = from.min(self.plan.len().saturating_sub(1));
        (from..self.plan.len())
            .chain((0..from).rev())
            .find(|i| ident(&self.plan[*i]).is_some())
    }

    /// Mount what the last draw laid out. Controls and tables register by
    /// their focus path.
    pub fn mount(&self, registry: &mut ControlRegistry) {
        registry.clear();
        for slot in &self.slots {
            if let Some(path) = self.plan.get(slot.item).and_then(|it| it.focus_path()) {
                registry.mount(path, slot.handle());
            }
        }
    }

    fn move_cursor(&mut self, forward: bool) {
        self.pinned = false;
        let Some(cur) = self.cursor else {
            self.cursor = self.nearest_selectable(0);
            return;
        };
        let next = if forward {
            (cur + 1..self.plan.len()).find(|i| ident(&self.plan[*i]).is_some())
        } else {
            (0..cur).rev().find(|i| ident(&self.plan[*i]).is_some())
        };
        if let Some(n) = next {
            self.cursor = Some(n);
        }
    }

    fn keep_cursor_visible(&mut self) {
        let vh = self.viewport.1;
        let Some(slot) = self
            .cursor
            .and_then(|c| self.slots.iter().find(|s| s.item == c))
        else {
            return;
        };
        if slot.line < self.scroll {
            self.scroll = slot.line;
        } else if vh > 0 && slot.line + slot.height > self.scroll + vh {
            self.scroll = (slot.line + slot.height).saturating_sub(vh);
        }
    }

    fn open_editor(&mut self, b: &ControlBinding) {
        let text = match &b.value {
            JsonValue::String(s) => s.clone(),
            JsonValue::Null => String::new(),
            _ => b.display_value(),
        };
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        let mut ta = TextArea::new(if lines.is_empty() {
            vec![String::new()]
        } else {
            lines
        });
        ta.move_cursor(tui_textarea::CursorMove::Bottom);
        ta.move_cursor(tui_textarea::CursorMove::End);
        self.editor = Some(Editor {
            target: b.target.clone(),
            multiline: b.field_type == FieldType::TextArea,
            ta,
        });
    }

    fn close_editor(&mut self, msgs: &mut Vec<FormMsg>) {
        if let Some(ed) = self.editor.take() {
            msgs.push(FormMsg::Blur(ed.target));
        }
    }

    fn on_editor_key(&mut self, key: KeyEvent) -> Vec<FormMsg> {
        let mut msgs = Vec::new();
        let Some(ed) = self.editor.as_mut() else {
            return msgs;
        };
        let commit = match key.code {
            KeyCode::Esc => true,
            KeyCode::Enter => !ed.multiline,
            KeyCode::Char('s') => key.modifiers.contains(KeyModifiers::CONTROL),
            _ => false,
        };
        if commit {
            self.close_editor(&mut msgs);
            return msgs;
        }
        if let Some(k) = to_textarea_key(key) {
            if ed.ta.input(k) {
                msgs.push(FormMsg::Change {
                    target: ed.target.clone(),
                    value: JsonValue::String(ed.text()),
                });
            }
        }
        msgs
    }

    fn step_tab(tabs: &[(usize, String)], active: usize, forward: bool) -> Option<usize> {
        let pos = tabs.iter().position(|(i, _)| *i == active)?;
        let next = if forward {
            (pos + 1) % tabs.len()
        } else {
            (pos + tabs.len() - 1) % tabs.len()
        };
        tabs.get(next).map(|(i, _)| *i)
    }

    fn on_control_key(b: &ControlBinding, key: KeyCode) -> Option<Vec<FormMsg>> {
        let change = |value: JsonValue| {
            vec![
                FormMsg::Change {
                    target: b.target.clone(),
                    value,
                },
                FormMsg::Blur(b.target.clone()),
            ]
        };
        match (b.field_type, key) {
            (FieldType::Checkbox, KeyCode::Enter | KeyCode::Char(' ')) => {
                Some(change(JsonValue::Bool(b.value.as_bool() != Some(true))))
            }
            (FieldType::Select, KeyCode::Enter | KeyCode::Right | KeyCode::Left)
                if !b.options.is_empty() =>
            {
                let n = b.options.len();
                let pos = b.options.iter().position(|o| o.value == b.value);
                let next = match (pos, key) {
                    (None, _) => 0,
                    (Some(p), KeyCode::Left) => (p + n - 1) % n,
                    (Some(p), _) => (p + 1) % n,
                };
                Some(change(b.options[next].value.clone()))
            }
            _ => None,
        }
    }

    fn on_table_key(&mut self, path: &str, rows: usize, key: KeyCode) -> Vec<FormMsg> {
        let cur = self.row_cursors.entry(path.to_string()).or_insert(0);
        match key {
            KeyCode::Left => {
                *cur = cur.saturating_sub(1);
                Vec::new()
            }
            KeyCode::Right => {
                if *cur + 1 < rows {
                    *cur += 1;
                }
                Vec::new()
            }
            KeyCode::Enter if rows > 0 => vec![FormMsg::SelectRow {
                table: path.to_string(),
                index: *cur,
            }],
            KeyCode::Char('a') => vec![FormMsg::AddRow(path.to_string())],
            KeyCode::Char('u') => vec![FormMsg::UpdateRow(path.to_string())],
            KeyCode::Char('d') | KeyCode::Delete => vec![FormMsg::DeleteRow(path.to_string())],
            KeyCode::Char('x') | KeyCode::Esc => vec![FormMsg::CancelRow(path.to_string())],
            _ => Vec::new(),
        }
    }
}

impl crate::widgets::Widget for FormWidget {
    fn render(&mut self, f: &mut Frame, area: Rect, focused: bool, tick: u64, theme: &Theme) {
        let editing_text = self
            .editor
            .as_ref()
            .filter(|ed| !ed.multiline)
            .map(|ed| ed.text());
        let state = LayoutState {
            cursor: self.cursor,
            row_cursors: &self.row_cursors,
            editing: editing_text.as_deref(),
            cursor_on: tick % 2 == 0,
        };
        let layout = lay_out(&self.plan, &state, theme);
        self.slots = layout.slots;
        self.total_lines = layout.lines.len().min(u16::MAX as usize) as u16;
        self.viewport = (
            area.width.saturating_sub(2),
            area.height.saturating_sub(2),
        );
        if !self.pinned {
            self.keep_cursor_visible();
        }
        let title = if self.editor.is_some() {
            format!("{} · editing", self.title)
        } else {
            self.title.clone()
        };
        draw_form(f, area, &title, layout.lines, self.scroll, focused, theme);
        if let Some(ed) = self.editor.as_mut().filter(|ed| ed.multiline) {
            ed.ta.set_block(
                ratatui::widgets::Block::default()
                    .borders(ratatui::widgets::Borders::ALL)
                    .title("Editing · Ctrl+S or Esc to finish"),
            );
            let rect = centered_rect(80, 60, area);
            f.render_widget(ratatui::widgets::Clear, rect);
            f.render_widget(&ed.ta, rect);
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> Vec<FormMsg> {
        if self.editor.is_some() {
            return self.on_editor_key(key);
        }
        match key.code {
            KeyCode::Up | KeyCode::BackTab => {
                self.move_cursor(false);
                return Vec::new();
            }
            KeyCode::Down | KeyCode::Tab => {
                self.move_cursor(true);
                return Vec::new();
            }
            KeyCode::PageUp => {
                self.scroll = self.scroll.saturating_sub(self.viewport.1.max(1));
                self.pinned = true;
                return Vec::new();
            }
            KeyCode::PageDown => {
                let max = self.total_lines.saturating_sub(self.viewport.1);
                self.scroll = (self.scroll + self.viewport.1.max(1)).min(max);
                self.pinned = true;
                return Vec::new();
            }
            _ => {}
        }
        let Some(item) = self.cursor.and_then(|i| self.plan.get(i)).cloned() else {
            return Vec::new();
        };
        match item {
            RenderItem::Control { binding, .. } => {
                if binding.disabled {
                    return Vec::new();
                }
                if let Some(msgs) = Self::on_control_key(&binding, key.code) {
                    return msgs;
                }
                if key.code == KeyCode::Enter {
                    self.open_editor(&binding);
                }
                Vec::new()
            }
            RenderItem::TabBar {
                key: group,
                tabs,
                active,
                ..
            } => {
                let forward = match key.code {
                    KeyCode::Right | KeyCode::Enter => true,
                    KeyCode::Left => false,
                    _ => return Vec::new(),
                };
                Self::step_tab(&tabs, active, forward)
                    .map(|index| vec![FormMsg::SelectTab { group, index }])
                    .unwrap_or_default()
            }
            RenderItem::SectionHeader {
                key: group,
                index,
                allow_multiple,
                ..
            } => match key.code {
                KeyCode::Enter | KeyCode::Char(' ') => vec![FormMsg::ToggleSection {
                    group,
                    index,
                    allow_multiple,
                }],
                _ => Vec::new(),
            },
            RenderItem::Table { binding, .. } => {
                if binding.disabled {
                    return Vec::new();
                }
                self.on_table_key(&binding.path, binding.rows.len(), key.code)
            }
            _ => Vec::new(),
        }
    }
}

impl ViewportHost for FormWidget {
    fn center(&mut self, handle: ControlHandle) {
        let vh = self.viewport.1;
        let max = self.total_lines.saturating_sub(vh);
        self.scroll = handle.center().saturating_sub(vh / 2).min(max);
        self.pinned = true;
    }

    fn extent(&self) -> (u16, u16) {
        (self.viewport.1, self.total_lines)
    }

    fn focus(&mut self, path: &str) {
        if let Some(i) = self
            .plan
            .iter()
            .position(|it| it.focus_path().as_deref() == Some(path))
        {
            self.cursor = Some(i);
            self.editor = None;
        }
    }
}
