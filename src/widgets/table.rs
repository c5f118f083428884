use crate::engine::binding::TableBinding;
use crate::theme::Theme;
use ratatui::prelude::*;
use serde_json::Value as JsonValue;

const MAX_CELL: usize = 18;

fn cell_text(row: &JsonValue, column: &str) -> String {
    let raw = match crate::nav::path::get_by_path(row, column) {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Array(items)) => format!("[{}]", items.len()),
        Some(JsonValue::Object(_)) => "{…}".into(),
        Some(other) => other.to_string(),
    };
    if raw.chars().count() > MAX_CELL {
        let cut: String = raw.chars().take(MAX_CELL - 1).collect();
        format!("{cut}…")
    } else {
        raw
    }
}

/// Column widths: the widest of header and cells, capped.
fn widths(binding: &TableBinding) -> Vec<usize> {
    binding
        .columns
        .iter()
        .map(|c| {
            binding
                .rows
                .iter()
                .map(|r| cell_text(r, c).chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0)
                .min(MAX_CELL)
        })
        .collect()
}

fn join_cells(cells: impl Iterator<Item = String>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(c, w)| format!("{c:<w$}"))
        .collect::<Vec<_>>()
        .join(" │ ")
}

/// Lines for one table: title, column header, one line per row, the action
/// bar and the table-level error. `row_cursor` marks the browsed row.
pub fn table_lines(
    binding: &TableBinding,
    indent: &str,
    selected: bool,
    row_cursor: Option<usize>,
    theme: &Theme,
) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let sel = if selected { '›' } else { ' ' };
    let title = binding
        .title
        .clone()
        .unwrap_or_else(|| crate::model::default_label(&binding.path));
    let title_style = if binding.disabled {
        theme.text_muted()
    } else if selected {
        theme.text_active_bold()
    } else {
        theme.heading()
    };
    lines.push(Line::from(vec![
        Span::raw(format!("{indent}{sel} ")),
        Span::styled(format!("{title} ({})", binding.rows.len()), title_style),
    ]));
    let w = widths(binding);
    lines.push(Line::from(Span::styled(
        format!(
            "{indent}      {}",
            join_cells(binding.columns.iter().cloned(), &w)
        ),
        theme.text_muted().add_modifier(Modifier::UNDERLINED),
    )));
    if binding.rows.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("{indent}      (no rows)"),
            theme.text_muted(),
        )));
    }
    for (i, row) in binding.rows.iter().enumerate() {
        let active = binding.active_row == Some(i);
        let browsed = selected && row_cursor == Some(i);
        let mark = if active { '●' } else { ' ' };
        let cur = if browsed { '›' } else { ' ' };
        let text = join_cells(binding.columns.iter().map(|c| cell_text(row, c)), &w);
        let style = if browsed {
            theme.list_cursor_style()
        } else if active {
            theme.text_editing_bold()
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::raw(format!("{indent}  {cur}{mark} ")),
            Span::styled(text, style),
        ]));
    }
    let action = |label: &str, enabled: bool| {
        Span::styled(
            format!("{label}  "),
            if enabled {
                Style::default().fg(theme.accent)
            } else {
                theme.text_muted()
            },
        )
    };
    let editing = binding.active_row.is_some();
    lines.push(Line::from(vec![
        Span::raw(format!("{indent}    ")),
        action("[a] Add", binding.can_add),
        action("[u] Update", binding.can_update),
        action("[d] Delete", binding.can_delete),
        action("[x] Cancel", editing && !binding.disabled),
    ]));
    if let Some(err) = &binding.help_text {
        lines.push(Line::from(Span::styled(
            format!("{indent}    ! {err}"),
            theme.text_error(),
        )));
    }
    lines
}
