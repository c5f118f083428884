use ratatui::prelude::*;
use ratatui::text::{Line, Span};
use ratatui::widgets::*;

use crate::app::ToastLevel;
use crate::engine::navigator::NavStatus;
use crate::ui::AppState;

const SEP: &str = "  |  ";

/// One line: loading spinner, toast, form status, then the key help.
pub(crate) fn draw_footer(f: &mut Frame, area: Rect, state: &AppState, help_text: &str) {
    let theme = &state.theme;
    let mut spans: Vec<Span> = Vec::new();
    if state.engine.is_loading() {
        let spinner = ["⠋", "⠙", "⠸", "⠴", "⠦", "⠇"][state.tick as usize % 6];
        spans.push(Span::raw(format!(" {spinner} loading")));
        spans.push(Span::raw(SEP));
    }
    if let Some(t) = &state.toast {
        let color = theme.toast_color(t.level);
        let tag = match t.level {
            ToastLevel::Success => "[OK]",
            ToastLevel::Error => "[ERROR]",
            ToastLevel::Info => "[INFO]",
        };
        spans.push(Span::styled(
            format!("{tag} "),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::styled(
            format!("{}{SEP}", t.text),
            Style::default().fg(color),
        ));
    }
    let status = if state.engine.is_disabled() {
        "disabled"
    } else if state.engine.is_updated() {
        "modified"
    } else {
        "unchanged"
    };
    spans.push(Span::styled(status, Style::default().fg(theme.accent)));
    if state.form.is_editing() {
        spans.push(Span::raw("  |  editing"));
    }
    if let Some(target) = state.engine.navigation_target() {
        spans.push(Span::raw(format!("{SEP}→ {target}")));
    } else if let NavStatus::GaveUp(path) = &state.nav {
        spans.push(Span::styled(
            format!("{SEP}could not reach {path}"),
            theme.text_error(),
        ));
    }
    spans.push(Span::raw(SEP));
    spans.push(Span::styled(help_text.to_string(), theme.text_muted()));
    let p = Paragraph::new(Line::from(spans));
    f.render_widget(p, area);
}
