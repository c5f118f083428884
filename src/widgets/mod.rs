pub mod chrome;
pub mod form;
pub mod form_widget;
pub mod status_bar;
pub mod table;

use crate::app::FormMsg;
use crate::theme::Theme;
use crossterm::event::KeyEvent;
use ratatui::prelude::*;

pub trait Widget {
    fn render(&mut self, f: &mut Frame, area: Rect, focused: bool, tick: u64, theme: &Theme);
    fn on_key(&mut self, key: KeyEvent) -> Vec<FormMsg> {
        let _ = key;
        Vec::new()
    }
}
