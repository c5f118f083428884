use crate::app::{update, Effect, FormEngine, FormMsg, SubmitOutcome, ToastLevel};
use crate::config::{self, EngineConfig};
use crate::engine::navigator::NavStatus;
use crate::services::loader;
use crate::theme::Theme;
use crate::widgets::form_widget::FormWidget;
use crate::widgets::status_bar::draw_footer;
use crate::widgets::Widget;
use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::prelude::*;
use ratatui::widgets::*;
use serde_json::{json, Value as JsonValue};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const FRAME: Duration = Duration::from_millis(33);
// about two seconds of frames
const TOAST_TICKS: u64 = 60;

pub struct RunArgs {
    pub form: PathBuf,
    pub document: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub(crate) struct Toast {
    pub(crate) text: String,
    pub(crate) level: ToastLevel,
    pub(crate) expires_at_tick: u64,
}

pub(crate) struct AppState {
    pub(crate) engine: FormEngine,
    pub(crate) form: FormWidget,
    pub(crate) theme: Theme,
    pub(crate) tick: u64,
    pub(crate) toast: Option<Toast>,
    pub(crate) last_submit: Option<SubmitOutcome>,
    /// Last settled outcome of an error navigation.
    pub(crate) nav: NavStatus,
    pub(crate) quit: bool,
}

fn run_effects(state: &mut AppState, effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            // every frame redraws
            Effect::Redraw => {}
            Effect::ShowToast { text, level } => {
                state.toast = Some(Toast {
                    text,
                    level,
                    expires_at_tick: state.tick + TOAST_TICKS,
                });
            }
            Effect::Submitted(outcome) => state.last_submit = Some(outcome),
        }
    }
}

impl AppState {
    pub(crate) fn new(engine: FormEngine, theme: Theme) -> Self {
        let title = match engine.spec().title.trim() {
            "" => "Form".to_string(),
            t => t.to_string(),
        };
        Self {
            engine,
            form: FormWidget::new(title),
            theme,
            tick: 0,
            toast: None,
            last_submit: None,
            nav: NavStatus::Idle,
            quit: false,
        }
    }

    pub(crate) fn dispatch(&mut self, msg: FormMsg) {
        let effects = update(&mut self.engine, msg);
        run_effects(self, effects);
    }

    /// One frame: engine timers, fresh plan, draw, mount, then one step of
    /// any pending error navigation.
    pub(crate) fn frame<B: Backend>(&mut self, terminal: &mut Terminal<B>, now: Instant) -> Result<()> {
        self.dispatch(FormMsg::Tick(now));
        self.form.set_plan(self.engine.render_plan());
        terminal.draw(|f| ui(f, self))?;
        self.form.mount(self.engine.registry_mut());
        match self.engine.navigate(&mut self.form) {
            NavStatus::Idle | NavStatus::Pending => {}
            settled => {
                debug!(?settled, "navigation finished");
                self.nav = settled;
            }
        }
        self.tick = self.tick.wrapping_add(1);
        Ok(())
    }

    fn copy_values(&mut self) {
        let text = match serde_json::to_string_pretty(&self.engine.values()) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "could not serialize values");
                return;
            }
        };
        let copied = arboard::Clipboard::new().and_then(|mut c| c.set_text(text));
        let (text, level) = match copied {
            Ok(()) => ("Copied values to clipboard".to_string(), ToastLevel::Info),
            Err(e) => (format!("Clipboard unavailable: {e}"), ToastLevel::Error),
        };
        run_effects(self, vec![Effect::ShowToast { text, level }]);
    }
}

pub(crate) fn handle_key(state: &mut AppState, key: KeyEvent) {
    if key.kind != KeyEventKind::Press {
        return;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && key.code == KeyCode::Char('q') {
        state.quit = true;
        return;
    }
    // shortcuts only while browsing; an open editor takes every key
    if !state.form.is_editing() {
        match key.code {
            KeyCode::Char('q') if !ctrl => {
                state.quit = true;
                return;
            }
            KeyCode::Char('s') if ctrl => {
                state.dispatch(FormMsg::Submit);
                return;
            }
            KeyCode::Char('r') if ctrl => {
                state.dispatch(FormMsg::Reset);
                return;
            }
            KeyCode::Char('c') if ctrl => {
                state.copy_values();
                return;
            }
            _ => {}
        }
    }
    for msg in state.form.on_key(key) {
        state.dispatch(msg);
    }
}

pub(crate) fn help_text(state: &AppState) -> &'static str {
    if state.form.is_editing() {
        "Enter/Esc finish • Ctrl+S finish multi-line"
    } else {
        "↑↓ move • Enter edit • ←→ tabs/rows • a u d x rows • Ctrl+S submit • Ctrl+R reset • Ctrl+C copy • q quit"
    }
}

fn ui(f: &mut Frame, state: &mut AppState) {
    if let Some(t) = &state.toast {
        if state.tick >= t.expires_at_tick {
            state.toast = None;
        }
    }
    let screen = f.area();
    f.render_widget(Block::default().style(state.theme.base_style()), screen);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(screen);
    state
        .form
        .render(f, chunks[0], true, state.tick, &state.theme);
    draw_footer(f, chunks[1], state, help_text(state));
}

fn headless_summary(state: &AppState) -> Result<JsonValue> {
    let mut summary = match &state.last_submit {
        Some(outcome) => serde_json::to_value(outcome)?,
        None => json!({}),
    };
    let focused = match &state.nav {
        NavStatus::Focused(p) => JsonValue::String(p.clone()),
        _ => JsonValue::Null,
    };
    let declaration_errors: Vec<JsonValue> = state
        .engine
        .declaration_report()
        .iter()
        .map(|(key, err)| json!({"key": key, "message": err.to_string()}))
        .collect();
    if let Some(obj) = summary.as_object_mut() {
        obj.insert("focused".into(), focused);
        obj.insert("declarationErrors".into(), JsonValue::Array(declaration_errors));
    }
    Ok(summary)
}

/// Draws into a `TestBackend`, submits once, lets the navigator finish and
/// prints a JSON summary.
fn run_headless(state: &mut AppState) -> Result<()> {
    let mut terminal = Terminal::new(ratatui::backend::TestBackend::new(80, 24))?;
    for _ in 0..config::headless_ticks() {
        state.frame(&mut terminal, Instant::now())?;
    }
    state.dispatch(FormMsg::Submit);
    for _ in 0..state.engine.config().focus_attempts {
        state.frame(&mut terminal, Instant::now())?;
        if state.engine.navigation_target().is_none() {
            break;
        }
    }
    println!("{}", headless_summary(state)?);
    Ok(())
}

fn event_loop<B: Backend>(terminal: &mut Terminal<B>, state: &mut AppState) -> Result<()> {
    loop {
        let started = Instant::now();
        state.frame(terminal, started)?;
        let timeout = FRAME.checked_sub(started.elapsed()).unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                handle_key(state, key);
            }
        }
        if state.quit {
            return Ok(());
        }
    }
}

pub fn run(args: RunArgs) -> Result<()> {
    let spec = loader::load_form(&args.form)?;
    let source = match &args.document {
        Some(p) => loader::load_document(p)
            .with_context(|| format!("loading document {}", p.display()))?,
        None => json!({}),
    };
    let engine = FormEngine::new(spec, source, EngineConfig::from_env());
    let mut state = AppState::new(engine, Theme::from_env());
    if config::headless() {
        return run_headless(&mut state);
    }
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let res = event_loop(&mut terminal, &mut state);
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;

    const PROFILE: &str = r#"
title: Profile
fields:
  - tabs:
      - title: About
        fields:
          - name: name
            validation: { required: true }
      - title: Contact
        fields:
          - name: email
            type: email
            validation: { email: true }
"#;

    fn state(doc: JsonValue) -> AppState {
        let spec = loader::parse_form(&serde_yaml::from_str(PROFILE).unwrap()).unwrap();
        AppState::new(
            FormEngine::new(spec, doc, EngineConfig::default()),
            Theme::default(),
        )
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn failed_submit_focuses_first_invalid_control() {
        let mut state = state(json!({"name": "Ann", "email": "bad"}));
        let mut terminal = Terminal::new(TestBackend::new(60, 12)).unwrap();
        state.frame(&mut terminal, Instant::now()).unwrap();
        assert_eq!(state.form.selected_path(), None);

        handle_key(&mut state, ctrl('s'));
        for _ in 0..20 {
            state.frame(&mut terminal, Instant::now()).unwrap();
        }
        assert_eq!(state.nav, NavStatus::Focused("email".into()));
        assert_eq!(state.form.selected_path().as_deref(), Some("email"));
        assert!(matches!(&state.toast, Some(t) if t.level == ToastLevel::Error));
        let summary = headless_summary(&state).unwrap();
        assert_eq!(summary["valid"], json!(false));
        assert_eq!(summary["focused"], json!("email"));
        assert_eq!(summary["invalidFields"][0]["error"], json!("Invalid email"));
    }

    #[test]
    fn editing_through_keys_reaches_the_engine() {
        let mut state = state(json!({"name": "Ann"}));
        let mut terminal = Terminal::new(TestBackend::new(60, 12)).unwrap();
        state.frame(&mut terminal, Instant::now()).unwrap();
        // tab bar, then the name control
        handle_key(&mut state, KeyEvent::new(KeyCode::Down, KeyModifiers::NONE));
        assert_eq!(state.form.selected_path().as_deref(), Some("name"));
        handle_key(&mut state, KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        handle_key(&mut state, KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(!state.quit);
        handle_key(&mut state, KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        assert_eq!(state.engine.values()["name"], json!("Annq"));
        assert!(state.engine.is_updated());

        handle_key(&mut state, ctrl('r'));
        assert_eq!(state.engine.values()["name"], json!("Ann"));
        handle_key(&mut state, KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(state.quit);
    }
}
