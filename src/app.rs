//! Monitor state and input handling.
//!
//! `App` is the single context object for a runbar instance: the adopted
//! run state, the mirrored output buffer, overlay modes (script picker,
//! stop confirmation, path entry), and the debounce bookkeeping for start
//! requests. It never talks to the OS itself; key events come in, actions
//! go out, and the event loop in `main` performs the side effects.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::manifest::ProjectScript;
use crate::output::{OutputBuffer, OutputChunk, StreamKind};
use crate::state::RunState;

/// Modes of user interaction in the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Standard navigation.
    Normal,
    /// Choosing a script from the picker overlay.
    PickScript,
    /// Confirming that the current run should be stopped for a new start.
    ConfirmStop,
    /// Typing a project directory path.
    EditPath,
}

/// Side effects requested by input handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    None,
    Quit,
    /// User asked to start a run (still subject to debouncing).
    RequestStart,
    /// User asked to stop the current run.
    RequestStop,
    /// A script was chosen in the picker.
    ScriptChosen(String),
    /// The user confirmed stopping the current run to start a new one.
    StopThenStart,
    /// Open the project folder in the system file manager.
    OpenProject,
    /// A project path was typed in.
    ProjectPathEntered(PathBuf),
}

#[derive(Debug, Clone)]
struct StatusNotice {
    text: String,
    at: Instant,
    ttl: Option<Duration>,
}

/// The monitor's state container and status presenter.
#[derive(Debug)]
pub struct App {
    /// Most recently adopted run state record.
    pub run_state: RunState,
    /// Whether this instance spawned the process in `run_state`.
    pub owns_process: bool,
    /// Mirror of the shared output buffer.
    pub output: OutputBuffer,
    /// Scripts offered by the picker overlay.
    pub scripts: Vec<ProjectScript>,
    /// Selected row in the picker.
    pub picker_selected: usize,
    pub input_mode: InputMode,
    /// Buffer for typed path input.
    pub input: String,
    /// Output pane scroll offset (lines from the top).
    pub scroll: usize,
    /// Whether the output pane follows new chunks.
    pub follow: bool,
    pub should_quit: bool,
    /// Height of the output viewport, set by the renderer.
    pub view_height: usize,
    pub use_symbols: bool,
    debounce_window: Duration,
    last_start_request: Option<Instant>,
    notice: Option<StatusNotice>,
    /// Script spawned but not yet acknowledged by a pid event.
    queued_script: Option<String>,
}

impl App {
    pub fn new(max_output_chars: usize, debounce_window: Duration, use_symbols: bool) -> Self {
        Self {
            run_state: RunState::default(),
            owns_process: false,
            output: OutputBuffer::new(max_output_chars),
            scripts: Vec::new(),
            picker_selected: 0,
            input_mode: InputMode::Normal,
            input: String::new(),
            scroll: 0,
            follow: true,
            should_quit: false,
            view_height: 0,
            use_symbols,
            debounce_window,
            last_start_request: None,
            notice: None,
            queued_script: None,
        }
    }

    /// Remembers which script was just spawned until its pid arrives.
    pub fn queue_script(&mut self, name: String) {
        self.queued_script = Some(name);
    }

    pub fn pending_script(&mut self) -> Option<String> {
        self.queued_script.take()
    }

    /// Debounced start gate: the first request in a window proceeds, rapid
    /// repeats collapse into it.
    pub fn accept_start_request(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_start_request {
            if now.duration_since(last) < self.debounce_window {
                return false;
            }
        }
        self.last_start_request = Some(now);
        true
    }

    pub fn set_run_state(&mut self, state: RunState, owned: bool) {
        self.run_state = state;
        self.owns_process = owned;
    }

    pub fn on_output(&mut self, text: String, stream: StreamKind) {
        let dropped = self.output.push(OutputChunk { text, stream });
        if dropped && !self.follow && self.scroll > 0 {
            self.scroll -= 1;
        }
        if self.follow {
            self.scroll_to_end();
        }
    }

    pub fn clear_output(&mut self) {
        self.output.clear();
        self.scroll = 0;
    }

    pub fn scroll_to_end(&mut self) {
        self.scroll = self.output.len().saturating_sub(self.view_height);
    }

    pub fn current_script(&self) -> Option<&str> {
        self.run_state
            .script_info
            .as_ref()
            .map(|info| info.script.as_str())
    }

    pub fn set_notice(&mut self, text: impl Into<String>) {
        self.notice = Some(StatusNotice {
            text: text.into(),
            at: Instant::now(),
            ttl: Some(Duration::from_secs(4)),
        });
    }

    pub fn notice(&self) -> Option<&str> {
        let notice = self.notice.as_ref()?;
        match notice.ttl {
            Some(ttl) if notice.at.elapsed() > ttl => None,
            _ => Some(notice.text.as_str()),
        }
    }

    /// Renders the run state into the one-line status indicator.
    pub fn status_line(&self) -> String {
        if self.run_state.is_running {
            let script = self.current_script().unwrap_or("script");
            let pid = self.run_state.pid.unwrap_or(0);
            if self.use_symbols {
                format!("▲ {} running (pid {})", script, pid)
            } else {
                format!("[run] {} running (pid {})", script, pid)
            }
        } else if self.use_symbols {
            "· idle (press s to start a script)".to_string()
        } else {
            "[idle] press s to start a script".to_string()
        }
    }

    /// Translates a key event into an action for the event loop.
    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return AppAction::Quit;
        }
        match self.input_mode {
            InputMode::Normal => self.handle_key_normal(key),
            InputMode::PickScript => self.handle_key_picker(key),
            InputMode::ConfirmStop => self.handle_key_confirm(key),
            InputMode::EditPath => self.handle_key_path(key),
        }
    }

    fn handle_key_normal(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Char('q') => AppAction::Quit,
            KeyCode::Char('s') | KeyCode::Enter => AppAction::RequestStart,
            KeyCode::Char('x') | KeyCode::Char('k') => AppAction::RequestStop,
            KeyCode::Char('o') => AppAction::OpenProject,
            KeyCode::Char('f') => {
                self.follow = !self.follow;
                if self.follow {
                    self.scroll_to_end();
                }
                AppAction::None
            }
            KeyCode::Up => {
                self.follow = false;
                self.scroll = self.scroll.saturating_sub(1);
                AppAction::None
            }
            KeyCode::Down => {
                self.scroll = (self.scroll + 1)
                    .min(self.output.len().saturating_sub(self.view_height));
                AppAction::None
            }
            KeyCode::PageUp => {
                self.follow = false;
                self.scroll = self.scroll.saturating_sub(self.view_height.max(1));
                AppAction::None
            }
            KeyCode::PageDown => {
                self.scroll = (self.scroll + self.view_height.max(1))
                    .min(self.output.len().saturating_sub(self.view_height));
                AppAction::None
            }
            KeyCode::Home => {
                self.follow = false;
                self.scroll = 0;
                AppAction::None
            }
            KeyCode::End => {
                self.follow = true;
                self.scroll_to_end();
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn handle_key_picker(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Up => {
                self.picker_selected = self.picker_selected.saturating_sub(1);
                AppAction::None
            }
            KeyCode::Down => {
                if self.picker_selected + 1 < self.scripts.len() {
                    self.picker_selected += 1;
                }
                AppAction::None
            }
            KeyCode::Enter => {
                let Some(script) = self.scripts.get(self.picker_selected) else {
                    self.input_mode = InputMode::Normal;
                    return AppAction::None;
                };
                let name = script.name.clone();
                self.input_mode = InputMode::Normal;
                AppAction::ScriptChosen(name)
            }
            // Cancelling the pick aborts the start flow silently.
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn handle_key_confirm(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.input_mode = InputMode::Normal;
                AppAction::StopThenStart
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                // Declining leaves the current run untouched.
                self.input_mode = InputMode::Normal;
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn handle_key_path(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Char(c) => {
                self.input.push(c);
                AppAction::None
            }
            KeyCode::Backspace => {
                self.input.pop();
                AppAction::None
            }
            KeyCode::Enter => {
                let typed = self.input.trim().to_string();
                self.input.clear();
                self.input_mode = InputMode::Normal;
                if typed.is_empty() {
                    AppAction::None
                } else {
                    AppAction::ProjectPathEntered(PathBuf::from(typed))
                }
            }
            KeyCode::Esc => {
                self.input.clear();
                self.input_mode = InputMode::Normal;
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    /// Opens the script picker overlay.
    pub fn open_picker(&mut self, scripts: Vec<ProjectScript>) {
        self.scripts = scripts;
        self.picker_selected = 0;
        self.input_mode = InputMode::PickScript;
    }

    pub fn open_confirm_stop(&mut self) {
        self.input_mode = InputMode::ConfirmStop;
    }

    pub fn open_path_entry(&mut self) {
        self.input.clear();
        self.input_mode = InputMode::EditPath;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{RunState, ScriptInfo};

    fn app() -> App {
        App::new(10_000, Duration::from_millis(500), true)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::empty())
    }

    fn script(name: &str) -> ProjectScript {
        ProjectScript {
            name: name.into(),
            command: "true".into(),
        }
    }

    #[test]
    fn rapid_start_requests_collapse_into_one() {
        let mut app = app();
        let t0 = Instant::now();
        assert!(app.accept_start_request(t0));
        assert!(!app.accept_start_request(t0 + Duration::from_millis(100)));
        assert!(!app.accept_start_request(t0 + Duration::from_millis(400)));
        assert!(app.accept_start_request(t0 + Duration::from_millis(600)));
    }

    #[test]
    fn status_line_reflects_run_state() {
        let mut app = app();
        assert!(app.status_line().contains("idle"));
        app.set_run_state(
            RunState::running(
                ScriptInfo {
                    path: "/srv/app".into(),
                    script: "dev".into(),
                },
                4321,
                1,
            ),
            true,
        );
        let line = app.status_line();
        assert!(line.contains("dev"));
        assert!(line.contains("4321"));
    }

    #[test]
    fn picker_enter_yields_chosen_script() {
        let mut app = app();
        app.open_picker(vec![script("build"), script("dev")]);
        assert_eq!(app.handle_key(key(KeyCode::Down)), AppAction::None);
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            AppAction::ScriptChosen("dev".into())
        );
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn picker_escape_aborts_silently() {
        let mut app = app();
        app.open_picker(vec![script("dev"), script("test")]);
        assert_eq!(app.handle_key(key(KeyCode::Esc)), AppAction::None);
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn declining_the_stop_confirmation_changes_nothing() {
        let mut app = app();
        app.open_confirm_stop();
        assert_eq!(app.handle_key(key(KeyCode::Char('n'))), AppAction::None);
        assert_eq!(app.input_mode, InputMode::Normal);

        app.open_confirm_stop();
        assert_eq!(
            app.handle_key(key(KeyCode::Char('y'))),
            AppAction::StopThenStart
        );
    }

    #[test]
    fn typed_path_is_returned_on_enter() {
        let mut app = app();
        app.open_path_entry();
        for c in "/srv/app".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            AppAction::ProjectPathEntered(PathBuf::from("/srv/app"))
        );
    }

    #[test]
    fn follow_keeps_viewport_at_the_end() {
        let mut app = app();
        app.view_height = 2;
        for i in 0..10 {
            app.on_output(format!("line {}", i), StreamKind::Stdout);
        }
        assert_eq!(app.scroll, 8);
    }
}
