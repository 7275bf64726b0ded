//! Application state definitions
//!
//! Everything the renderer needs, updated from coordinator messages and key
//! presses. No terminal access happens here, so the state machine is tested
//! directly.

use crate::coordinator::{Answer, Prompt, PromptKind, UiEvent, UiRequest};
use crate::logger::{LogLevel, LogLine};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::time::Instant;

/// Log lines kept for the pane; older lines are still in the log file.
pub const LOG_CAPACITY: usize = 2000;

/// Lines moved per PageUp/PageDown
pub const PAGE_LINES: usize = 10;

/// What the keyboard currently drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiMode {
    /// Watching the log; arrows scroll, q quits
    Idle,
    /// Typing an answer for a text prompt
    TextInput,
    /// Choosing one of the dialog buttons
    Confirm(PromptKind),
}

/// Result of a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Continue,
    Quit,
}

/// Main application state
#[derive(Debug)]
pub struct AppState {
    pub mode: UiMode,
    pub log: Vec<LogLine>,
    /// Lines scrolled up from the bottom of the log; 0 follows new output
    pub scroll_offset: usize,
    pub progress: f64,
    pub step: String,
    /// Open prompt and the channel to answer it
    pub pending: Option<UiRequest>,
    /// Highlighted button in a confirm dialog
    pub selection: usize,
    pub input: String,
    /// Set once the worker reports completion
    pub done: Option<bool>,
    pub failure: Option<String>,
    pub worker_finished: bool,
    pub status_message: String,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            mode: UiMode::Idle,
            log: Vec::new(),
            scroll_offset: 0,
            progress: 0.0,
            step: "Starting".to_string(),
            pending: None,
            selection: 0,
            input: String::new(),
            done: None,
            failure: None,
            worker_finished: false,
            status_message: String::new(),
        }
    }
}

/// Buttons for a confirm dialog, in display order.
pub fn buttons(prompt: &Prompt) -> Vec<(&'static str, Answer)> {
    match prompt {
        Prompt::FailureExit { .. } => vec![
            ("Exit", Answer::Yes),
            ("Stay", Answer::No),
            ("Retry", Answer::Retry),
        ],
        _ if prompt.kind() == PromptKind::Ternary => vec![
            ("Yes", Answer::Yes),
            ("No", Answer::No),
            ("Retry", Answer::Retry),
        ],
        _ => vec![("Yes", Answer::Yes), ("No", Answer::No)],
    }
}

impl AppState {
    pub fn apply_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Log(line) => self.push_line(line),
            UiEvent::Progress(value) => self.progress = value.clamp(0.0, 1.0),
            UiEvent::Step(label) => {
                // A step after a failure means the user chose Retry
                if self.failure.is_some() {
                    self.start_attempt();
                }
                self.step = label;
            }
            UiEvent::Done { reboot_default } => {
                self.failure = None;
                self.done = Some(reboot_default);
                self.progress = 1.0;
                self.status_message = "Installation complete".to_string();
            }
            UiEvent::Failure(message) => {
                self.status_message = "Installation failed".to_string();
                self.failure = Some(message);
            }
        }
    }

    fn start_attempt(&mut self) {
        self.failure = None;
        self.done = None;
        self.progress = 0.0;
        self.status_message.clear();
    }

    fn push_line(&mut self, line: LogLine) {
        self.log.push(line);
        if self.log.len() > LOG_CAPACITY {
            let excess = self.log.len() - LOG_CAPACITY;
            self.log.drain(..excess);
        }
        // Keep the viewed window still while the user is scrolled up
        if self.scroll_offset > 0 {
            self.scroll_offset = (self.scroll_offset + 1).min(self.log.len());
        }
    }

    /// Open the dialog for a new request, replacing any stale one.
    pub fn accept_request(&mut self, request: UiRequest) {
        let kind = request.prompt.kind();
        self.mode = match kind {
            PromptKind::Text => UiMode::TextInput,
            other => UiMode::Confirm(other),
        };
        let default = request.prompt.default_answer();
        self.selection = buttons(&request.prompt)
            .iter()
            .position(|(_, answer)| *answer == default)
            .unwrap_or(0);
        self.input.clear();
        self.pending = Some(request);
    }

    /// Close a dialog whose deadline passed; the worker has already moved on.
    pub fn drop_expired(&mut self, now: Instant) -> bool {
        let expired = self
            .pending
            .as_ref()
            .is_some_and(|request| request.is_expired(now));
        if expired {
            if let Some(request) = self.pending.take() {
                self.push_line(LogLine {
                    level: LogLevel::Warning,
                    text: format!("{}: no answer, continuing without it", request.prompt.title()),
                });
            }
            self.close_dialog();
        }
        expired
    }

    /// Send `answer` to the waiting worker and close the dialog.
    pub fn respond(&mut self, answer: Answer) {
        if let Some(request) = self.pending.take() {
            if !request.respond(answer) {
                self.status_message = "Prompt expired before the answer arrived".to_string();
            }
        }
        self.close_dialog();
    }

    fn close_dialog(&mut self) {
        self.mode = UiMode::Idle;
        self.selection = 0;
        self.input.clear();
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> KeyOutcome {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return KeyOutcome::Quit;
        }
        match self.mode {
            UiMode::Idle => return self.handle_idle_key(key.code),
            UiMode::TextInput => self.handle_text_key(key.code),
            UiMode::Confirm(kind) => self.handle_confirm_key(kind, key.code),
        }
        KeyOutcome::Continue
    }

    fn handle_idle_key(&mut self, code: KeyCode) -> KeyOutcome {
        match code {
            KeyCode::Char('q') | KeyCode::Char('Q') => return KeyOutcome::Quit,
            KeyCode::Up | KeyCode::Char('k') => self.scroll_up(1),
            KeyCode::Down | KeyCode::Char('j') => self.scroll_down(1),
            KeyCode::PageUp => self.scroll_up(PAGE_LINES),
            KeyCode::PageDown => self.scroll_down(PAGE_LINES),
            KeyCode::Home => self.scroll_offset = self.log.len(),
            KeyCode::End => self.scroll_offset = 0,
            _ => {}
        }
        KeyOutcome::Continue
    }

    fn handle_text_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Enter => {
                let text = self.input.trim().to_string();
                self.respond(Answer::Text(text));
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Esc => self.input.clear(),
            KeyCode::Char(c) => self.input.push(c),
            _ => {}
        }
    }

    fn handle_confirm_key(&mut self, kind: PromptKind, code: KeyCode) {
        let Some(request) = self.pending.as_ref() else {
            self.close_dialog();
            return;
        };
        let options = buttons(&request.prompt);
        match code {
            KeyCode::Left | KeyCode::Char('h') | KeyCode::BackTab => {
                self.selection = (self.selection + options.len() - 1) % options.len();
            }
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Tab => {
                self.selection = (self.selection + 1) % options.len();
            }
            KeyCode::Enter => {
                let answer = options[self.selection.min(options.len() - 1)].1.clone();
                self.respond(answer);
            }
            KeyCode::Char('y') | KeyCode::Char('Y') => self.respond(Answer::Yes),
            KeyCode::Char('n') | KeyCode::Char('N') => self.respond(Answer::No),
            KeyCode::Char('r') | KeyCode::Char('R') if kind == PromptKind::Ternary => {
                self.respond(Answer::Retry)
            }
            _ => {}
        }
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = (self.scroll_offset + lines).min(self.log.len());
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    /// Range of log lines visible in a pane of `height` rows.
    pub fn visible_range(&self, height: usize) -> std::ops::Range<usize> {
        let end = self.log.len().saturating_sub(self.scroll_offset);
        end.saturating_sub(height)..end
    }

    /// Progress as a whole percentage for the gauge
    pub fn percent(&self) -> u16 {
        (self.progress * 100.0).round().clamp(0.0, 100.0) as u16
    }
}
