//! Worker ↔ UI coordination
//!
//! The worker thread runs the controller; the UI thread owns the terminal.
//! They share exactly one channel of [`UiMessage`]s, flowing worker → UI.
//!
//! - [`UiEvent`]s are fire-and-forget: log lines, progress, step labels and
//!   the terminal done/failure events.
//! - [`UiRequest`]s carry a [`Prompt`], a deadline and a one-shot reply slot.
//!   The worker blocks in [`UiHandle::ask`] until the UI calls
//!   [`UiRequest::respond`] or the deadline passes.
//!
//! A reply slot is written at most once, because `respond` consumes the
//! request. Nothing else is shared between the two threads.

use crate::error::CoordinatorError;
use crate::logger::LogLine;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::time::{Duration, Instant};
use tracing::debug;

// ============================================================================
// Events
// ============================================================================

/// One-way notification from the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Log(LogLine),
    /// Fraction in `0.0..=1.0`, already rounded and monotonic
    Progress(f64),
    /// Current stage label
    Step(String),
    /// Run finished; `reboot_default` preselects the reboot answer
    Done { reboot_default: bool },
    /// Run halted with this cause
    Failure(String),
}

// ============================================================================
// Prompts
// ============================================================================

/// How the UI renders a prompt and which answers it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Yes / No
    Binary,
    /// Yes / No / Retry
    Ternary,
    /// Free text line
    Text,
}

/// Every question the worker can ask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    InstallConfirm,
    CredentialReuse { username: String, email: String },
    Username,
    Email,
    UpgradeConfirm,
    PreservationRestore { count: usize },
    FailureExit { message: String },
    Reboot { default_yes: bool },
    SecureBootEnable,
    SecureBootContinue,
}

impl Prompt {
    pub fn kind(&self) -> PromptKind {
        match self {
            Self::Username | Self::Email => PromptKind::Text,
            Self::FailureExit { .. } => PromptKind::Ternary,
            _ => PromptKind::Binary,
        }
    }

    /// Short label, also used in timeout errors
    pub fn title(&self) -> &'static str {
        match self {
            Self::InstallConfirm => "Start installation",
            Self::CredentialReuse { .. } => "Git identity",
            Self::Username => "Git username",
            Self::Email => "Git email",
            Self::UpgradeConfirm => "System upgrade",
            Self::PreservationRestore { .. } => "Restore settings",
            Self::FailureExit { .. } => "Installation failed",
            Self::Reboot { .. } => "Reboot",
            Self::SecureBootEnable => "Secure Boot",
            Self::SecureBootContinue => "Secure Boot setup",
        }
    }

    /// Body text shown under the title
    pub fn message(&self) -> String {
        match self {
            Self::InstallConfirm => {
                "Install ArchRiot? Packages will be installed and files in ~/.config overwritten."
                    .to_string()
            }
            Self::CredentialReuse { username, email } => format!(
                "Use the existing Git identity?\nName:  {}\nEmail: {}",
                or_unset(username),
                or_unset(email)
            ),
            Self::Username => "Enter your Git username".to_string(),
            Self::Email => "Enter your Git email".to_string(),
            Self::UpgradeConfirm => "Run a full system upgrade now?".to_string(),
            Self::PreservationRestore { count } => format!(
                "Found {} customized setting(s) in your previous config. Restore them?",
                count
            ),
            Self::FailureExit { message } => {
                format!("{}\n\nExit the installer? (Retry starts over)", message)
            }
            Self::Reboot { default_yes: true } => {
                "A new kernel was installed. Reboot now?".to_string()
            }
            Self::Reboot { default_yes: false } => "Reboot now?".to_string(),
            Self::SecureBootEnable => {
                "Secure Boot is supported but disabled and your disk is encrypted. Set it up?"
                    .to_string()
            }
            Self::SecureBootContinue => {
                "Secure Boot setup enrolls new keys in firmware. Continue?".to_string()
            }
        }
    }

    /// Answer preselected in the UI
    pub fn default_answer(&self) -> Answer {
        match self {
            Self::UpgradeConfirm => Answer::No,
            Self::Reboot { default_yes } if !default_yes => Answer::No,
            Self::Username | Self::Email => Answer::Text(String::new()),
            _ => Answer::Yes,
        }
    }
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() { "(not set)" } else { value }
}

/// The UI's reply to a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Retry,
    Text(String),
}

impl Answer {
    pub fn is_yes(&self) -> bool {
        matches!(self, Self::Yes)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// A prompt waiting for its single answer.
#[derive(Debug)]
pub struct UiRequest {
    pub prompt: Prompt,
    pub deadline: Instant,
    reply: SyncSender<Answer>,
}

impl UiRequest {
    /// Deliver the answer. Returns false if the worker stopped waiting.
    pub fn respond(self, answer: Answer) -> bool {
        self.reply.try_send(answer).is_ok()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Time left before the worker gives up
    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }
}

/// Everything the UI receives.
#[derive(Debug)]
pub enum UiMessage {
    Event(UiEvent),
    Request(UiRequest),
}

// ============================================================================
// Worker handle
// ============================================================================

/// Worker-side end of the channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct UiHandle {
    tx: Sender<UiMessage>,
}

/// Create a connected worker handle and UI receiver.
pub fn channel() -> (UiHandle, Receiver<UiMessage>) {
    let (tx, rx) = mpsc::channel();
    (UiHandle { tx }, rx)
}

impl UiHandle {
    /// Send an event. A closed UI is not an error for the worker.
    pub fn emit(&self, event: UiEvent) {
        if self.tx.send(UiMessage::Event(event)).is_err() {
            debug!("UI receiver closed, event dropped");
        }
    }

    pub fn step(&self, label: impl Into<String>) {
        self.emit(UiEvent::Step(label.into()));
    }

    pub fn progress(&self, fraction: f64) {
        self.emit(UiEvent::Progress(fraction));
    }

    /// Block until the UI answers `prompt` or `timeout` elapses.
    pub fn ask(&self, prompt: Prompt, timeout: Duration) -> Result<Answer, CoordinatorError> {
        let title = prompt.title().to_string();
        let deadline = Instant::now() + timeout;
        let (reply, answer) = mpsc::sync_channel(1);

        debug!("Asking UI: {}", title);
        self.tx
            .send(UiMessage::Request(UiRequest {
                prompt,
                deadline,
                reply,
            }))
            .map_err(|_| CoordinatorError::Disconnected {
                prompt: title.clone(),
            })?;

        match answer.recv_timeout(timeout) {
            Ok(answer) => Ok(answer),
            Err(RecvTimeoutError::Timeout) => Err(CoordinatorError::Timeout {
                prompt: title,
                waited: timeout,
            }),
            // The UI drops requests once their deadline passes
            Err(RecvTimeoutError::Disconnected) if Instant::now() >= deadline => {
                Err(CoordinatorError::Timeout {
                    prompt: title,
                    waited: timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(CoordinatorError::Disconnected { prompt: title })
            }
        }
    }

    /// Binary prompt as a bool.
    pub fn confirm(&self, prompt: Prompt, timeout: Duration) -> Result<bool, CoordinatorError> {
        Ok(self.ask(prompt, timeout)?.is_yes())
    }

    /// Text prompt, trimmed. Non-text answers read as empty.
    pub fn input(&self, prompt: Prompt, timeout: Duration) -> Result<String, CoordinatorError> {
        match self.ask(prompt, timeout)? {
            Answer::Text(text) => Ok(text.trim().to_string()),
            _ => Ok(String::new()),
        }
    }
}
