//! Install log and diagnostic tracing
//!
//! Two separate records are kept:
//!
//! - **Install log**: what the user sees. [`InstallLog`] writes
//!   `install.log` and `install-errors.log` with `[HH:MM:SS] LEVEL: msg`
//!   lines and mirrors each line to the UI as a [`UiEvent::Log`].
//! - **Diagnostics**: `tracing` events for developers, routed by
//!   [`init_tracing`] to `debug.log` in TUI mode or stderr otherwise.

use crate::coordinator::{UiEvent, UiHandle};
use crate::manifest::ModuleKind;
use chrono::Local;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use strum::Display;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub const INSTALL_LOG: &str = "install.log";
pub const ERROR_LOG: &str = "install-errors.log";
pub const DEBUG_LOG: &str = "debug.log";

// ============================================================================
// Levels and lines
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LogLevel {
    #[strum(serialize = "INFO")]
    Info,
    #[strum(serialize = "SUCCESS")]
    Success,
    #[strum(serialize = "WARNING")]
    Warning,
    #[strum(serialize = "ERROR")]
    Error,
    #[strum(serialize = "CRITICAL")]
    Critical,
}

impl LogLevel {
    /// ERROR and CRITICAL also go to the error log
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error | Self::Critical)
    }
}

/// One line of the install log as shown in the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: LogLevel,
    pub text: String,
}

/// `[HH:MM:SS] LEVEL: message`
pub fn format_file_line(time: &str, level: LogLevel, message: &str) -> String {
    format!("[{}] {}: {}", time, level, message)
}

// ============================================================================
// Structured reports
// ============================================================================

/// Outcome column of a report line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Status {
    Progress,
    Info,
    Success,
    Complete,
    Warning,
    Error,
}

impl Status {
    pub fn level(self) -> LogLevel {
        match self {
            Self::Progress | Self::Info => LogLevel::Info,
            Self::Success | Self::Complete => LogLevel::Success,
            Self::Warning => LogLevel::Warning,
            Self::Error => LogLevel::Error,
        }
    }
}

/// Emoji or plain ASCII glyphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlyphStyle {
    #[default]
    Emoji,
    Ascii,
}

impl GlyphStyle {
    /// Pick a style from `--ascii` and the current environment.
    pub fn detect(force_ascii: bool) -> Self {
        let term = std::env::var("TERM").ok();
        let lang = std::env::var("LANG").ok();
        Self::from_env(force_ascii, term.as_deref(), lang.as_deref())
    }

    /// ASCII on the Linux console, dumb terminals, or a non-UTF-8 locale.
    pub fn from_env(force_ascii: bool, term: Option<&str>, lang: Option<&str>) -> Self {
        let basic_term = matches!(term, Some("linux" | "console" | "dumb"));
        let utf8 = lang.is_some_and(|l| {
            let l = l.to_ascii_uppercase();
            l.contains("UTF-8") || l.contains("UTF8")
        });
        if force_ascii || basic_term || !utf8 {
            Self::Ascii
        } else {
            Self::Emoji
        }
    }

    pub fn status(self, status: Status) -> &'static str {
        match (self, status) {
            (Self::Emoji, Status::Progress) => "⏳",
            (Self::Emoji, Status::Complete) => "🎉",
            (Self::Emoji, Status::Success) => "✅",
            (Self::Emoji, Status::Warning) => "⚠️",
            (Self::Emoji, Status::Error) => "❌",
            (Self::Emoji, Status::Info) => "📋",
            (Self::Ascii, Status::Progress) => ".",
            (Self::Ascii, Status::Complete) => "!",
            (Self::Ascii, Status::Success) => "+",
            (Self::Ascii, Status::Warning) => "?",
            (Self::Ascii, Status::Error) => "X",
            (Self::Ascii, Status::Info) => "i",
        }
    }

    pub fn kind(self, kind: ModuleKind) -> &'static str {
        match (self, kind) {
            (Self::Emoji, ModuleKind::Package) => "📦",
            (Self::Emoji, ModuleKind::Git) => "🔧",
            (Self::Emoji, ModuleKind::System) => "💫",
            (Self::Emoji, ModuleKind::File) => "📁",
            (Self::Emoji, ModuleKind::Module) => "🏗️",
            (Self::Ascii, ModuleKind::Package) => "*",
            (Self::Ascii, ModuleKind::Git) => "+",
            (Self::Ascii, ModuleKind::System) => "~",
            (Self::Ascii, ModuleKind::File) => "-",
            (Self::Ascii, ModuleKind::Module) => "=",
        }
    }
}

/// Fixed-width name column: padded to 20, long names cut to 17 + `...`.
pub fn name_column(name: &str) -> String {
    if name.chars().count() > 20 {
        let cut: String = name.chars().take(17).collect();
        format!("{}...", cut)
    } else {
        format!("{:<20}", name)
    }
}

// ============================================================================
// Install log
// ============================================================================

struct Sinks {
    general: File,
    errors: File,
}

/// User-facing install log: two files plus the UI log pane.
pub struct InstallLog {
    sinks: Option<Mutex<Sinks>>,
    dir: Option<PathBuf>,
    glyphs: GlyphStyle,
    ui: UiHandle,
}

impl InstallLog {
    /// Truncate and open both log files under `dir`.
    pub fn open(dir: &Path, glyphs: GlyphStyle, ui: UiHandle) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let general = File::create(dir.join(INSTALL_LOG))?;
        let errors = File::create(dir.join(ERROR_LOG))?;
        debug!("Install log opened in {}", dir.display());
        Ok(Self {
            sinks: Some(Mutex::new(Sinks { general, errors })),
            dir: Some(dir.to_path_buf()),
            glyphs,
            ui,
        })
    }

    /// Log to the UI and tracing only, no files.
    pub fn ui_only(glyphs: GlyphStyle, ui: UiHandle) -> Self {
        Self {
            sinks: None,
            dir: None,
            glyphs,
            ui,
        }
    }

    pub fn glyphs(&self) -> GlyphStyle {
        self.glyphs
    }

    /// Path of `install.log`, if file logging is on
    pub fn path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(INSTALL_LOG))
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Info, message.as_ref(), message.as_ref());
    }

    pub fn success(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Success, message.as_ref(), message.as_ref());
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Warning, message.as_ref(), message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Error, message.as_ref(), message.as_ref());
    }

    pub fn critical(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Critical, message.as_ref(), message.as_ref());
    }

    /// Structured line: `Kind.name - Status: description` in the file,
    /// glyph columns in the UI.
    pub fn report(&self, status: Status, kind: ModuleKind, name: &str, description: &str) {
        let file_line = format!("{}.{} - {}: {}", kind, name, status, description);
        let ui_line = format!(
            "{} {} {} {}",
            self.glyphs.status(status),
            self.glyphs.kind(kind),
            name_column(name),
            description
        );
        self.write(status.level(), &file_line, &ui_line);
    }

    fn write(&self, level: LogLevel, file_text: &str, ui_text: &str) {
        match level {
            LogLevel::Info | LogLevel::Success => info!("{}", file_text),
            LogLevel::Warning => warn!("{}", file_text),
            LogLevel::Error | LogLevel::Critical => error!("{}", file_text),
        }

        if let Some(sinks) = &self.sinks {
            let line = format_file_line(&Local::now().format("%H:%M:%S").to_string(), level, file_text);
            let mut sinks = sinks.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = writeln!(sinks.general, "{}", line) {
                debug!("install log write failed: {}", e);
            }
            if level.is_error() {
                if let Err(e) = writeln!(sinks.errors, "{}", line) {
                    debug!("error log write failed: {}", e);
                }
            }
        }

        self.ui.emit(UiEvent::Log(LogLine {
            level,
            text: ui_text.to_string(),
        }));
    }
}

// ============================================================================
// Tracing
// ============================================================================

/// Where diagnostic tracing output goes.
pub enum TraceTarget<'a> {
    /// Append to this file; the terminal belongs to the TUI
    File(&'a Path),
    Stderr,
}

/// Install the global tracing subscriber. `RUST_LOG` overrides `info`.
pub fn init_tracing(target: TraceTarget<'_>) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match target {
        TraceTarget::File(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        TraceTarget::Stderr => builder.with_writer(io::stderr).try_init(),
    };
    // A second init (tests, retries) keeps the first subscriber
    if let Err(e) = result {
        debug!("tracing already initialised: {}", e);
    }
    Ok(())
}
