//! Install State Machine
//!
//! Rust-side source of truth for where a run is. The controller advances a
//! [`StageTracker`] once per stage, so a stage cannot be skipped or re-entered
//! without going through [`StageTracker::reset`].
//!
//! # Stage Flow
//!
//! ```text
//! NotStarted
//!     ↓
//! Prepare
//!     ↓
//! SyncPackageDatabases
//!     ↓
//! LoadConfig
//!     ↓
//! ValidateConfig
//!     ↓
//! ExecuteModules
//!     ↓
//! FullSystemUpgrade   (entered even when the user declines it)
//!     ↓
//! InstallBootScreen
//!     ↓
//! Complete
//!
//! (Any non-terminal stage can transition to Failed)
//! ```

use chrono::Utc;
use std::fmt;
use thiserror::Error;

/// Controller stages in sequential order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstallStage {
    NotStarted = 0,

    /// Open logs, announce the run
    Prepare = 1,

    /// `pacman -Sy` and the fallback manager's sync
    SyncPackageDatabases = 2,

    /// Locate and parse the manifest
    LoadConfig = 3,

    /// Structure, dependency and command safety checks
    ValidateConfig = 4,

    /// Resolve order and run every module
    ExecuteModules = 5,

    /// Optional, gated behind a confirmation
    FullSystemUpgrade = 6,

    /// Required; failure here is fatal
    InstallBootScreen = 7,

    /// Terminal success
    Complete = 8,

    /// Terminal failure; the tracker remembers where
    Failed = 255,
}

impl InstallStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns true for Complete and Failed
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::Prepare),
            Self::Prepare => Some(Self::SyncPackageDatabases),
            Self::SyncPackageDatabases => Some(Self::LoadConfig),
            Self::LoadConfig => Some(Self::ValidateConfig),
            Self::ValidateConfig => Some(Self::ExecuteModules),
            Self::ExecuteModules => Some(Self::FullSystemUpgrade),
            Self::FullSystemUpgrade => Some(Self::InstallBootScreen),
            Self::InstallBootScreen => Some(Self::Complete),
            Self::Complete | Self::Failed => None,
        }
    }

    /// Step label shown in the UI
    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::Prepare => "Preparing installation",
            Self::SyncPackageDatabases => "Syncing package databases",
            Self::LoadConfig => "Loading configuration",
            Self::ValidateConfig => "Validating configuration",
            Self::ExecuteModules => "Installing modules",
            Self::FullSystemUpgrade => "Upgrading system",
            Self::InstallBootScreen => "Installing boot screen",
            Self::Complete => "Installation complete",
            Self::Failed => "Installation failed",
        }
    }

    /// Progress fraction reported once this stage has finished.
    ///
    /// ExecuteModules reports its start value; per-module progress is added
    /// on top by [`crate::logic::progress::ProgressMeter`].
    pub const fn progress(self) -> f64 {
        match self {
            Self::NotStarted => 0.0,
            Self::Prepare => 0.10,
            Self::SyncPackageDatabases => 0.15,
            Self::LoadConfig => 0.20,
            Self::ValidateConfig => 0.25,
            Self::ExecuteModules => 0.30,
            Self::FullSystemUpgrade => 0.90,
            Self::InstallBootScreen => 0.95,
            Self::Complete => 1.0,
            Self::Failed => 0.0,
        }
    }

    /// All stages in order (excluding Failed)
    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::NotStarted,
            Self::Prepare,
            Self::SyncPackageDatabases,
            Self::LoadConfig,
            Self::ValidateConfig,
            Self::ExecuteModules,
            Self::FullSystemUpgrade,
            Self::InstallBootScreen,
            Self::Complete,
        ]
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallTransitionError {
    #[error("Cannot skip from {from} to {to} (must transition through intermediate stages)")]
    SkippedStage { from: InstallStage, to: InstallStage },

    #[error("Cannot go backwards from {from} to {to} (installation is forward-only)")]
    BackwardTransition { from: InstallStage, to: InstallStage },

    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: InstallStage },

    #[error("Already at stage {stage}")]
    AlreadyAtStage { stage: InstallStage },
}

impl From<InstallTransitionError> for crate::error::InstallerError {
    fn from(err: InstallTransitionError) -> Self {
        crate::error::InstallerError::InstallTransition(err.to_string())
    }
}

/// Tracks the controller's current stage for one attempt.
///
/// A retry after failure calls [`reset`](Self::reset) and starts from
/// `NotStarted` again.
///
/// # Example
///
/// ```
/// use riotinstall::install_state::{InstallStage, StageTracker};
///
/// let mut tracker = StageTracker::new();
/// tracker.advance().unwrap();
/// assert_eq!(tracker.current_stage(), InstallStage::Prepare);
///
/// // Cannot skip stages
/// assert!(tracker.transition_to(InstallStage::ExecuteModules).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct StageTracker {
    current: InstallStage,
    failed_at: Option<InstallStage>,
    /// (stage, unix timestamp) for every stage entered
    stage_history: Vec<(InstallStage, i64)>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: InstallStage::NotStarted,
            failed_at: None,
            stage_history: Vec::with_capacity(InstallStage::all_stages().len()),
        }
    }

    #[inline]
    pub fn current_stage(&self) -> InstallStage {
        self.current
    }

    #[inline]
    pub fn failed_at(&self) -> Option<InstallStage> {
        self.failed_at
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current == InstallStage::Complete
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.current == InstallStage::Failed
    }

    /// Returns true if a stage is running (not terminal, not NotStarted)
    #[inline]
    pub fn is_in_progress(&self) -> bool {
        !self.current.is_terminal() && self.current != InstallStage::NotStarted
    }

    pub fn stage_history(&self) -> &[(InstallStage, i64)] {
        &self.stage_history
    }

    /// Advance to the next stage in sequence.
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` if already at Complete or Failed
    pub fn advance(&mut self) -> Result<InstallStage, InstallTransitionError> {
        let Some(next) = self.current.next() else {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        };
        self.enter(next);
        Ok(next)
    }

    /// Transition to `target`, which must be the immediate next stage.
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` if current is a terminal state
    /// - `AlreadyAtStage` if target is the current stage
    /// - `BackwardTransition` if target is before current
    /// - `SkippedStage` if target is not the immediate next stage
    pub fn transition_to(
        &mut self,
        target: InstallStage,
    ) -> Result<InstallStage, InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }
        if target == self.current {
            return Err(InstallTransitionError::AlreadyAtStage { stage: target });
        }
        if target == InstallStage::Failed || self.current.next() != Some(target) {
            if target != InstallStage::Failed && target.order() < self.current.order() {
                return Err(InstallTransitionError::BackwardTransition {
                    from: self.current,
                    to: target,
                });
            }
            return Err(InstallTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        self.enter(target);
        Ok(target)
    }

    /// Mark the run as failed at the current stage.
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` if already at Complete or Failed
    pub fn fail(&mut self) -> Result<(), InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }
        self.failed_at = Some(self.current);
        self.enter(InstallStage::Failed);
        Ok(())
    }

    /// Back to NotStarted with an empty history.
    pub fn reset(&mut self) {
        self.current = InstallStage::NotStarted;
        self.failed_at = None;
        self.stage_history.clear();
    }

    fn enter(&mut self, stage: InstallStage) {
        self.stage_history.push((stage, Utc::now().timestamp()));
        self.current = stage;
    }
}
