//! riotinstall library
//!
//! Installs and configures a desktop from a declarative module manifest:
//! packages through pacman with a yay fallback, config files with
//! preservation rules, Git identity, module commands, then an optional full
//! upgrade, the boot screen and a Secure Boot recommendation.
//!
//! The binary runs the [`orchestrator::Controller`] on a worker thread and
//! puts either the TUI ([`app`]) or the [`headless`] responder on the other
//! end of the [`coordinator`] channel.

pub mod app;
pub mod cli;
pub mod command_runner;
pub mod command_safety;
pub mod context;
pub mod coordinator;
pub mod credentials;
pub mod deployer;
pub mod engine;
pub mod error;
pub mod headless;
pub mod install_state;
pub mod logger;
pub mod logic;
pub mod manifest;
pub mod orchestrator;
pub mod package_manager;
pub mod preservation;
pub mod process_guard;
pub mod settings;
pub mod system;
pub mod theme;
pub mod ui;
pub mod validation;

// Re-export main types for convenience
pub use context::{Collaborators, InstallContext, InstallPaths};
pub use coordinator::{Answer, Prompt, UiEvent, UiHandle, UiMessage};
pub use error::{ConfigError, DangerousCommandError, DependencyError, InstallerError};
pub use install_state::{InstallStage, InstallTransitionError, StageTracker};
pub use manifest::{Manifest, Module, ModuleKind};
pub use orchestrator::{Controller, RunOutcome};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use settings::InstallerSettings;

// Execution order
pub use logic::resolver::resolve_order;
