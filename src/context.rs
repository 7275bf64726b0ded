//! Run context
//!
//! Everything a run needs is built once in `main` and handed down
//! explicitly: filesystem locations, settings, the install log and the UI
//! handle in [`InstallContext`]; the side-effecting collaborators in
//! [`Collaborators`]. Components never reach for globals.

use crate::command_runner::{CommandRunner, ShellRunner};
use crate::coordinator::UiHandle;
use crate::logger::InstallLog;
use crate::package_manager::{PackageBackend, Pacman, Yay};
use crate::settings::InstallerSettings;
use crate::system::{ArchSystem, SystemServices};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Filesystem locations for one run, all derived from the home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    pub home: PathBuf,
    /// `~/.local/share/archriot`
    pub data_dir: PathBuf,
    /// Root that config rule patterns are relative to
    pub config_source: PathBuf,
    /// Default destination root for config rules, `~/.config`
    pub config_home: PathBuf,
    /// Manifest search order
    pub manifest_candidates: Vec<PathBuf>,
    pub preserve_file: PathBuf,
    pub settings_file: PathBuf,
    /// Logs and dated backups, `~/.cache/archriot`
    pub cache_dir: PathBuf,
    /// Persisted identity, `~/.config/archriot/user.env`
    pub user_env: PathBuf,
}

impl InstallPaths {
    /// Paths under the current user's home directory.
    pub fn discover() -> Result<Self> {
        let home = dirs::home_dir().context("Could not determine the home directory")?;
        Ok(Self::from_home(&home))
    }

    /// Paths under `home`. The local `./install/packages.yaml` is the second
    /// manifest candidate.
    pub fn from_home(home: &Path) -> Self {
        let data_dir = home.join(".local/share/archriot");
        let install_dir = data_dir.join("install");
        let config_home = home.join(".config");
        Self {
            home: home.to_path_buf(),
            config_source: data_dir.join("config"),
            manifest_candidates: vec![
                install_dir.join("packages.yaml"),
                PathBuf::from("install/packages.yaml"),
            ],
            preserve_file: install_dir.join("preserve.yaml"),
            settings_file: install_dir.join("installer.json"),
            cache_dir: home.join(".cache/archriot"),
            user_env: config_home.join("archriot/user.env"),
            config_home,
            data_dir,
        }
    }

    /// Expand a leading `~` or `~/` against [`home`](Self::home).
    pub fn expand_home(&self, path: &str) -> PathBuf {
        if path == "~" {
            self.home.clone()
        } else if let Some(rest) = path.strip_prefix("~/") {
            self.home.join(rest)
        } else {
            PathBuf::from(path)
        }
    }
}

/// Per-run state passed by reference into every component.
pub struct InstallContext {
    pub paths: InstallPaths,
    pub settings: InstallerSettings,
    pub log: InstallLog,
    pub ui: UiHandle,
}

impl InstallContext {
    pub fn new(paths: InstallPaths, settings: InstallerSettings, log: InstallLog, ui: UiHandle) -> Self {
        Self {
            paths,
            settings,
            log,
            ui,
        }
    }
}

/// Side-effecting collaborators, swappable for fakes in tests.
#[derive(Clone)]
pub struct Collaborators {
    /// Module commands and git
    pub runner: Arc<dyn CommandRunner>,
    pub primary: Arc<dyn PackageBackend>,
    pub fallback: Arc<dyn PackageBackend>,
    pub system: Arc<dyn SystemServices>,
}

impl Collaborators {
    /// pacman, yay and the real system, all through [`ShellRunner`].
    pub fn arch(settings: &InstallerSettings) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new());
        Self {
            primary: Arc::new(Pacman::new(runner.clone(), settings.pacman_lock_wait())),
            fallback: Arc::new(Yay::new(runner.clone())),
            system: Arc::new(ArchSystem::new(
                runner.clone(),
                settings.boot_screen_command.clone(),
            )),
            runner,
        }
    }
}
