//! Installer settings file
//!
//! Optional JSON file tuning timeouts, retry policy and a few names. Every
//! field has a default, so a missing file, an empty object, or a partial
//! object are all valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Tunables for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerSettings {
    /// Wait for each username/email/reuse answer
    pub credential_timeout_secs: u64,
    /// Wait for yes/no and exit/retry answers
    pub confirm_timeout_secs: u64,
    /// Wait for the settings-restore answer
    pub preservation_timeout_secs: u64,
    /// Attempts through the fallback package manager
    pub fallback_attempts: u32,
    /// Pause between fallback attempts
    pub fallback_retry_delay_secs: u64,
    /// Maximum wait for another package manager's database lock
    pub pacman_lock_wait_secs: u64,
    /// Module whose run triggers credential setup
    pub identity_module: String,
    /// Shell command that installs the boot screen
    pub boot_screen_command: String,
    /// Force ASCII glyphs in the log
    pub ascii_only: bool,
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            credential_timeout_secs: 300,
            confirm_timeout_secs: 600,
            preservation_timeout_secs: 30,
            fallback_attempts: 3,
            fallback_retry_delay_secs: 120,
            pacman_lock_wait_secs: 120,
            identity_module: "core.identity".to_string(),
            boot_screen_command: "sudo plymouth-set-default-theme -R archriot".to_string(),
            ascii_only: false,
        }
    }
}

impl InstallerSettings {
    /// Load settings from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings from {:?}", path.as_ref()))?;
        let settings: Self =
            serde_json::from_str(&content).context("Failed to parse settings JSON")?;
        Ok(settings)
    }

    /// Save settings as pretty JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write settings to {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Resolve settings for a run.
    ///
    /// An explicit path must exist. The default path is optional and falls
    /// back to built-in defaults when absent. Either way the result is
    /// validated.
    pub fn resolve(explicit: Option<&Path>, default_path: &Path) -> crate::error::Result<Self> {
        let settings = match explicit {
            Some(path) => Self::load_from_file(path),
            None if default_path.is_file() => Self::load_from_file(default_path),
            None => {
                debug!("No settings file at {}, using defaults", default_path.display());
                Ok(Self::default())
            }
        }
        .map_err(|e| crate::error::InstallerError::settings(format!("{:#}", e)))?;

        settings
            .validate()
            .map_err(|e| crate::error::InstallerError::settings(e.to_string()))?;
        info!(
            "Settings: fallback attempts {}, credential timeout {}s",
            settings.fallback_attempts, settings.credential_timeout_secs
        );
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("credential_timeout_secs", self.credential_timeout_secs),
            ("confirm_timeout_secs", self.confirm_timeout_secs),
            ("preservation_timeout_secs", self.preservation_timeout_secs),
            ("pacman_lock_wait_secs", self.pacman_lock_wait_secs),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }

        if self.fallback_attempts == 0 {
            anyhow::bail!("fallback_attempts must be at least 1");
        }

        match self.identity_module.split_once('.') {
            Some((category, name))
                if !category.is_empty() && !name.is_empty() && !name.contains('.') => {}
            _ => anyhow::bail!(
                "identity_module '{}' must have the form category.name",
                self.identity_module
            ),
        }

        if self.boot_screen_command.trim().is_empty() {
            anyhow::bail!("boot_screen_command must not be empty");
        }

        Ok(())
    }

    pub fn credential_timeout(&self) -> Duration {
        Duration::from_secs(self.credential_timeout_secs)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn preservation_timeout(&self) -> Duration {
        Duration::from_secs(self.preservation_timeout_secs)
    }

    pub fn fallback_retry_delay(&self) -> Duration {
        Duration::from_secs(self.fallback_retry_delay_secs)
    }

    pub fn pacman_lock_wait(&self) -> Duration {
        Duration::from_secs(self.pacman_lock_wait_secs)
    }
}
