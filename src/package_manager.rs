//! Package installation
//!
//! # Architecture
//!
//! - [`PackageBackend`]: one package manager (query, install, refresh)
//! - [`Pacman`]: primary backend, official repositories
//! - [`Yay`]: fallback backend, builds AUR packages
//! - [`PackageInstaller`]: the per-module policy on top of two backends
//!
//! # Install Policy
//!
//! | Step | On failure |
//! |------|------------|
//! | Drop packages already installed | query errors count as "not installed" |
//! | Primary install of the remaining batch | refresh databases, retry once |
//! | Fallback install of the same batch | retry up to N attempts with a delay |
//! | Verify every package after a fallback run | hard error naming the missing ones |
//!
//! The last step exists because an AUR helper can exit zero while silently
//! skipping a target it could not find.

use crate::command_runner::CommandRunner;
use crate::error::InstallerError;
use crate::logger::InstallLog;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Suffixes that usually mean the package only exists in the AUR.
pub const AUR_SUFFIXES: &[&str] = &["-git", "-bin", "-devel", "-beta", "-alpha", "-rc", "-nightly"];

/// Default pacman database lock
pub const PACMAN_DB_LOCK: &str = "/var/lib/pacman/db.lck";

// ============================================================================
// Backends
// ============================================================================

/// One package manager.
pub trait PackageBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Whether `package` is installed on the system
    fn is_installed(&self, package: &str) -> Result<bool>;

    /// Install `packages` as one batch
    fn install(&self, packages: &[String]) -> Result<()>;

    /// Force a database refresh
    fn refresh(&self) -> Result<()>;
}

/// pacman through `sudo`.
pub struct Pacman {
    runner: Arc<dyn CommandRunner>,
    lock_path: PathBuf,
    lock_wait: Duration,
}

impl Pacman {
    pub fn new(runner: Arc<dyn CommandRunner>, lock_wait: Duration) -> Self {
        Self {
            runner,
            lock_path: PathBuf::from(PACMAN_DB_LOCK),
            lock_wait,
        }
    }

    /// Use a different lock file path
    pub fn with_lock_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = path.into();
        self
    }

    /// Block while another pacman holds the database lock.
    pub fn wait_for_lock(&self) -> Result<()> {
        let started = Instant::now();
        let mut announced = false;
        while self.lock_path.exists() {
            if started.elapsed() >= self.lock_wait {
                anyhow::bail!(
                    "pacman database still locked after {}s ({})",
                    self.lock_wait.as_secs(),
                    self.lock_path.display()
                );
            }
            if !announced {
                debug!("Waiting for {} to be released", self.lock_path.display());
                announced = true;
            }
            std::thread::sleep(Duration::from_millis(500));
        }
        Ok(())
    }
}

impl PackageBackend for Pacman {
    fn name(&self) -> &str {
        "pacman"
    }

    fn is_installed(&self, package: &str) -> Result<bool> {
        Ok(self.runner.run("pacman", &["-Q", package])?.success)
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        self.wait_for_lock()?;
        let mut args = vec!["pacman", "-S", "--noconfirm", "--needed"];
        args.extend(packages.iter().map(String::as_str));
        self.runner
            .run("sudo", &args)?
            .ensure_success("pacman -S")
    }

    fn refresh(&self) -> Result<()> {
        self.wait_for_lock()?;
        self.runner
            .run("sudo", &["pacman", "-Syy"])?
            .ensure_success("pacman -Syy")
    }
}

/// yay, run as the invoking user.
pub struct Yay {
    runner: Arc<dyn CommandRunner>,
}

impl Yay {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl PackageBackend for Yay {
    fn name(&self) -> &str {
        "yay"
    }

    fn is_installed(&self, package: &str) -> Result<bool> {
        Ok(self.runner.run("yay", &["-Q", package])?.success)
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        let mut args = vec![
            "-S",
            "--noconfirm",
            "--needed",
            "--answerclean",
            "None",
            "--answerdiff",
            "None",
        ];
        args.extend(packages.iter().map(String::as_str));
        self.runner.run("yay", &args)?.ensure_success("yay -S")
    }

    fn refresh(&self) -> Result<()> {
        self.runner.run("yay", &["-Sy"])?.ensure_success("yay -Sy")
    }
}

// ============================================================================
// Installer
// ============================================================================

/// What one [`PackageInstaller::install`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSummary {
    pub already_installed: Vec<String>,
    pub installed: Vec<String>,
    /// Name of the backend that installed [`installed`](Self::installed)
    pub backend: Option<String>,
}

/// Idempotent batch installs with fallback and verification.
pub struct PackageInstaller<'a> {
    primary: &'a dyn PackageBackend,
    fallback: &'a dyn PackageBackend,
    attempts: u32,
    retry_delay: Duration,
    log: &'a InstallLog,
}

impl<'a> PackageInstaller<'a> {
    pub fn new(
        primary: &'a dyn PackageBackend,
        fallback: &'a dyn PackageBackend,
        attempts: u32,
        retry_delay: Duration,
        log: &'a InstallLog,
    ) -> Self {
        Self {
            primary,
            fallback,
            attempts: attempts.max(1),
            retry_delay,
            log,
        }
    }

    /// Install whatever part of `packages` is missing.
    ///
    /// # Errors
    ///
    /// [`InstallerError::PackageInstall`] when both backends fail, or when a
    /// fallback run leaves any package uninstalled.
    pub fn install(&self, packages: &[String]) -> Result<InstallSummary, InstallerError> {
        let mut summary = InstallSummary::default();
        let mut pending = Vec::new();
        for package in packages {
            if self.is_installed(package) {
                summary.already_installed.push(package.clone());
            } else {
                pending.push(package.clone());
            }
        }

        if pending.is_empty() {
            if !packages.is_empty() {
                self.log
                    .info(format!("All {} package(s) already installed", packages.len()));
            }
            return Ok(summary);
        }

        self.log.info(format!(
            "Installing {} package(s): {}",
            pending.len(),
            pending.join(" ")
        ));

        if self.install_primary(&pending) {
            summary.installed = pending;
            summary.backend = Some(self.primary.name().to_string());
            return Ok(summary);
        }

        self.install_fallback(&pending)?;
        self.verify(&pending)?;

        summary.installed = pending;
        summary.backend = Some(self.fallback.name().to_string());
        Ok(summary)
    }

    fn is_installed(&self, package: &str) -> bool {
        match self.primary.is_installed(package) {
            Ok(installed) => installed,
            Err(e) => {
                debug!("query for {} failed: {:#}", package, e);
                false
            }
        }
    }

    /// Primary install, one forced refresh, one retry.
    fn install_primary(&self, pending: &[String]) -> bool {
        let name = self.primary.name();
        let Err(first) = self.primary.install(pending) else {
            return true;
        };
        self.log
            .warning(format!("{} install failed: {:#}; refreshing databases", name, first));

        if let Err(e) = self.primary.refresh() {
            self.log.warning(format!("{} refresh failed: {:#}", name, e));
        }

        match self.primary.install(pending) {
            Ok(()) => true,
            Err(e) => {
                self.log
                    .warning(format!("{} retry failed: {:#}; trying {}", name, e, self.fallback.name()));
                false
            }
        }
    }

    fn install_fallback(&self, pending: &[String]) -> Result<(), InstallerError> {
        let aur: Vec<&str> = pending
            .iter()
            .map(String::as_str)
            .filter(|p| is_likely_aur(p))
            .collect();
        if !aur.is_empty() {
            self.log
                .info(format!("Likely AUR package(s), building: {}", aur.join(" ")));
        }

        let mut last_error = None;
        for attempt in 1..=self.attempts {
            match self.fallback.install(pending) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    self.log.warning(format!(
                        "{} attempt {}/{} failed: {:#}",
                        self.fallback.name(),
                        attempt,
                        self.attempts,
                        e
                    ));
                    last_error = Some(e);
                    if attempt < self.attempts && !self.retry_delay.is_zero() {
                        std::thread::sleep(self.retry_delay);
                    }
                }
            }
        }

        Err(InstallerError::package_install(format!(
            "{} and {} both failed for {}: {}",
            self.primary.name(),
            self.fallback.name(),
            pending.join(" "),
            last_error.map(|e| format!("{:#}", e)).unwrap_or_default()
        )))
    }

    fn verify(&self, pending: &[String]) -> Result<(), InstallerError> {
        let missing: Vec<&str> = pending
            .iter()
            .map(String::as_str)
            .filter(|p| !self.is_installed(p))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(InstallerError::package_install(format!(
            "{} reported success but these are not installed: {}",
            self.fallback.name(),
            missing.join(", ")
        )))
    }
}

pub fn is_likely_aur(package: &str) -> bool {
    AUR_SUFFIXES.iter().any(|s| package.ends_with(s))
}

/// Sync the primary databases (`-Sy`, then `-Syy`), then the fallback's.
///
/// The primary sync is required; a fallback sync failure is only a warning.
pub fn sync_databases(runner: &dyn CommandRunner, log: &InstallLog) -> Result<()> {
    let quick = runner.run("sudo", &["pacman", "-Sy"])?;
    if !quick.success {
        log.warning("pacman -Sy failed, forcing a full refresh");
        runner
            .run("sudo", &["pacman", "-Syy"])
            .context("Failed to start pacman")?
            .ensure_success("pacman -Syy")?;
    }

    match runner.run("yay", &["-Sy"]) {
        Ok(out) if out.success => {}
        Ok(out) => log.warning(format!(
            "yay database sync failed: {}",
            out.stderr.trim()
        )),
        Err(e) => log.warning(format!("yay database sync failed: {:#}", e)),
    }
    Ok(())
}
