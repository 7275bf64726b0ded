//! Config deployment
//!
//! Copies a module's config rules from the source tree into the user's
//! config directories. Preservation (`preserve_if_exists`), side-by-side
//! `.old` backups for managed files, and settings restoration for
//! restorable files are applied per copied file.

use crate::context::InstallPaths;
use crate::coordinator::{Prompt, UiHandle};
use crate::error::InstallerError;
use crate::logger::InstallLog;
use crate::manifest::ConfigRule;
use crate::preservation::{self, PreservationConfig};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// What deploying one or more rules did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploySummary {
    pub copied: usize,
    /// Destinations left alone because of `preserve_if_exists`
    pub preserved: Vec<PathBuf>,
    /// `.old` copies written for managed files
    pub backups: Vec<PathBuf>,
    /// Unchanged destinations that were not rewritten
    pub unchanged: usize,
    /// Settings carried over into freshly deployed files
    pub restored: usize,
}

impl DeploySummary {
    fn merge(&mut self, other: DeploySummary) {
        self.copied += other.copied;
        self.preserved.extend(other.preserved);
        self.backups.extend(other.backups);
        self.unchanged += other.unchanged;
        self.restored += other.restored;
    }
}

/// Outcome of [`ConfigDeployer::deploy`]; failures are per rule.
#[derive(Debug, Default)]
pub struct DeployReport {
    pub summary: DeploySummary,
    pub failures: Vec<InstallerError>,
}

/// A restorable file whose previous version carried user settings.
struct PendingRestore {
    destination: PathBuf,
    settings: BTreeMap<String, String>,
}

pub struct ConfigDeployer<'a> {
    paths: &'a InstallPaths,
    rules: &'a PreservationConfig,
    log: &'a InstallLog,
    prompt: Option<(&'a UiHandle, Duration)>,
}

impl<'a> ConfigDeployer<'a> {
    pub fn new(paths: &'a InstallPaths, rules: &'a PreservationConfig, log: &'a InstallLog) -> Self {
        Self {
            paths,
            rules,
            log,
            prompt: None,
        }
    }

    /// Ask through `ui` before restoring customized settings. Without it,
    /// fresh files are kept as deployed.
    pub fn with_restore_prompt(mut self, ui: &'a UiHandle, timeout: Duration) -> Self {
        self.prompt = Some((ui, timeout));
        self
    }

    /// Deploy every rule. A failing rule does not stop the others.
    pub fn deploy(&self, rules: &[ConfigRule]) -> DeployReport {
        let mut report = DeployReport::default();
        for rule in rules {
            match self.deploy_rule(rule) {
                Ok(summary) => report.summary.merge(summary),
                Err(e) => {
                    self.log.warning(e.to_string());
                    report.failures.push(e);
                }
            }
        }
        report
    }

    /// Deploy a single rule.
    ///
    /// # Errors
    ///
    /// [`InstallerError::ConfigDeploy`] if the source is missing or a copy
    /// fails.
    pub fn deploy_rule(&self, rule: &ConfigRule) -> Result<DeploySummary, InstallerError> {
        let (source, destination) = self.resolve(rule)?;
        debug!("Deploying {} -> {}", source.display(), destination.display());

        let mut summary = DeploySummary::default();
        let mut pending = Vec::new();
        let result = if source.is_dir() {
            self.copy_tree(&source, &destination, rule, &mut summary, &mut pending)
        } else {
            self.copy_file(&source, &destination, rule, &mut summary, &mut pending)
        };
        result.map_err(|e| {
            InstallerError::config_deploy(format!(
                "{} -> {}: {}",
                rule.pattern,
                destination.display(),
                e
            ))
        })?;

        for restore in pending {
            summary.restored += self.restore_settings(restore);
        }
        Ok(summary)
    }

    /// Source and destination for `rule`.
    pub fn resolve(&self, rule: &ConfigRule) -> Result<(PathBuf, PathBuf), InstallerError> {
        let missing = |source: &Path| {
            InstallerError::config_deploy(format!(
                "source for '{}' not found: {}",
                rule.pattern,
                source.display()
            ))
        };

        if let Some(dir) = rule.directory() {
            let source = self.paths.config_source.join(dir);
            if !source.is_dir() {
                return Err(missing(&source));
            }
            let destination = match &rule.target {
                Some(target) => self.expand_target(target),
                None => self.paths.config_home.join(dir),
            };
            return Ok((source, destination));
        }

        let source = self.paths.config_source.join(&rule.pattern);
        if !source.exists() {
            return Err(missing(&source));
        }
        let destination = match &rule.target {
            Some(target) if target.ends_with('/') => {
                let name = source
                    .file_name()
                    .ok_or_else(|| missing(&source))?;
                self.expand_target(target).join(name)
            }
            Some(target) => self.expand_target(target),
            None => self.paths.config_home.join(&rule.pattern),
        };
        Ok((source, destination))
    }

    /// `~/` is the home directory; other relative targets sit under the
    /// config home.
    fn expand_target(&self, target: &str) -> PathBuf {
        let expanded = self.paths.expand_home(target);
        if expanded.is_absolute() {
            expanded
        } else {
            self.paths.config_home.join(expanded)
        }
    }

    fn copy_tree(
        &self,
        source: &Path,
        destination: &Path,
        rule: &ConfigRule,
        summary: &mut DeploySummary,
        pending: &mut Vec<PendingRestore>,
    ) -> io::Result<()> {
        fs::create_dir_all(destination)?;
        let mut entries = fs::read_dir(source)?.collect::<io::Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let from = entry.path();
            let to = destination.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                self.copy_tree(&from, &to, rule, summary, pending)?;
            } else {
                self.copy_file(&from, &to, rule, summary, pending)?;
            }
        }
        Ok(())
    }

    fn copy_file(
        &self,
        source: &Path,
        destination: &Path,
        rule: &ConfigRule,
        summary: &mut DeploySummary,
        pending: &mut Vec<PendingRestore>,
    ) -> io::Result<()> {
        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if destination.exists() {
            if rule.preserve_if_exists.iter().any(|p| *p == name) {
                self.log.info(format!("Preserved existing {}", destination.display()));
                summary.preserved.push(destination.to_path_buf());
                return Ok(());
            }

            let fresh = fs::read(source)?;
            let existing = fs::read(destination)?;
            if fresh == existing {
                summary.unchanged += 1;
                return Ok(());
            }

            if self.rules.backs_up_on_diff(destination, self.paths) {
                let backup = side_by_side(destination);
                fs::copy(destination, &backup)?;
                self.log.info(format!("Backed up {} to {}", name, backup.display()));
                summary.backups.push(backup);
            }

            if let Some(restore) = self.pending_restore(source, destination, &existing, &fresh)? {
                pending.push(restore);
            }
        } else if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::copy(source, destination)?;
        summary.copied += 1;
        Ok(())
    }

    /// Customized settings worth offering back, with a dated backup taken
    /// before the destination is overwritten.
    fn pending_restore(
        &self,
        source: &Path,
        destination: &Path,
        existing: &[u8],
        fresh: &[u8],
    ) -> io::Result<Option<PendingRestore>> {
        let Ok(relative) = source.strip_prefix(&self.paths.config_source) else {
            return Ok(None);
        };
        if !self.rules.is_restorable(relative) {
            return Ok(None);
        }

        let existing = String::from_utf8_lossy(existing);
        let fresh = String::from_utf8_lossy(fresh);
        let settings = self.rules.customized_settings(&existing, &fresh);
        if settings.is_empty() {
            return Ok(None);
        }

        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config".to_string());
        preservation::create_dated_backup(destination, &self.paths.cache_dir, &name)?;

        Ok(Some(PendingRestore {
            destination: destination.to_path_buf(),
            settings,
        }))
    }

    /// Returns the number of settings restored.
    fn restore_settings(&self, restore: PendingRestore) -> usize {
        let count = restore.settings.len();
        let Some((ui, timeout)) = self.prompt else {
            self.log.info(format!(
                "{} customized setting(s) in {} not restored; previous version backed up",
                count,
                restore.destination.display()
            ));
            return 0;
        };

        match ui.confirm(Prompt::PreservationRestore { count }, timeout) {
            Ok(true) => {}
            Ok(false) => {
                self.log.info("Keeping the fresh config, previous version backed up");
                return 0;
            }
            Err(e) => {
                self.log.warning(format!("Settings restoration skipped: {}", e));
                return 0;
            }
        }

        let result = fs::read_to_string(&restore.destination).and_then(|fresh| {
            let merged = self.rules.apply_settings(&fresh, &restore.settings);
            fs::write(&restore.destination, merged)
        });
        match result {
            Ok(()) => {
                self.log.success(format!(
                    "Restored {} setting(s) in {}",
                    count,
                    restore.destination.display()
                ));
                count
            }
            Err(e) => {
                self.log.warning(format!(
                    "Could not restore settings in {}: {}",
                    restore.destination.display(),
                    e
                ));
                0
            }
        }
    }
}

/// `name` → `name.old` in the same directory.
fn side_by_side(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".old");
    path.with_file_name(name)
}
