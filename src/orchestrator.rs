//! Orchestration controller
//!
//! Runs one installation on the worker thread:
//!
//! ```text
//! confirm → Prepare → SyncPackageDatabases → LoadConfig → ValidateConfig
//!         → ExecuteModules → FullSystemUpgrade (optional) → InstallBootScreen
//!         → Secure Boot check → Complete → Done → reboot prompt
//! ```
//!
//! A fatal stage failure emits [`UiEvent::Failure`] and asks the failure
//! prompt: exit, stay, or retry from `Prepare` with a fresh tracker.

use crate::command_safety;
use crate::context::{Collaborators, InstallContext};
use crate::coordinator::{Answer, Prompt, UiEvent};
use crate::engine::{EngineReport, ExecutionEngine};
use crate::error::{InstallerError, Result};
use crate::install_state::{InstallStage, StageTracker};
use crate::logger::Status;
use crate::logic::progress::{self, ProgressMeter};
use crate::manifest::{self, Manifest, ModuleKind};
use crate::preservation::PreservationConfig;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Progress shown while the Secure Boot recommendation runs
pub const SECURE_BOOT_CHECK_PROGRESS: f64 = 0.98;

/// How a controller run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every stage finished
    Completed { kernel_upgraded: bool, reboot_requested: bool },
    /// The install confirmation was declined
    Cancelled,
    /// A fatal failure the user chose not to retry or exit from
    Failed { message: String },
    /// The user chose to exit after a fatal failure
    Exited { message: String },
}

/// Facts from a successful attempt.
#[derive(Debug, Clone, Copy, Default)]
struct Completion {
    kernel_upgraded: bool,
}

pub struct Controller<'a> {
    ctx: &'a InstallContext,
    collab: Collaborators,
    manifest_override: Option<PathBuf>,
    tracker: StageTracker,
    meter: ProgressMeter,
    attempts: u32,
    report: Option<EngineReport>,
}

impl<'a> Controller<'a> {
    pub fn new(ctx: &'a InstallContext, collab: Collaborators) -> Self {
        Self {
            ctx,
            collab,
            manifest_override: None,
            tracker: StageTracker::new(),
            meter: ProgressMeter::new(),
            attempts: 0,
            report: None,
        }
    }

    /// Load this manifest instead of searching the candidate paths.
    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_override = Some(path.into());
        self
    }

    pub fn tracker(&self) -> &StageTracker {
        &self.tracker
    }

    /// Number of attempts started, including retries
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Engine report of the latest attempt that reached module execution
    pub fn last_report(&self) -> Option<&EngineReport> {
        self.report.as_ref()
    }

    /// Ask for confirmation, then run attempts until one completes or the
    /// user stops retrying.
    pub fn run(&mut self) -> RunOutcome {
        let ctx = self.ctx;
        let (ui, log) = (&ctx.ui, &ctx.log);

        match ui.confirm(Prompt::InstallConfirm, ctx.settings.confirm_timeout()) {
            Ok(true) => {}
            Ok(false) => {
                log.info("Installation cancelled by user");
                return RunOutcome::Cancelled;
            }
            Err(e) => {
                log.warning(format!("Installation not confirmed: {}", e));
                return RunOutcome::Cancelled;
            }
        }

        loop {
            self.attempts += 1;
            self.tracker.reset();
            self.meter = ProgressMeter::new();
            info!("Starting installation attempt {}", self.attempts);

            match self.attempt() {
                Ok(done) => return self.finish(done),
                Err(err) => {
                    let message = err.to_string();
                    if let Err(e) = self.tracker.fail() {
                        debug!("tracker already terminal: {}", e);
                    }
                    log.critical(&message);
                    ui.emit(UiEvent::Failure(message.clone()));

                    let answer = ui.ask(
                        Prompt::FailureExit {
                            message: message.clone(),
                        },
                        ctx.settings.confirm_timeout(),
                    );
                    match answer {
                        Ok(Answer::Retry) => {
                            log.info("Retrying installation from the beginning");
                            continue;
                        }
                        Ok(Answer::Yes) => return RunOutcome::Exited { message },
                        Ok(_) => return RunOutcome::Failed { message },
                        Err(e) => {
                            warn!("failure prompt unanswered: {}", e);
                            return RunOutcome::Failed { message };
                        }
                    }
                }
            }
        }
    }

    fn attempt(&mut self) -> Result<Completion> {
        self.enter(InstallStage::Prepare)?;
        self.prepare()?;

        self.enter(InstallStage::SyncPackageDatabases)?;
        self.collab
            .system
            .sync_databases(&self.ctx.log)
            .map_err(|e| {
                self.ctx
                    .log
                    .info("Run 'sudo pacman -Sy' manually and try again");
                fatal(InstallStage::SyncPackageDatabases, format!("{:#}", e))
            })?;

        self.enter(InstallStage::LoadConfig)?;
        let (manifest, preservation) = self.load_config()?;

        self.enter(InstallStage::ValidateConfig)?;
        validate(&manifest).map_err(|e| fatal(InstallStage::ValidateConfig, e.to_string()))?;
        self.ctx.log.report(
            Status::Success,
            ModuleKind::File,
            "YAML Validation",
            "Configuration validated",
        );

        self.enter(InstallStage::ExecuteModules)?;
        self.execute_modules(&manifest, &preservation)?;

        self.enter(InstallStage::FullSystemUpgrade)?;
        let kernel_upgraded = self.full_upgrade();

        self.enter(InstallStage::InstallBootScreen)?;
        self.collab
            .system
            .install_boot_screen(&self.ctx.log)
            .map_err(|e| fatal(InstallStage::InstallBootScreen, format!("{:#}", e)))?;
        self.ctx
            .log
            .report(Status::Success, ModuleKind::System, "Boot Screen", "Installed");

        self.secure_boot_check();

        self.enter(InstallStage::Complete)?;
        self.ctx
            .log
            .report(Status::Success, ModuleKind::System, "Installation", "Complete!");
        if let Some(path) = self.ctx.log.path() {
            self.ctx
                .log
                .info(format!("Log file available at: {}", path.display()));
        }

        Ok(Completion { kernel_upgraded })
    }

    /// Advance the tracker, show the stage label and its progress.
    fn enter(&mut self, stage: InstallStage) -> Result<()> {
        self.tracker.transition_to(stage)?;
        self.ctx.ui.step(stage.description());
        self.progress(stage.progress());
        Ok(())
    }

    fn progress(&mut self, raw: f64) {
        if let Some(value) = self.meter.advance(raw) {
            self.ctx.ui.progress(value);
        }
    }

    fn prepare(&self) -> Result<()> {
        self.ctx
            .log
            .report(Status::Progress, ModuleKind::System, "System Prep", "Preparing system...");
        fs::create_dir_all(&self.ctx.paths.cache_dir)
            .map_err(|e| fatal(InstallStage::Prepare, format!("cannot create cache directory: {}", e)))
    }

    fn load_config(&self) -> Result<(Manifest, PreservationConfig)> {
        let log = &self.ctx.log;
        let path = match &self.manifest_override {
            Some(path) => path.clone(),
            None => manifest::find_manifest(&self.ctx.paths.manifest_candidates)
                .map_err(|e| fatal(InstallStage::LoadConfig, e.to_string()))?,
        };
        log.report(
            Status::Progress,
            ModuleKind::File,
            "Config Load",
            &format!("Loading: {}", path.display()),
        );

        let manifest = manifest::load_manifest(&path)
            .map_err(|e| fatal(InstallStage::LoadConfig, e.to_string()))?;
        log.report(
            Status::Success,
            ModuleKind::File,
            "YAML Config",
            &format!("Config loaded ({} modules)", manifest.module_count()),
        );

        let preservation = match PreservationConfig::load_optional(&self.ctx.paths.preserve_file) {
            Ok(rules) => rules,
            Err(e) => {
                log.warning(format!("Ignoring preservation rules: {}", e));
                PreservationConfig::default()
            }
        };
        Ok((manifest, preservation))
    }

    fn execute_modules(&mut self, manifest: &Manifest, preservation: &PreservationConfig) -> Result<()> {
        let ctx = self.ctx;
        let collab = self.collab.clone();
        let engine = ExecutionEngine::new(ctx, &collab, preservation);

        let mut meter = self.meter;
        let result = engine.run(manifest, |done, total, _name| {
            if let Some(value) = meter.advance(progress::module_progress(done, total)) {
                ctx.ui.progress(value);
            }
        });
        self.meter = meter;

        match result {
            Ok(report) => {
                self.report = Some(report);
                Ok(())
            }
            Err(e @ InstallerError::ControllerFatal { .. }) => Err(e),
            Err(e) => Err(fatal(InstallStage::ExecuteModules, e.to_string())),
        }
    }

    /// Returns whether a kernel upgrade happened.
    fn full_upgrade(&self) -> bool {
        let log = &self.ctx.log;
        log.report(
            Status::Progress,
            ModuleKind::System,
            "Upgrade Prompt",
            "Asking about system upgrade",
        );
        let confirmed = match self
            .ctx
            .ui
            .confirm(Prompt::UpgradeConfirm, self.ctx.settings.confirm_timeout())
        {
            Ok(confirmed) => confirmed,
            Err(e) => {
                log.warning(format!("System upgrade skipped: {}", e));
                false
            }
        };
        if !confirmed {
            log.report(Status::Info, ModuleKind::System, "Upgrade Choice", "User selected NO");
            return false;
        }

        log.report(Status::Info, ModuleKind::System, "Upgrade Choice", "User selected YES");
        match self.collab.system.full_upgrade(log) {
            Ok(outcome) => {
                log.report(
                    Status::Success,
                    ModuleKind::System,
                    "Package Upgrade",
                    "System upgrade completed",
                );
                outcome.kernel_upgraded
            }
            Err(e) => {
                log.report(
                    Status::Warning,
                    ModuleKind::System,
                    "Package Upgrade",
                    &format!("Failed: {:#}", e),
                );
                false
            }
        }
    }

    fn secure_boot_check(&mut self) {
        self.ctx.ui.step("Checking Secure Boot recommendation...");
        self.progress(SECURE_BOOT_CHECK_PROGRESS);

        let log = &self.ctx.log;
        let status = match self.collab.system.secure_boot_status() {
            Ok(status) => status,
            Err(e) => {
                log.warning(format!("Failed to detect Secure Boot status: {:#}", e));
                return;
            }
        };
        log.report(
            Status::Info,
            ModuleKind::System,
            "SecureBoot",
            &format!(
                "enabled={}, supported={}, luks={}",
                status.enabled, status.supported, status.luks
            ),
        );
        if !status.is_recommended() {
            return;
        }

        let timeout = self.ctx.settings.confirm_timeout();
        let ui = &self.ctx.ui;
        let answer = ui.confirm(Prompt::SecureBootEnable, timeout).and_then(|enable| {
            if enable {
                ui.confirm(Prompt::SecureBootContinue, timeout)
            } else {
                Ok(false)
            }
        });
        match answer {
            Ok(true) => {}
            Ok(false) => {
                log.report(Status::Info, ModuleKind::System, "SecureBoot", "Setup declined");
                return;
            }
            Err(e) => {
                warn!("Secure Boot prompt unanswered: {}", e);
                log.report(
                    Status::Warning,
                    ModuleKind::System,
                    "SecureBoot",
                    &format!("Setup skipped: {}", e),
                );
                return;
            }
        }

        ui.step("Setting up Secure Boot...");
        match self.collab.system.setup_secure_boot(log) {
            Ok(()) => log.report(Status::Success, ModuleKind::System, "SecureBoot", "Setup complete"),
            Err(e) => log.report(
                Status::Warning,
                ModuleKind::System,
                "SecureBoot",
                &format!("Setup failed: {:#}", e),
            ),
        }
    }

    fn finish(&mut self, done: Completion) -> RunOutcome {
        let ui = &self.ctx.ui;
        let log = &self.ctx.log;
        ui.emit(UiEvent::Done {
            reboot_default: done.kernel_upgraded,
        });

        let reboot = match ui.confirm(
            Prompt::Reboot {
                default_yes: done.kernel_upgraded,
            },
            self.ctx.settings.confirm_timeout(),
        ) {
            Ok(reboot) => reboot,
            Err(e) => {
                warn!("Reboot prompt unanswered: {}", e);
                log.warning(format!("Reboot skipped: {}", e));
                false
            }
        };

        if reboot {
            log.info("Rebooting");
            if let Err(e) = self.collab.system.reboot() {
                log.warning(format!("Reboot failed, reboot manually: {:#}", e));
            }
        } else if done.kernel_upgraded {
            log.warning("A new kernel was installed, reboot when convenient");
        }

        RunOutcome::Completed {
            kernel_upgraded: done.kernel_upgraded,
            reboot_requested: reboot,
        }
    }
}

/// Structure, dependency and command safety checks, in that order.
pub fn validate(manifest: &Manifest) -> Result<()> {
    manifest::validate_structure(manifest)?;
    manifest::validate_dependencies(manifest)?;
    command_safety::validate_all_commands(manifest)?;
    Ok(())
}

fn fatal(stage: InstallStage, message: impl Into<String>) -> InstallerError {
    InstallerError::controller_fatal(stage.description(), message)
}
