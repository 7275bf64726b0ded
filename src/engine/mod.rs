//! Module execution engine
//!
//! Takes the validated manifest, resolves the execution order and drives
//! each module through four steps:
//!
//! 1. packages ([`PackageInstaller`])
//! 2. git identity, for the identity module only ([`CredentialProvider`])
//! 3. config rules ([`ConfigDeployer`])
//! 4. commands ([`commands::run_commands`])
//!
//! A failing step is logged as a warning and the module still completes,
//! unless the module is marked critical or the step was a credential
//! timeout. Only those, and a resolver failure before any module runs,
//! end the engine with an error.

pub mod commands;

use crate::context::{Collaborators, InstallContext};
use crate::credentials::CredentialProvider;
use crate::deployer::ConfigDeployer;
use crate::error::{InstallerError, Result};
use crate::logger::Status;
use crate::logic::resolver;
use crate::manifest::{Manifest, Module, ModuleKind};
use crate::package_manager::PackageInstaller;
use crate::preservation::PreservationConfig;

/// Stage label used for fatal engine errors
pub const STAGE: &str = "Module execution";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Completed,
    /// Completed, but at least one step failed
    CompletedWithWarnings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOutcome {
    pub name: String,
    pub status: ModuleStatus,
    pub warnings: Vec<String>,
}

/// Everything one engine run did, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineReport {
    pub order: Vec<String>,
    pub modules: Vec<ModuleOutcome>,
}

impl EngineReport {
    pub fn warning_count(&self) -> usize {
        self.modules
            .iter()
            .filter(|m| m.status == ModuleStatus::CompletedWithWarnings)
            .count()
    }
}

pub struct ExecutionEngine<'a> {
    ctx: &'a InstallContext,
    collab: &'a Collaborators,
    preservation: &'a PreservationConfig,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(ctx: &'a InstallContext, collab: &'a Collaborators, preservation: &'a PreservationConfig) -> Self {
        Self {
            ctx,
            collab,
            preservation,
        }
    }

    /// Run every module in dependency order.
    ///
    /// `on_module_done(done, total, name)` is called once after each module,
    /// whatever its outcome.
    ///
    /// # Errors
    ///
    /// [`InstallerError::Dependency`] if the order cannot be resolved;
    /// [`InstallerError::ControllerFatal`] for a failure in a critical
    /// module; [`InstallerError::CredentialTimeout`] when identity prompts
    /// go unanswered.
    pub fn run<F>(&self, manifest: &Manifest, mut on_module_done: F) -> Result<EngineReport>
    where
        F: FnMut(usize, usize, &str),
    {
        let log = &self.ctx.log;
        log.report(Status::Progress, ModuleKind::System, "Module Exec", "Resolving dependencies");

        let order = resolver::resolve_order(manifest).inspect_err(|e| {
            log.error(format!("Dependency resolution failed: {}", e));
        })?;

        let total = order.len();
        log.info(format!("Executing {} module(s) in dependency order", total));

        let mut report = EngineReport {
            order: order.clone(),
            modules: Vec::with_capacity(total),
        };

        for (i, name) in order.iter().enumerate() {
            let Some(module) = manifest.get(name) else {
                continue;
            };
            let outcome = self.run_module(module)?;
            report.modules.push(outcome);
            on_module_done(i + 1, total, name);
        }

        log.success(format!(
            "All modules executed ({} with warnings)",
            report.warning_count()
        ));
        Ok(report)
    }

    /// Run one module's four steps.
    pub fn run_module(&self, module: &Module) -> Result<ModuleOutcome> {
        let log = &self.ctx.log;
        let name = module.full_name.as_str();
        let kind = module.kind().unwrap_or(ModuleKind::Module);
        log.report(Status::Progress, kind, name, &module.start);

        let mut warnings = Vec::new();

        let settings = &self.ctx.settings;
        let installer = PackageInstaller::new(
            self.collab.primary.as_ref(),
            self.collab.fallback.as_ref(),
            settings.fallback_attempts,
            settings.fallback_retry_delay(),
            log,
        );
        if let Err(e) = installer.install(&module.packages) {
            self.absorb(module, ModuleKind::Package, e, &mut warnings)?;
        }

        if name == settings.identity_module {
            let provider = CredentialProvider::new(
                self.collab.runner.as_ref(),
                &self.ctx.ui,
                log,
                settings.credential_timeout(),
            );
            if let Err(e) = provider.configure(&self.ctx.paths.user_env) {
                if matches!(e, InstallerError::CredentialTimeout(_)) {
                    log.report(Status::Error, ModuleKind::Git, name, &e.to_string());
                    return Err(e);
                }
                self.absorb(module, ModuleKind::Git, e, &mut warnings)?;
            }
        }

        let deployer = ConfigDeployer::new(&self.ctx.paths, self.preservation, log)
            .with_restore_prompt(&self.ctx.ui, settings.preservation_timeout());
        let deployed = deployer.deploy(&module.configs);
        for e in deployed.failures {
            self.absorb(module, ModuleKind::File, e, &mut warnings)?;
        }

        if let Err(e) = commands::run_commands(self.collab.runner.as_ref(), log, name, &module.commands) {
            self.absorb(module, ModuleKind::System, e, &mut warnings)?;
        }

        let status = if warnings.is_empty() {
            log.report(Status::Success, kind, name, &module.end);
            ModuleStatus::Completed
        } else {
            log.report(
                Status::Warning,
                kind,
                name,
                &format!("{} ({} warning(s))", module.end, warnings.len()),
            );
            ModuleStatus::CompletedWithWarnings
        };

        Ok(ModuleOutcome {
            name: name.to_string(),
            status,
            warnings,
        })
    }

    /// Record a step failure, or escalate it for a critical module.
    fn absorb(
        &self,
        module: &Module,
        step: ModuleKind,
        err: InstallerError,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        let log = &self.ctx.log;
        let name = module.full_name.as_str();
        if module.critical {
            log.report(Status::Error, step, name, &format!("Critical step failed: {}", err));
            return Err(InstallerError::controller_fatal(
                STAGE,
                format!("critical module {} failed: {}", name, err),
            ));
        }
        log.report(Status::Warning, step, name, &format!("Non-critical failure: {}", err));
        warnings.push(err.to_string());
        Ok(())
    }
}
