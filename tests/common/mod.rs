//! Shared fakes for the integration tests
//!
//! Nothing here spawns a real process: commands, package managers and the
//! system collaborator are recorded in memory, and a responder thread plays
//! the UI side of the coordinator channel.

#![allow(dead_code)]

use anyhow::{Result, bail};
use riotinstall::command_runner::{CommandOutput, CommandRunner};
use riotinstall::context::{Collaborators, InstallContext, InstallPaths};
use riotinstall::coordinator::{self, Answer, Prompt, UiEvent, UiMessage};
use riotinstall::logger::{GlyphStyle, InstallLog};
use riotinstall::package_manager::PackageBackend;
use riotinstall::settings::InstallerSettings;
use riotinstall::system::{SecureBootStatus, SystemServices, UpgradeOutcome};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tempfile::TempDir;

// =============================================================================
// Command runner
// =============================================================================

/// Records every call; fails or answers calls matching a substring.
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
    outputs: Mutex<Vec<(String, String)>>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Calls containing `pattern` exit 1
    pub fn fail_on(&self, pattern: &str) {
        self.failures.lock().unwrap().push(pattern.to_string());
    }

    /// Calls containing `pattern` succeed with `stdout`
    pub fn respond(&self, pattern: &str, stdout: &str) {
        self.outputs
            .lock()
            .unwrap()
            .push((pattern.to_string(), stdout.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Command lines run through `sh -c`
    pub fn shell_commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("sh -c ").map(str::to_string))
            .collect()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let line = format!("{} {}", program, args.join(" "));
        self.calls.lock().unwrap().push(line.clone());

        if self.failures.lock().unwrap().iter().any(|p| line.contains(p)) {
            return Ok(CommandOutput::failed(1, "simulated failure"));
        }
        let outputs = self.outputs.lock().unwrap();
        match outputs.iter().find(|(p, _)| line.contains(p)) {
            Some((_, stdout)) => Ok(CommandOutput::ok(stdout.clone())),
            None => Ok(CommandOutput::ok("")),
        }
    }
}

// =============================================================================
// Package backends
// =============================================================================

/// Installed packages, shared by both fake backends
pub type PackageDb = Arc<Mutex<BTreeSet<String>>>;

pub struct FakeBackend {
    name: &'static str,
    db: PackageDb,
    failing: bool,
    /// Reported as installed by `install` but never added to the db
    skipped: Vec<String>,
    installs: Mutex<Vec<Vec<String>>>,
}

impl FakeBackend {
    pub fn new(name: &'static str, db: PackageDb) -> Self {
        Self {
            name,
            db,
            failing: false,
            skipped: Vec::new(),
            installs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn skipping(mut self, packages: &[&str]) -> Self {
        self.skipped = packages.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn install_calls(&self) -> Vec<Vec<String>> {
        self.installs.lock().unwrap().clone()
    }
}

impl PackageBackend for FakeBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn is_installed(&self, package: &str) -> Result<bool> {
        Ok(self.db.lock().unwrap().contains(package))
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        self.installs.lock().unwrap().push(packages.to_vec());
        if self.failing {
            bail!("target not found: {}", packages.join(" "));
        }
        let mut db = self.db.lock().unwrap();
        for package in packages {
            if !self.skipped.contains(package) {
                db.insert(package.clone());
            }
        }
        Ok(())
    }

    fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// System collaborator
// =============================================================================

#[derive(Default)]
pub struct FakeSystem {
    /// Number of sync calls that fail before syncs succeed
    sync_failures: Mutex<u32>,
    pub kernel_upgrade: bool,
    pub upgrade_fails: bool,
    pub boot_screen_fails: bool,
    pub secure_boot: SecureBootStatus,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeSystem {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn with_kernel_upgrade(mut self) -> Self {
        self.kernel_upgrade = true;
        self
    }

    pub fn fail_upgrade(mut self) -> Self {
        self.upgrade_fails = true;
        self
    }

    pub fn fail_boot_screen(mut self) -> Self {
        self.boot_screen_fails = true;
        self
    }

    pub fn with_secure_boot(mut self, status: SecureBootStatus) -> Self {
        self.secure_boot = status;
        self
    }

    pub fn failing_syncs(self, count: u32) -> Self {
        *self.sync_failures.lock().unwrap() = count;
        self
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

impl SystemServices for FakeSystem {
    fn sync_databases(&self, _log: &InstallLog) -> Result<()> {
        self.record("sync");
        let mut remaining = self.sync_failures.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            bail!("pacman -Syy failed (exit code 1): could not resolve host");
        }
        Ok(())
    }

    fn full_upgrade(&self, _log: &InstallLog) -> Result<UpgradeOutcome> {
        self.record("upgrade");
        if self.upgrade_fails {
            bail!("pacman -Su failed (exit code 1): conflicting files");
        }
        Ok(UpgradeOutcome {
            kernel_upgraded: self.kernel_upgrade,
        })
    }

    fn install_boot_screen(&self, _log: &InstallLog) -> Result<()> {
        self.record("boot_screen");
        if self.boot_screen_fails {
            bail!("plymouth-set-default-theme failed (exit code 1): theme not found");
        }
        Ok(())
    }

    fn secure_boot_status(&self) -> Result<SecureBootStatus> {
        self.record("secure_boot_status");
        Ok(self.secure_boot)
    }

    fn setup_secure_boot(&self, _log: &InstallLog) -> Result<()> {
        self.record("secure_boot_setup");
        Ok(())
    }

    fn reboot(&self) -> Result<()> {
        self.record("reboot");
        Ok(())
    }
}

// =============================================================================
// UI responder
// =============================================================================

/// Everything the worker sent, in order
#[derive(Debug, Default)]
pub struct Transcript {
    pub prompts: Vec<Prompt>,
    pub events: Vec<UiEvent>,
}

impl Transcript {
    pub fn progress(&self) -> Vec<f64> {
        self.events
            .iter()
            .filter_map(|e| match e {
                UiEvent::Progress(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    pub fn log_text(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                UiEvent::Log(line) => Some(line.text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                UiEvent::Failure(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn asked(&self, matches: impl Fn(&Prompt) -> bool) -> bool {
        self.prompts.iter().any(matches)
    }
}

/// Answer every request with `answer` until the worker side hangs up.
pub fn spawn_responder<F>(rx: Receiver<UiMessage>, mut answer: F) -> JoinHandle<Transcript>
where
    F: FnMut(&Prompt) -> Answer + Send + 'static,
{
    spawn_script(rx, false, move |prompt| Some(answer(prompt)))
}

/// Like [`spawn_responder`], but `None` leaves the request unanswered.
///
/// An unanswered request is dropped, which the worker sees as a lost UI, or
/// with `hold` kept open until the worker's deadline passes.
pub fn spawn_script<F>(rx: Receiver<UiMessage>, hold: bool, mut answer: F) -> JoinHandle<Transcript>
where
    F: FnMut(&Prompt) -> Option<Answer> + Send + 'static,
{
    thread::spawn(move || {
        let mut transcript = Transcript::default();
        let mut held = Vec::new();
        for message in rx {
            match message {
                UiMessage::Event(event) => transcript.events.push(event),
                UiMessage::Request(request) => {
                    transcript.prompts.push(request.prompt.clone());
                    match answer(&request.prompt) {
                        Some(reply) => {
                            request.respond(reply);
                        }
                        None if hold => held.push(request),
                        None => {}
                    }
                }
            }
        }
        transcript
    })
}

/// Yes to everything except the optional upgrade and reboot.
pub fn default_answers(prompt: &Prompt) -> Answer {
    match prompt {
        Prompt::UpgradeConfirm | Prompt::Reboot { .. } => Answer::No,
        Prompt::Username => Answer::Text("riot".into()),
        Prompt::Email => Answer::Text("riot@example.com".into()),
        _ => Answer::Yes,
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub home: TempDir,
    pub ctx: InstallContext,
    pub runner: Arc<FakeRunner>,
    pub db: PackageDb,
    pub primary: Arc<FakeBackend>,
    pub fallback: Arc<FakeBackend>,
    pub system: Arc<FakeSystem>,
}

pub struct HarnessBuilder {
    primary_fails: bool,
    fallback_skips: Vec<&'static str>,
    installed: Vec<&'static str>,
    system: FakeSystem,
    settings: InstallerSettings,
    hold_unanswered: bool,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            primary_fails: false,
            fallback_skips: Vec::new(),
            installed: Vec::new(),
            system: FakeSystem::default(),
            settings: InstallerSettings {
                credential_timeout_secs: 5,
                confirm_timeout_secs: 5,
                preservation_timeout_secs: 5,
                fallback_attempts: 1,
                fallback_retry_delay_secs: 0,
                ..InstallerSettings::default()
            },
            hold_unanswered: false,
        }
    }
}

impl HarnessBuilder {
    pub fn primary_fails(mut self) -> Self {
        self.primary_fails = true;
        self
    }

    pub fn fallback_skips(mut self, packages: &[&'static str]) -> Self {
        self.fallback_skips = packages.to_vec();
        self
    }

    pub fn installed(mut self, packages: &[&'static str]) -> Self {
        self.installed = packages.to_vec();
        self
    }

    /// Confirmation wait, in seconds
    pub fn confirm_timeout(mut self, secs: u64) -> Self {
        self.settings.confirm_timeout_secs = secs;
        self
    }

    /// Keep unanswered requests open so the worker times out
    pub fn hold_unanswered(mut self) -> Self {
        self.hold_unanswered = true;
        self
    }

    pub fn system(mut self, system: FakeSystem) -> Self {
        self.system = system;
        self
    }

    pub fn build<F>(self, mut answer: F) -> (Harness, JoinHandle<Transcript>)
    where
        F: FnMut(&Prompt) -> Answer + Send + 'static,
    {
        self.build_script(move |prompt| Some(answer(prompt)))
    }

    pub fn build_script<F>(self, answer: F) -> (Harness, JoinHandle<Transcript>)
    where
        F: FnMut(&Prompt) -> Option<Answer> + Send + 'static,
    {
        let home = TempDir::new().unwrap();
        let paths = InstallPaths::from_home(home.path());

        let db: PackageDb = Arc::new(Mutex::new(
            self.installed.iter().map(|p| p.to_string()).collect(),
        ));
        let mut primary = FakeBackend::new("pacman", db.clone());
        if self.primary_fails {
            primary = primary.failing();
        }
        let fallback = FakeBackend::new("yay", db.clone()).skipping(&self.fallback_skips);

        let (ui, rx) = coordinator::channel();
        let log = InstallLog::ui_only(GlyphStyle::Ascii, ui.clone());
        let ctx = InstallContext::new(paths, self.settings, log, ui);
        let responder = spawn_script(rx, self.hold_unanswered, answer);

        let harness = Harness {
            home,
            ctx,
            runner: FakeRunner::new(),
            db,
            primary: Arc::new(primary),
            fallback: Arc::new(fallback),
            system: Arc::new(self.system),
        };
        (harness, responder)
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            runner: self.runner.clone(),
            primary: self.primary.clone(),
            fallback: self.fallback.clone(),
            system: self.system.clone(),
        }
    }

    /// Write `packages.yaml` at the first manifest search location.
    pub fn write_manifest(&self, text: &str) -> PathBuf {
        let path = self.ctx.paths.manifest_candidates[0].clone();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, text).unwrap();
        path
    }

    /// Write a file under the config source root.
    pub fn write_source(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.ctx.paths.config_source.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    /// Write a file under `~/.config`.
    pub fn write_config(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.ctx.paths.config_home.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn installed(&self) -> BTreeSet<String> {
        self.db.lock().unwrap().clone()
    }

    /// Hang up the worker side and collect what the UI saw.
    pub fn finish(self, responder: JoinHandle<Transcript>) -> (Transcript, TempDir) {
        let Harness { home, ctx, .. } = self;
        drop(ctx);
        (responder.join().unwrap(), home)
    }
}
