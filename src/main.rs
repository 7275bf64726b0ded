//! riotinstall - Main entry point
//!
//! Parses the command line, sets up diagnostics and signal handling, then
//! either prints a validate report or runs the installer with the TUI or the
//! headless responder in front of it.

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use ratatui::{backend::CrosstermBackend, Terminal};
use riotinstall::app::App;
use riotinstall::cli::{Cli, Commands, InstallArgs};
use riotinstall::context::{Collaborators, InstallContext, InstallPaths};
use riotinstall::coordinator::{self, UiMessage};
use riotinstall::headless::HeadlessResponder;
use riotinstall::logger::{self, GlyphStyle, InstallLog, TraceTarget};
use riotinstall::orchestrator::{Controller, RunOutcome};
use riotinstall::process_guard::{self, ProcessGuard};
use riotinstall::settings::InstallerSettings;
use riotinstall::validation;
use std::io::{self, stdout};
use std::process::ExitCode;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match cli.command_or_default() {
        Commands::Validate { manifest } => {
            init_tracing(TraceTarget::Stderr, None);
            let paths = match InstallPaths::discover() {
                Ok(paths) => paths,
                Err(e) => {
                    eprintln!("{:#}", e);
                    return ExitCode::FAILURE;
                }
            };
            let report = validation::check_manifest(manifest.as_deref(), &paths.manifest_candidates);
            print!("{}", report.render(GlyphStyle::detect(false)));
            if report.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Commands::Install(args) => match run_install(args) {
            Ok(outcome) => exit_code(outcome.as_ref()),
            Err(e) => {
                error!("Installer failed to start: {:#}", e);
                eprintln!("✗ {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

fn init_tracing(target: TraceTarget<'_>, fallback: Option<&str>) {
    if let Err(e) = logger::init_tracing(target) {
        eprintln!("{}: {}", fallback.unwrap_or("Diagnostics disabled"), e);
    }
}

/// Build the context, start the worker and drive the chosen front end.
fn run_install(args: InstallArgs) -> anyhow::Result<Option<RunOutcome>> {
    let paths = InstallPaths::discover()?;

    if args.headless {
        init_tracing(TraceTarget::Stderr, None);
    } else {
        let debug_log = paths.cache_dir.join("debug.log");
        init_tracing(TraceTarget::File(&debug_log), Some("Debug log unavailable"));
    }
    info!("riotinstall {} starting", env!("CARGO_PKG_VERSION"));

    let settings = InstallerSettings::resolve(args.settings.as_deref(), &paths.settings_file)?;
    let glyphs = GlyphStyle::detect(args.ascii || settings.ascii_only);

    let (ui, rx) = coordinator::channel();
    let log = match InstallLog::open(&paths.cache_dir, glyphs, ui.clone()) {
        Ok(log) => log,
        Err(e) => {
            warn!("Install log unavailable, logging to the UI only: {}", e);
            InstallLog::ui_only(glyphs, ui.clone())
        }
    };

    // Children are stopped when this drops, on every exit path
    let _guard = ProcessGuard::new();

    let collab = Collaborators::arch(&settings);
    let ctx = InstallContext::new(paths, settings, log, ui);
    let worker = spawn_worker(ctx, collab, args.manifest.clone())?;

    if args.headless {
        run_headless(rx, worker).map(Some)
    } else {
        run_tui(rx, worker)
    }
}

fn spawn_worker(
    ctx: InstallContext,
    collab: Collaborators,
    manifest: Option<std::path::PathBuf>,
) -> io::Result<JoinHandle<RunOutcome>> {
    thread::Builder::new().name("install-worker".into()).spawn(move || {
        let mut controller = Controller::new(&ctx, collab);
        if let Some(path) = manifest {
            controller = controller.with_manifest(path);
        }
        let outcome = controller.run();
        if let Some(path) = ctx.log.path() {
            info!("Install log: {}", path.display());
        }
        outcome
    })
}

fn run_headless(rx: Receiver<UiMessage>, worker: JoinHandle<RunOutcome>) -> anyhow::Result<RunOutcome> {
    if let Err(e) = process_guard::init_signal_handlers(|| {}) {
        warn!("Failed to install signal handlers: {}", e);
    }

    let stdin = io::stdin();
    let summary = HeadlessResponder::new(stdin.lock(), stdout()).run(rx)?;
    info!("Headless run answered {} prompt(s)", summary.answered);

    worker
        .join()
        .map_err(|_| anyhow::anyhow!("install worker panicked"))
}

fn run_tui(rx: Receiver<UiMessage>, worker: JoinHandle<RunOutcome>) -> anyhow::Result<Option<RunOutcome>> {
    if let Err(e) = process_guard::init_signal_handlers(restore_terminal) {
        warn!("Failed to install signal handlers: {}", e);
    }

    enable_raw_mode()?;
    if let Err(e) = crossterm::execute!(stdout(), crossterm::terminal::EnterAlternateScreen) {
        restore_terminal();
        return Err(e.into());
    }

    let result = Terminal::new(CrosstermBackend::new(stdout()))
        .map_err(anyhow::Error::from)
        .and_then(|mut terminal| App::new(rx, worker).run(&mut terminal));

    // Always attempt cleanup, even if the app failed
    restore_terminal();
    result
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = crossterm::execute!(stdout(), crossterm::terminal::LeaveAlternateScreen);
}

fn exit_code(outcome: Option<&RunOutcome>) -> ExitCode {
    match outcome {
        Some(RunOutcome::Completed { .. }) | Some(RunOutcome::Cancelled) => ExitCode::SUCCESS,
        Some(RunOutcome::Failed { message }) | Some(RunOutcome::Exited { message }) => {
            eprintln!("✗ Installation failed: {}", message);
            ExitCode::FAILURE
        }
        // Quit while the worker was still running
        None => ExitCode::from(130),
    }
}
