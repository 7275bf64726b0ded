//! Child process lifecycle
//!
//! Package managers and module commands can run for minutes. If the
//! installer is killed or the user quits mid-run, those children must not
//! keep going on their own.
//!
//! - Each child is spawned as the leader of a new process group with a
//!   parent-death signal ([`CommandProcessGroup`])
//! - Its PID sits in a global [`ChildRegistry`] while it runs
//! - SIGINT/SIGTERM/SIGHUP, or dropping the [`ProcessGuard`], signals every
//!   registered group: SIGTERM, a grace period, then SIGKILL
//!
//! Modules already applied stay applied; there is no rollback.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Grace period used when the guard is dropped on a normal exit path.
pub const DROP_GRACE: Duration = Duration::from_secs(5);

/// Grace period used from the signal handler.
pub const SIGNAL_GRACE: Duration = Duration::from_secs(3);

/// PIDs of running children, each the leader of its own process group.
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
    terminating: bool,
}

impl ChildRegistry {
    /// Shared process-wide registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        debug!("Tracking child PID {}", pid);
    }

    pub fn unregister(&mut self, pid: u32) {
        if self.pids.remove(&pid) {
            debug!("Child PID {} finished", pid);
        }
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    /// True once [`terminate_all`](Self::terminate_all) has run
    pub fn is_terminating(&self) -> bool {
        self.terminating
    }

    /// Signal every tracked process group: SIGTERM, wait up to `grace`,
    /// then SIGKILL whatever is left. Runs at most once per registry.
    pub fn terminate_all(&mut self, grace: Duration) {
        if self.terminating {
            debug!("Child termination already in progress");
            return;
        }
        self.terminating = true;

        if self.pids.is_empty() {
            return;
        }

        let targets: Vec<u32> = self.pids.iter().copied().collect();
        info!("Stopping {} running command(s)", targets.len());

        for &pid in &targets {
            signal_group_or_pid(pid, Signal::SIGTERM);
        }

        let started = Instant::now();
        while started.elapsed() < grace {
            if !targets.iter().any(|&pid| is_process_alive(pid)) {
                info!("All commands stopped");
                self.pids.clear();
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in &targets {
            if is_process_alive(pid) {
                warn!("Process group {} ignored SIGTERM, sending SIGKILL", pid);
                signal_group_or_pid(pid, Signal::SIGKILL);
            }
        }
        self.pids.clear();
    }
}

/// Register `pid` in the global registry, tolerating a poisoned lock.
pub fn track_child(pid: u32) {
    let registry = ChildRegistry::global();
    let mut guard = registry.lock().unwrap_or_else(|e| e.into_inner());
    guard.register(pid);
}

/// Remove `pid` from the global registry, tolerating a poisoned lock.
pub fn untrack_child(pid: u32) {
    let registry = ChildRegistry::global();
    let mut guard = registry.lock().unwrap_or_else(|e| e.into_inner());
    guard.unregister(pid);
}

fn signal_group_or_pid(pid: u32, sig: Signal) {
    if let Err(e) = signal::kill(Pid::from_raw(-(pid as i32)), sig) {
        debug!("Group signal {} to {} failed ({}), signalling PID", sig, pid, e);
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), sig) {
            warn!("Could not send {} to PID {}: {}", sig, pid, e);
        }
    }
}

/// Alive means present and not a zombie.
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // state is the field after the parenthesised command name
        Ok(stat) => match stat.rsplit_once(')') {
            Some((_, rest)) => !matches!(rest.split_whitespace().next(), Some("Z" | "X")),
            None => true,
        },
        Err(_) => true,
    }
}

/// Terminates every registered child when dropped.
///
/// `main` holds one for the lifetime of the process.
pub struct ProcessGuard {
    registry: Arc<Mutex<ChildRegistry>>,
}

impl ProcessGuard {
    pub fn new() -> Self {
        Self {
            registry: ChildRegistry::global(),
        }
    }
}

impl Default for ProcessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.terminate_all(DROP_GRACE);
        }
    }
}

/// Install SIGINT/SIGTERM/SIGHUP handlers. Call once at startup.
///
/// `on_signal` runs before children are stopped; `main` uses it to restore
/// the terminal. The process then exits with `128 + signal`.
pub fn init_signal_handlers<F>(on_signal: F) -> std::io::Result<()>
where
    F: Fn() + Send + 'static,
{
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::Builder::new()
        .name("signal-watch".into())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("Received signal {}, stopping running commands", sig);
                on_signal();
                if let Ok(mut registry) = ChildRegistry::global().lock() {
                    registry.terminate_all(SIGNAL_GRACE);
                }
                std::process::exit(128 + sig);
            }
        })?;

    Ok(())
}

/// Spawn a [`std::process::Command`] as a new process group leader.
pub trait CommandProcessGroup {
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: the closure only calls async-signal-safe setpgid and prctl
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}
