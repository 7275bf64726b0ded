//! System collaborators
//!
//! Whole-system operations the controller drives between and after module
//! runs: database sync, full upgrade, boot screen, Secure Boot and reboot.
//! They sit behind [`SystemServices`] so controller tests never touch the
//! machine.

use crate::command_runner::CommandRunner;
use crate::logger::InstallLog;
use crate::package_manager;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Packages whose upgrade calls for a reboot
pub const KERNEL_PACKAGES: &[&str] = &["linux", "linux-lts", "linux-zen", "linux-hardened"];

const EFI_DIR: &str = "/sys/firmware/efi";
const SECURE_BOOT_EFIVAR: &str =
    "/sys/firmware/efi/efivars/SecureBoot-8be4df61-93ca-11d2-aa0d-00e098032b8c";

/// What a full upgrade did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpgradeOutcome {
    pub kernel_upgraded: bool,
}

/// Firmware and disk facts behind the Secure Boot recommendation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecureBootStatus {
    pub enabled: bool,
    /// UEFI firmware present
    pub supported: bool,
    /// A LUKS volume is configured or active
    pub luks: bool,
}

impl SecureBootStatus {
    /// Supported, not enabled, and protecting an encrypted disk.
    pub fn is_recommended(&self) -> bool {
        self.supported && !self.enabled && self.luks
    }
}

pub trait SystemServices: Send + Sync {
    /// Sync package databases; failure is fatal to the run.
    fn sync_databases(&self, log: &InstallLog) -> Result<()>;

    /// Upgrade every installed package.
    fn full_upgrade(&self, log: &InstallLog) -> Result<UpgradeOutcome>;

    fn install_boot_screen(&self, log: &InstallLog) -> Result<()>;

    fn secure_boot_status(&self) -> Result<SecureBootStatus>;

    /// Create and enroll Secure Boot keys.
    fn setup_secure_boot(&self, log: &InstallLog) -> Result<()>;

    fn reboot(&self) -> Result<()>;
}

/// The real Arch Linux machine.
pub struct ArchSystem {
    runner: Arc<dyn CommandRunner>,
    boot_screen_command: String,
}

impl ArchSystem {
    pub fn new(runner: Arc<dyn CommandRunner>, boot_screen_command: String) -> Self {
        Self {
            runner,
            boot_screen_command,
        }
    }

    fn pacman_upgrade(&self) -> Result<()> {
        self.runner
            .run("sudo", &["pacman", "-Su", "--noconfirm"])?
            .ensure_success("pacman -Su")
    }

    fn kernel_upgrade_pending(&self, log: &InstallLog) -> bool {
        match self.runner.run("pacman", &["-Qu"]) {
            Ok(out) => pending_kernel_upgrade(&out.stdout),
            Err(e) => {
                log.warning(format!("Could not check for kernel upgrades: {:#}", e));
                false
            }
        }
    }

    fn luks_in_use(&self) -> bool {
        let cmdline = fs::read_to_string("/proc/cmdline").unwrap_or_default();
        if cmdline_has_luks(&cmdline) {
            return true;
        }
        let crypttab = fs::read_to_string("/etc/crypttab").unwrap_or_default();
        if crypttab_has_entries(&crypttab) {
            return true;
        }
        match self
            .runner
            .run("lsblk", &["-f", "-o", "NAME,FSTYPE", "--noheadings"])
        {
            Ok(out) if out.success => out.stdout.contains("crypto_LUKS"),
            _ => false,
        }
    }
}

impl SystemServices for ArchSystem {
    fn sync_databases(&self, log: &InstallLog) -> Result<()> {
        package_manager::sync_databases(self.runner.as_ref(), log)
    }

    fn full_upgrade(&self, log: &InstallLog) -> Result<UpgradeOutcome> {
        self.runner
            .run("sudo", &["pacman", "-Sy", "--noconfirm"])?
            .ensure_success("pacman -Sy")
            .context("Package database update failed")?;

        let kernel_upgraded = self.kernel_upgrade_pending(log);
        if kernel_upgraded {
            log.info("Linux kernel will be upgraded, a reboot will be recommended");
        }

        if let Err(first) = self.pacman_upgrade() {
            log.warning(format!("Upgrade failed ({:#}), removing partial downloads and retrying", first));
            if let Err(e) = self
                .runner
                .run("sudo", &["sh", "-c", "rm -f /var/cache/pacman/pkg/*.part"])
            {
                debug!("partial download cleanup failed: {:#}", e);
            }
            self.pacman_upgrade()
                .context("Official package upgrade failed after retry")?;
        }
        log.success("Official packages upgraded");

        match self.runner.run("yay", &["-Syu", "--noconfirm"]) {
            Ok(out) if out.success => log.success("AUR packages upgraded"),
            Ok(out) => log.warning(format!(
                "AUR upgrade failed, run 'yay -Syu' later: {}",
                out.stderr.trim()
            )),
            Err(e) => log.warning(format!("AUR upgrade skipped: {:#}", e)),
        }

        Ok(UpgradeOutcome { kernel_upgraded })
    }

    fn install_boot_screen(&self, log: &InstallLog) -> Result<()> {
        log.info("Installing boot screen");
        self.runner
            .run_shell(&self.boot_screen_command)?
            .ensure_success("boot screen install")
    }

    fn secure_boot_status(&self) -> Result<SecureBootStatus> {
        if !Path::new(EFI_DIR).exists() {
            info!("Legacy BIOS system, Secure Boot not supported");
            return Ok(SecureBootStatus::default());
        }

        let enabled = match self.runner.run("bootctl", &["status"]) {
            Ok(out) if out.success => bootctl_reports_enabled(&out.stdout),
            _ => {
                warn!("bootctl status unavailable, reading the SecureBoot efivar");
                fs::read(SECURE_BOOT_EFIVAR)
                    .map(|data| efivar_enabled(&data))
                    .unwrap_or(false)
            }
        };

        Ok(SecureBootStatus {
            enabled,
            supported: true,
            luks: self.luks_in_use(),
        })
    }

    fn setup_secure_boot(&self, log: &InstallLog) -> Result<()> {
        let steps: &[(&str, &[&str])] = &[
            ("sbctl install", &["pacman", "-S", "--noconfirm", "--needed", "sbctl"]),
            ("sbctl create-keys", &["sbctl", "create-keys"]),
            ("sbctl enroll-keys", &["sbctl", "enroll-keys", "--microsoft"]),
            ("sbctl sign-all", &["sbctl", "sign-all"]),
        ];
        for (label, args) in steps {
            log.info(format!("Secure Boot: {}", label));
            self.runner.run("sudo", args)?.ensure_success(label)?;
        }
        log.success("Secure Boot keys enrolled; enable Secure Boot in the firmware after reboot");
        Ok(())
    }

    fn reboot(&self) -> Result<()> {
        self.runner
            .run("systemctl", &["reboot"])?
            .ensure_success("systemctl reboot")
    }
}

/// Whether `pacman -Qu` output lists a kernel package.
pub fn pending_kernel_upgrade(qu_output: &str) -> bool {
    qu_output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| KERNEL_PACKAGES.contains(&name))
}

fn bootctl_reports_enabled(output: &str) -> bool {
    output
        .lines()
        .any(|l| l.trim_start().starts_with("Secure Boot:") && l.contains("enabled"))
        && !output.contains("Secure Boot: disabled")
}

/// EFI variable layout: four attribute bytes, then the value.
fn efivar_enabled(data: &[u8]) -> bool {
    data.get(4) == Some(&1)
}

fn cmdline_has_luks(cmdline: &str) -> bool {
    cmdline
        .split_whitespace()
        .any(|arg| arg.starts_with("cryptdevice=") || arg.starts_with("rd.luks"))
}

fn crypttab_has_entries(crypttab: &str) -> bool {
    crypttab
        .lines()
        .map(str::trim)
        .any(|l| !l.is_empty() && !l.starts_with('#'))
}
