//! Command safety validation
//!
//! Scans every manifest command against a deny-list before anything runs.
//! This is gatekeeping over the manifest text only; nothing here is
//! consulted during execution.
//!
//! # Rules
//!
//! | Rule | Result |
//! |------|--------|
//! | Dangerous pattern match | Rejected |
//! | Suspicious pattern match | Rejected only for home root, `/home`, `/var/lib` |
//! | `rm -rf` of `/`, a root-level directory, `/var/lib/...` or a home root | Rejected |
//! | `rm -rf` of `/tmp` or a deeper path | Allowed |
//! | `pacman -R` with cascade | Rejected |

use crate::error::DangerousCommandError;
use crate::manifest::Manifest;
use regex::Regex;
use std::sync::OnceLock;

const DANGEROUS_PATTERNS: &[&str] = &[
    r"rm\s+-rf\s+/(\*|\s|$)",
    r"rm\s+-rf\s+/(bin|boot|dev|etc|lib|lib64|proc|sbin|sys|usr|var)/?(\*|\s|$)",
    r">\s*/dev/sd[a-z]",
    r"dd\s+.*of=/dev/",
    r"chmod\s+(-\w+\s+)*0?777",
    r"\$\(.*curl.*\|.*sh\)",
    r"(curl|wget)\s.*\|\s*(sudo\s+)?(ba)?sh\b",
    r"\bmkfs",
    r"fdisk\s+",
    r"parted\s+",
    r"wipefs\s+",
];

const SUSPICIOUS_PATTERNS: &[&str] = &[
    r"rm\s+-rf\s+~",
    r"rm\s+-rf\s+\$HOME",
    r"rm\s+-rf\s+/tmp",
    r"rm\s+-rf\s+/var/cache",
    r"rm\s+-rf\s+/home",
    r"rm\s+-rf\s+/var/lib",
    r"sudo\s+systemctl\s+stop",
];

/// Targets that turn a suspicious command into a rejected one.
const HIGH_IMPACT_TARGET: &str = r"rm\s+-rf\s+(~|\$HOME|/home|/var/lib)(/\*?)?(\s|$)";

/// Root-level directories that may be removed recursively.
const REMOVABLE_ROOT_DIRS: &[&str] = &["tmp"];

struct Rules {
    dangerous: Vec<(Regex, &'static str)>,
    suspicious: Vec<Regex>,
    high_impact: Regex,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| Rules {
        dangerous: DANGEROUS_PATTERNS
            .iter()
            .map(|p| (Regex::new(p).expect("valid dangerous pattern"), *p))
            .collect(),
        suspicious: SUSPICIOUS_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("valid suspicious pattern"))
            .collect(),
        high_impact: Regex::new(HIGH_IMPACT_TARGET).expect("valid target pattern"),
    })
}

/// Return the matched rule name if `command` should be rejected.
pub fn check_command(command: &str) -> Option<String> {
    let rules = rules();

    for (re, pattern) in &rules.dangerous {
        if re.is_match(command) {
            return Some((*pattern).to_string());
        }
    }

    if rules.suspicious.iter().any(|re| re.is_match(command))
        && rules.high_impact.is_match(command)
    {
        return Some("rm -rf of a user or system data root".to_string());
    }

    if let Some(target) = critical_rm_target(command) {
        return Some(format!("rm -rf {}", target));
    }

    if is_cascading_remove(command) {
        return Some("pacman -R --cascade".to_string());
    }

    None
}

/// Check a single module's commands.
pub fn validate_commands(module: &str, commands: &[String]) -> Result<(), DangerousCommandError> {
    for (i, command) in commands.iter().enumerate() {
        if let Some(pattern) = check_command(command) {
            return Err(DangerousCommandError {
                module: module.to_string(),
                index: i + 1,
                pattern,
                command: command.clone(),
            });
        }
    }
    Ok(())
}

/// Every finding across the manifest, in manifest order.
pub fn scan_manifest(manifest: &Manifest) -> Vec<DangerousCommandError> {
    manifest
        .modules()
        .flat_map(|m| {
            m.commands.iter().enumerate().filter_map(move |(i, command)| {
                check_command(command).map(|pattern| DangerousCommandError {
                    module: m.full_name.clone(),
                    index: i + 1,
                    pattern,
                    command: command.clone(),
                })
            })
        })
        .collect()
}

/// Fail on the first dangerous command in the manifest.
pub fn validate_all_commands(manifest: &Manifest) -> Result<(), DangerousCommandError> {
    match scan_manifest(manifest).into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn critical_rm_target(command: &str) -> Option<String> {
    let words: Vec<&str> = command.split_whitespace().collect();
    let rm_at = words.iter().position(|w| *w == "rm")?;
    let args = &words[rm_at + 1..];

    let recursive_force = args.iter().any(|a| {
        a.starts_with('-') && !a.starts_with("--") && a.contains('r') && a.contains('f')
    }) || (args.contains(&"-r") && args.contains(&"-f"))
        || (args.contains(&"--recursive") && args.contains(&"--force"));
    if !recursive_force {
        return None;
    }

    args.iter()
        .filter(|a| !a.starts_with('-'))
        .find(|a| is_critical_target(a))
        .map(|a| a.to_string())
}

/// Whether removing `target` recursively would take out a whole system or
/// user data root.
///
/// Critical: `/`, any root-level directory except [`REMOVABLE_ROOT_DIRS`],
/// anything under `/var/lib`, the home root and a user's home under
/// `/home`. A trailing `/` or `/*` does not change the verdict.
fn is_critical_target(target: &str) -> bool {
    let trimmed = target.trim_end_matches('*').trim_end_matches('/');

    for home in ["~", "$HOME", "${HOME}"] {
        if trimmed == home {
            return true;
        }
    }

    if !target.starts_with('/') {
        return false;
    }
    let path = trimmed.trim_start_matches('/');
    if path.is_empty() {
        return true;
    }

    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        [dir] => !REMOVABLE_ROOT_DIRS.contains(dir),
        ["var", "lib", ..] => true,
        ["home", _user] => true,
        _ => false,
    }
}

fn is_cascading_remove(command: &str) -> bool {
    let words: Vec<&str> = command.split_whitespace().collect();
    let Some(at) = words.iter().position(|w| *w == "pacman") else {
        return false;
    };
    let args = &words[at + 1..];

    let removes = args
        .iter()
        .any(|a| *a == "--remove" || (a.starts_with("-R") && !a.starts_with("--")));
    if !removes {
        return false;
    }

    args.iter().any(|a| {
        *a == "--cascade" || (a.starts_with('-') && !a.starts_with("--") && a.contains('c'))
    })
}
