//! Git identity setup
//!
//! Runs for the identity module only. The existing global identity is
//! offered for reuse; otherwise the user is asked for a name and an email.
//! Every prompt is bounded by the credential timeout, and a timeout is fatal
//! for the module.

use crate::command_runner::CommandRunner;
use crate::coordinator::{Prompt, UiHandle};
use crate::error::{CoordinatorError, InstallerError};
use crate::logger::{InstallLog, Status};
use crate::manifest::ModuleKind;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

/// Global git settings applied after the identity.
pub const GIT_DEFAULTS: &[(&str, &str)] = &[
    ("alias.co", "checkout"),
    ("alias.br", "branch"),
    ("alias.ci", "commit"),
    ("alias.st", "status"),
    ("pull.rebase", "true"),
    ("init.defaultBranch", "master"),
];

const REPORT_NAME: &str = "Git Setup";

/// A git user name and email; either may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub email: String,
}

impl Identity {
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.email.is_empty()
    }
}

pub struct CredentialProvider<'a> {
    runner: &'a dyn CommandRunner,
    ui: &'a UiHandle,
    log: &'a InstallLog,
    timeout: Duration,
}

impl<'a> CredentialProvider<'a> {
    pub fn new(runner: &'a dyn CommandRunner, ui: &'a UiHandle, log: &'a InstallLog, timeout: Duration) -> Self {
        Self {
            runner,
            ui,
            log,
            timeout,
        }
    }

    /// Choose, persist and apply the git identity.
    ///
    /// # Errors
    ///
    /// [`InstallerError::CredentialTimeout`] if a prompt goes unanswered,
    /// [`InstallerError::CommandExec`] if git rejects the identity.
    pub fn configure(&self, user_env: &Path) -> Result<Identity, InstallerError> {
        self.log
            .report(Status::Progress, ModuleKind::Git, REPORT_NAME, "Checking credentials");

        let identity = self.choose_identity()?;

        if let Err(e) = save_identity(user_env, &identity) {
            self.log
                .warning(format!("Failed to save git credentials to {}: {}", user_env.display(), e));
        }

        if !identity.username.is_empty() {
            self.set_global("user.name", &identity.username)?;
            self.log.report(
                Status::Success,
                ModuleKind::Git,
                "Git Identity",
                &format!("User name set to: {}", identity.username),
            );
        }
        if !identity.email.is_empty() {
            self.set_global("user.email", &identity.email)?;
            self.log.report(
                Status::Success,
                ModuleKind::Git,
                "Git Identity",
                &format!("User email set to: {}", identity.email),
            );
        }

        self.log
            .report(Status::Progress, ModuleKind::Git, "Git Aliases", "Setting aliases");
        for (key, value) in GIT_DEFAULTS {
            if let Err(e) = self.set_global(key, value) {
                self.log.warning(format!("Failed to set {}: {}", key, e));
            }
        }

        self.log
            .report(Status::Success, ModuleKind::Git, REPORT_NAME, "Complete");
        Ok(identity)
    }

    /// The existing identity if the user keeps it, otherwise a new one.
    pub fn choose_identity(&self) -> Result<Identity, InstallerError> {
        let existing = self.existing_identity();

        if !existing.is_empty() {
            self.log.report(
                Status::Complete,
                ModuleKind::Git,
                "Git Found",
                "Found existing git credentials",
            );
            let reuse = self
                .ui
                .confirm(
                    Prompt::CredentialReuse {
                        username: existing.username.clone(),
                        email: existing.email.clone(),
                    },
                    self.timeout,
                )
                .map_err(timeout_error)?;
            if reuse {
                self.log.report(
                    Status::Success,
                    ModuleKind::Git,
                    REPORT_NAME,
                    "Using existing credentials",
                );
                return Ok(existing);
            }
            self.log
                .report(Status::Info, ModuleKind::Git, REPORT_NAME, "Setting up new credentials");
        } else {
            self.log.report(
                Status::Info,
                ModuleKind::Git,
                REPORT_NAME,
                "No credentials found, setting up",
            );
        }

        let username = self.ui.input(Prompt::Username, self.timeout).map_err(timeout_error)?;
        let email = self.ui.input(Prompt::Email, self.timeout).map_err(timeout_error)?;
        Ok(Identity { username, email })
    }

    /// Current global `user.name` / `user.email`; unreadable values are empty.
    pub fn existing_identity(&self) -> Identity {
        Identity {
            username: self.get_global("user.name"),
            email: self.get_global("user.email"),
        }
    }

    fn get_global(&self, key: &str) -> String {
        match self.runner.run("git", &["config", "--global", "--get", key]) {
            Ok(out) if out.success => out.stdout.trim().to_string(),
            _ => String::new(),
        }
    }

    fn set_global(&self, key: &str, value: &str) -> Result<(), InstallerError> {
        self.runner
            .run("git", &["config", "--global", key, value])
            .and_then(|out| out.ensure_success(&format!("git config {}", key)))
            .map_err(|e| InstallerError::command_exec(format!("{:#}", e)))
    }
}

fn timeout_error(err: CoordinatorError) -> InstallerError {
    InstallerError::credential_timeout(err.to_string())
}

/// Write `GIT_USERNAME=` / `GIT_EMAIL=` into `path`, replacing existing
/// lines and keeping everything else.
pub fn save_identity(path: &Path, identity: &Identity) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let existing = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };

    let username_line = format!("GIT_USERNAME={}", identity.username);
    let email_line = format!("GIT_EMAIL={}", identity.email);
    let mut lines: Vec<String> = existing.lines().map(str::to_string).collect();

    let (mut has_username, mut has_email) = (false, false);
    for line in lines.iter_mut() {
        if line.starts_with("GIT_USERNAME=") {
            *line = username_line.clone();
            has_username = true;
        } else if line.starts_with("GIT_EMAIL=") {
            *line = email_line.clone();
            has_email = true;
        }
    }
    if !has_username {
        lines.push(username_line);
    }
    if !has_email {
        lines.push(email_line);
    }

    let mut text = lines.join("\n");
    text.push('\n');
    fs::write(path, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_identity_creates_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("archriot/user.env");
        save_identity(
            &path,
            &Identity {
                username: "riot".into(),
                email: "riot@example.com".into(),
            },
        )
        .expect("save");
        assert_eq!(
            fs::read_to_string(&path).expect("read"),
            "GIT_USERNAME=riot\nGIT_EMAIL=riot@example.com\n"
        );
    }

    #[test]
    fn test_save_identity_updates_in_place() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("user.env");
        fs::write(&path, "THEME=riot\nGIT_USERNAME=old\nEDITOR=nvim\n").expect("write");

        save_identity(
            &path,
            &Identity {
                username: "new".into(),
                email: String::new(),
            },
        )
        .expect("save");
        assert_eq!(
            fs::read_to_string(&path).expect("read"),
            "THEME=riot\nGIT_USERNAME=new\nEDITOR=nvim\nGIT_EMAIL=\n"
        );
    }

    #[test]
    fn test_save_identity_twice_is_stable() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("user.env");
        fs::write(&path, "THEME=riot").expect("write");
        let identity = Identity {
            username: "riot".into(),
            email: "riot@example.com".into(),
        };

        save_identity(&path, &identity).expect("first save");
        let first = fs::read_to_string(&path).expect("read");
        save_identity(&path, &identity).expect("second save");
        let second = fs::read_to_string(&path).expect("read");

        assert_eq!(first, "THEME=riot\nGIT_USERNAME=riot\nGIT_EMAIL=riot@example.com\n");
        assert_eq!(first, second);
        assert!(!second.lines().any(str::is_empty));
    }

    #[test]
    fn test_identity_empty() {
        assert!(Identity::default().is_empty());
        assert!(!Identity {
            username: String::new(),
            email: "a@b.c".into()
        }
        .is_empty());
    }
}
