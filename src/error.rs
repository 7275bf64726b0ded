//! Error handling module for the installer
//!
//! Provides the error taxonomy used across the orchestration core. Errors
//! raised by manifest loading and validation are fatal before any stage
//! runs; errors raised inside a module are scoped to that module unless the
//! module is marked critical.

use std::path::PathBuf;
use thiserror::Error;

/// Manifest loading and structural validation failures
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No manifest exists at any search location
    #[error("packages.yaml not found (searched: {})", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    /// The manifest exists but could not be read
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid YAML for the module schema
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A module is missing a required field or carries an invalid value
    #[error("{0}")]
    Structural(String),
}

/// Dependency reference and ordering failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    /// A `depends` entry names a module that does not exist
    #[error("module {module} depends on non-existent module {dependency}")]
    Missing { module: String, dependency: String },

    /// The validator found a cycle reachable from `module`
    #[error("circular dependency detected involving module {module}")]
    Circular { module: String },

    /// The resolver could not order these modules
    #[error("circular dependency detected among modules: {}", .remaining.join(", "))]
    UnresolvableCycle { remaining: Vec<String> },
}

/// A module command matched the destructive-command deny-list
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("module {module} command {index} contains dangerous pattern '{pattern}': {command}")]
pub struct DangerousCommandError {
    pub module: String,
    pub index: usize,
    pub pattern: String,
    pub command: String,
}

/// Failures of a blocking UI exchange
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// No answer arrived before the deadline
    #[error("timed out after {}s waiting for {prompt}", .waited.as_secs())]
    Timeout {
        prompt: String,
        waited: std::time::Duration,
    },

    /// The UI side hung up before answering
    #[error("user interface disconnected while waiting for {prompt}")]
    Disconnected { prompt: String },
}

impl CoordinatorError {
    /// True if the exchange ended because its deadline passed
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Main error type for the installer
#[derive(Error, Debug)]
pub enum InstallerError {
    /// IO errors (file operations, terminal, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest not found, unparsable or structurally invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Missing reference or dependency cycle
    #[error("Dependency error: {0}")]
    Dependency(#[from] DependencyError),

    /// A manifest command is on the deny-list
    #[error("Dangerous command: {0}")]
    DangerousCommand(#[from] DangerousCommandError),

    /// Both package managers failed, or installed state could not be verified
    #[error("Package installation failed: {0}")]
    PackageInstall(String),

    /// A config rule could not be deployed
    #[error("Config deployment failed: {0}")]
    ConfigDeploy(String),

    /// A module command exited unsuccessfully or could not start
    #[error("Command failed: {0}")]
    CommandExec(String),

    /// The user did not answer a credential prompt in time
    #[error("Credential setup timed out: {0}")]
    CredentialTimeout(String),

    /// A blocking UI exchange failed
    #[error("Prompt failed: {0}")]
    Coordinator(#[from] CoordinatorError),

    /// A stage failure that halts the run
    #[error("{stage} failed: {message}")]
    ControllerFatal { stage: String, message: String },

    /// Installer settings file problems
    #[error("Settings error: {0}")]
    Settings(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stage machine misuse
    #[error("Install transition error: {0}")]
    InstallTransition(String),
}

/// Result type alias for installer operations
pub type Result<T> = std::result::Result<T, InstallerError>;

impl InstallerError {
    /// Create a package installation error
    pub fn package_install(msg: impl Into<String>) -> Self {
        Self::PackageInstall(msg.into())
    }

    /// Create a config deployment error
    pub fn config_deploy(msg: impl Into<String>) -> Self {
        Self::ConfigDeploy(msg.into())
    }

    /// Create a command execution error
    pub fn command_exec(msg: impl Into<String>) -> Self {
        Self::CommandExec(msg.into())
    }

    /// Create a credential timeout error
    pub fn credential_timeout(msg: impl Into<String>) -> Self {
        Self::CredentialTimeout(msg.into())
    }

    /// Create a fatal controller error for `stage`
    pub fn controller_fatal(stage: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ControllerFatal {
            stage: stage.into(),
            message: msg.into(),
        }
    }

    /// Create a settings error
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::Settings(msg.into())
    }

    /// True for a cycle reported by either the validator or the resolver
    pub fn is_circular_dependency(&self) -> bool {
        matches!(
            self,
            Self::Dependency(DependencyError::Circular { .. })
                | Self::Dependency(DependencyError::UnresolvableCycle { .. })
        )
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
