use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// riotinstall - ArchRiot desktop installer
#[derive(Parser, Debug)]
#[command(name = "riotinstall")]
#[command(about = "Installs and configures the ArchRiot desktop from a module manifest")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check the manifest without installing anything
    Validate {
        /// Manifest to check instead of the default search locations
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },
    /// Run the installation
    Install(InstallArgs),
}

#[derive(Args, Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallArgs {
    /// Manifest to install instead of the default search locations
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// Installer settings file (JSON)
    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    /// Use ASCII status glyphs instead of emoji
    #[arg(long)]
    pub ascii: bool,

    /// No terminal UI: print log lines and answer prompts automatically.
    ///
    /// Confirmations are answered yes, the reboot prompt no; the Git
    /// username and email are read from stdin.
    #[arg(long)]
    pub headless: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// The subcommand, with `install` and default flags when none is given.
    pub fn command_or_default(self) -> Commands {
        self.command
            .unwrap_or_else(|| Commands::Install(InstallArgs::default()))
    }
}
