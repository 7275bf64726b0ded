//! Sequential module commands

use crate::command_runner::CommandRunner;
use crate::error::InstallerError;
use crate::logger::InstallLog;

/// Result of a command list that ran to the end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandsRun {
    pub executed: usize,
}

/// Run `commands` through the shell, one at a time.
///
/// The first failure stops the list; later commands are not started.
///
/// # Errors
///
/// [`InstallerError::CommandExec`] naming the failed command and how many
/// were skipped.
pub fn run_commands(
    runner: &dyn CommandRunner,
    log: &InstallLog,
    module: &str,
    commands: &[String],
) -> Result<CommandsRun, InstallerError> {
    if commands.is_empty() {
        return Ok(CommandsRun::default());
    }
    log.info(format!("Executing {} command(s) for {}", commands.len(), module));

    for (i, command) in commands.iter().enumerate() {
        log.info(format!("Running command {}/{}: {}", i + 1, commands.len(), command));

        let failure = match runner.run_shell(command) {
            Ok(out) => out.ensure_success(command).err(),
            Err(e) => Some(e),
        };

        if let Some(e) = failure {
            let skipped = commands.len() - i - 1;
            return Err(InstallerError::command_exec(format!(
                "{} command {}/{} failed, {} remaining skipped: {:#}",
                module,
                i + 1,
                commands.len(),
                skipped,
                e
            )));
        }
    }

    log.success(format!("{} command(s) completed for {}", commands.len(), module));
    Ok(CommandsRun {
        executed: commands.len(),
    })
}
