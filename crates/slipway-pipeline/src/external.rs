//! External command execution.
//!
//! The build tool, datasource generator, push command and post-build `run`
//! commands all go through [`CommandRunner`], so tests can record
//! invocations instead of spawning processes.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::PushError;

/// How a command line is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    /// Split with shell-like quoting rules and executed directly.
    Program,
    /// Handed to the platform shell as is.
    Shell,
}

/// A command line to run in a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub line: String,
    pub dir: PathBuf,
    pub kind: InvocationKind,
}

impl Invocation {
    pub fn program(line: impl Into<String>, dir: &Path) -> Self {
        Self {
            line: line.into(),
            dir: dir.to_path_buf(),
            kind: InvocationKind::Program,
        }
    }

    pub fn shell(line: impl Into<String>, dir: &Path) -> Self {
        Self {
            line: line.into(),
            dir: dir.to_path_buf(),
            kind: InvocationKind::Shell,
        }
    }

    fn failure(&self, reason: impl Into<String>) -> PushError {
        PushError::ExternalCommand {
            command: self.line.clone(),
            reason: reason.into(),
        }
    }

    /// Build the process for this invocation.
    fn command(&self) -> Result<Command, PushError> {
        let mut command = match self.kind {
            InvocationKind::Program => {
                let argv = shlex::split(&self.line)
                    .ok_or_else(|| self.failure("unbalanced quotes in command line"))?;
                let (program, args) = argv
                    .split_first()
                    .ok_or_else(|| self.failure("empty command line"))?;
                let mut command = Command::new(program);
                command.args(args);
                command
            }
            InvocationKind::Shell => shell_command(&self.line),
        };
        command.current_dir(&self.dir);
        Ok(command)
    }
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(line);
    command
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external commands. A non-zero exit is an error.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, PushError>;
}

/// Runs commands as child processes and waits for them.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, PushError> {
        slipway_telemetry::log_command_started!(
            command = %invocation.line,
            dir = %invocation.dir.display(),
            "Running external command"
        );

        let output = invocation
            .command()?
            .output()
            .map_err(|e| invocation.failure(e.to_string()))?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !output.status.success() {
            let status = output
                .status
                .code()
                .map(|c| format!("exit code {}", c))
                .unwrap_or_else(|| "terminated by signal".to_string());
            let detail = result.stderr.trim();
            return Err(invocation.failure(if detail.is_empty() {
                status
            } else {
                format!("{}: {}", status, detail)
            }));
        }

        tracing::debug!(
            command = %invocation.line,
            stdout_bytes = result.stdout.len(),
            "External command finished"
        );
        Ok(result)
    }
}

/// Replace `{name}` placeholders, quoting values so the line still splits
/// into the same arguments.
pub fn expand_placeholders(template: &str, values: &[(&str, &str)]) -> Result<String, PushError> {
    let mut line = template.to_string();
    for (name, value) in values {
        let quoted = shlex::try_quote(value).map_err(|e| PushError::ExternalCommand {
            command: template.to_string(),
            reason: format!("cannot quote {{{}}}: {}", name, e),
        })?;
        line = line.replace(&format!("{{{}}}", name), &quoted);
    }
    Ok(line)
}
