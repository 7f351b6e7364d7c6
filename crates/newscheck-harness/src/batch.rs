//! One-shot runs of the engine's batch subcommands.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use newscheck_core::schema::{self, PayloadKind};
use newscheck_core::{Error, Result};
use tracing::info;

/// The four batch subcommands of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchCommand {
    Languages,
    News,
    Categories,
    Threads,
}

impl BatchCommand {
    /// All subcommands in the order a full run checks them.
    pub const ALL: [BatchCommand; 4] = [
        BatchCommand::Languages,
        BatchCommand::News,
        BatchCommand::Categories,
        BatchCommand::Threads,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BatchCommand::Languages => "languages",
            BatchCommand::News => "news",
            BatchCommand::Categories => "categories",
            BatchCommand::Threads => "threads",
        }
    }

    pub fn payload_kind(self) -> PayloadKind {
        match self {
            BatchCommand::Languages => PayloadKind::Languages,
            BatchCommand::News => PayloadKind::News,
            BatchCommand::Categories => PayloadKind::Categories,
            BatchCommand::Threads => PayloadKind::Threads,
        }
    }
}

/// Exit status and stdout of one invocation.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
}

impl CommandResult {
    /// Fail on a non-zero exit or blank output.
    pub fn check(&self) -> Result<()> {
        if !self.status.success() {
            return Err(Error::Execution(describe_failure(self.status)));
        }
        if self.stdout.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::Execution("Script exit with no output".to_string()));
        }
        Ok(())
    }
}

fn describe_failure(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("Script exit with exit code {code}");
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            return format!("Script terminated by signal {signal}");
        }
    }

    format!("Script failed: {status}")
}

/// Runs batch subcommands of one engine binary.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    binary: PathBuf,
}

impl BatchRunner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Invoke `<binary> <command> <source_dir>` and capture its output.
    ///
    /// Stderr is inherited so the engine's own diagnostics reach the terminal.
    pub fn execute(&self, command: BatchCommand, source_dir: &Path) -> Result<CommandResult> {
        info!("Running {} command...", command.name());
        info!(
            "{} {} {}",
            self.binary.display(),
            command.name(),
            source_dir.display()
        );

        let output = Command::new(&self.binary)
            .arg(command.name())
            .arg(source_dir)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| {
                Error::Execution(format!("cannot run {}: {}", self.binary.display(), e))
            })?;

        Ok(CommandResult {
            status: output.status,
            stdout: output.stdout,
        })
    }

    /// Execute, check and validate one subcommand; returns the validated output.
    pub fn run(&self, command: BatchCommand, source_dir: &Path) -> Result<String> {
        let result = self.execute(command, source_dir)?;
        result.check()?;

        schema::validate(command.payload_kind(), &result.stdout).into_result()?;
        Ok(String::from_utf8_lossy(&result.stdout).into_owned())
    }
}
