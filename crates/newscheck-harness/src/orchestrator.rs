//! Sequences the selected checks and stops at the first failure.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use newscheck_core::{ArticleSet, Config, Error, Result};
use tracing::info;

use crate::batch::{BatchCommand, BatchRunner};
use crate::random::WorkloadRng;
use crate::shutdown::ProcessRegistry;
use crate::supervisor::ServerSupervisor;
use crate::workload::{ServerWorkload, WorkloadOptions, WorkloadSummary};

/// What the operator asked to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Languages,
    News,
    Categories,
    Threads,
    Server,
    All,
}

impl Action {
    /// Whether the action runs the HTTP server and so needs a port.
    pub fn needs_port(self) -> bool {
        matches!(self, Action::Server | Action::All)
    }

    /// Checks in execution order.
    pub fn checks(self) -> Vec<Check> {
        match self {
            Action::Languages => vec![Check::Batch(BatchCommand::Languages)],
            Action::News => vec![Check::Batch(BatchCommand::News)],
            Action::Categories => vec![Check::Batch(BatchCommand::Categories)],
            Action::Threads => vec![Check::Batch(BatchCommand::Threads)],
            Action::Server => vec![Check::Server],
            Action::All => BatchCommand::ALL
                .into_iter()
                .map(Check::Batch)
                .chain(std::iter::once(Check::Server))
                .collect(),
        }
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "languages" => Ok(Action::Languages),
            "news" => Ok(Action::News),
            "categories" => Ok(Action::Categories),
            "threads" => Ok(Action::Threads),
            "server" => Ok(Action::Server),
            "all" => Ok(Action::All),
            other => Err(Error::Environment(format!("Invalid action: {other}"))),
        }
    }
}

/// A single pass/fail unit of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Batch(BatchCommand),
    Server,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Batch(command) => f.write_str(command.name()),
            Check::Server => f.write_str("server"),
        }
    }
}

/// Checks that passed, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub passed: Vec<Check>,
    pub workload: Option<WorkloadSummary>,
}

/// Runs checks against one engine binary and one article set.
pub struct Orchestrator {
    binary: PathBuf,
    articles: ArticleSet,
    config: Config,
    registry: ProcessRegistry,
}

impl Orchestrator {
    pub fn new(binary: impl Into<PathBuf>, articles: ArticleSet, config: Config) -> Self {
        Self {
            binary: binary.into(),
            articles,
            config,
            registry: ProcessRegistry::new(),
        }
    }

    /// Share `registry` with every server this run starts.
    pub fn with_registry(mut self, registry: ProcessRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Run every check of `action`; `on_pass` is told about each success.
    ///
    /// The first failing check ends the run with its error. Any server still
    /// running at that point has already been stopped.
    pub fn run(
        &self,
        action: Action,
        port: Option<u16>,
        mut on_pass: impl FnMut(Check),
    ) -> Result<RunReport> {
        let port = match (action.needs_port(), port) {
            (true, Some(0)) => return Err(Error::Environment("Invalid port: 0".to_string())),
            (true, None) => return Err(Error::Environment("Invalid port: missing".to_string())),
            (_, port) => port,
        };

        let mut report = RunReport::default();
        for check in action.checks() {
            match check {
                Check::Batch(command) => self.run_batch(command)?,
                Check::Server => {
                    let port = port.ok_or_else(|| {
                        Error::Environment("Invalid port: missing".to_string())
                    })?;
                    report.workload = Some(self.run_server(port)?);
                }
            }
            info!("{} check passed", check);
            on_pass(check);
            report.passed.push(check);
        }
        Ok(report)
    }

    fn run_batch(&self, command: BatchCommand) -> Result<()> {
        let output = BatchRunner::new(&self.binary).run(command, self.articles.root())?;
        if self.config.echo_output {
            info!("{}", output);
        }
        Ok(())
    }

    fn run_server(&self, port: u16) -> Result<WorkloadSummary> {
        let mut supervisor = ServerSupervisor::new(&self.binary, self.config.server.clone())
            .with_registry(self.registry.clone());
        let mut rng = WorkloadRng::new(self.config.seed);

        let result = ServerWorkload::new(
            &mut supervisor,
            port,
            &self.articles,
            &mut rng,
            WorkloadOptions::from(&self.config),
        )
        .run();

        if result.is_err() {
            supervisor.sweep();
        }
        result
    }
}
