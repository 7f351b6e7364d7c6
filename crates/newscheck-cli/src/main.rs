//! newscheck-cli: Command-line interface for newscheck.

mod targets;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use newscheck_core::Config;
use newscheck_harness::{Action, Check, Orchestrator, ProcessRegistry, RunReport};
use owo_colors::OwoColorize;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser)]
#[command(name = "newscheck")]
#[command(
    about = "Checks a news engine binary against its batch and HTTP server contracts",
    long_about = None
)]
#[command(after_help = "Examples:\n  \
    newscheck ./tgnews all 8000 ./data\n  \
    newscheck ./tgnews languages ./data\n  \
    newscheck ./tgnews server 8000 ./data")]
struct Cli {
    /// Path to the news engine binary under test
    binary: PathBuf,

    /// Check to run
    #[arg(value_enum)]
    action: ActionArg,

    /// `[PORT] SOURCE_DIR`; PORT is required for `server` and `all`
    #[arg(value_name = "ARGS", num_args = 1..=2, required = true)]
    args: Vec<OsString>,

    /// TOML configuration file (defaults to ./newscheck.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// File receiving the server's stdout and stderr
    #[arg(long)]
    server_log: Option<PathBuf>,

    /// Seed for randomized cache lifetimes, periods and deletions
    #[arg(long)]
    seed: Option<u64>,

    /// Do not echo the engine's validated output
    #[arg(long)]
    quiet_output: bool,

    /// Log level for newscheck (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ActionArg {
    Languages,
    News,
    Categories,
    Threads,
    Server,
    All,
}

impl From<ActionArg> for Action {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Languages => Action::Languages,
            ActionArg::News => Action::News,
            ActionArg::Categories => Action::Categories,
            ActionArg::Threads => Action::Threads,
            ActionArg::Server => Action::Server,
            ActionArg::All => Action::All,
        }
    }
}

fn main() -> ExitCode {
    if std::env::args_os()
        .skip(1)
        .any(|arg| arg == "--version" || arg == "-V")
    {
        println!("{}", newscheck_core::build_info::version_line());
        return ExitCode::SUCCESS;
    }

    let cli = Cli::parse();
    newscheck_core::logging::init(cli.log_level.as_deref());

    match run(cli) {
        Ok(report) => {
            if let Some(summary) = report.workload {
                info!("Server scenario: {}", summary);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            report_failure(&err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<RunReport> {
    let action = Action::from(cli.action);
    let targets = targets::resolve(action, &cli.args)?;

    let mut config =
        Config::load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &cli.server_log, cli.seed, cli.quiet_output);

    let binary = newscheck_core::binary::check_binary(&cli.binary)?;
    let articles = newscheck_scanner::collect_articles(&targets.source_dir)?;

    let registry = ProcessRegistry::new();
    newscheck_harness::install_signal_handlers(registry.clone(), config.server.stop_grace())?;

    let orchestrator = Orchestrator::new(binary, articles, config).with_registry(registry);
    let report = orchestrator.run(action, targets.port, report_pass)?;
    Ok(report)
}

fn apply_overrides(
    config: &mut Config,
    server_log: &Option<PathBuf>,
    seed: Option<u64>,
    quiet_output: bool,
) {
    if let Some(path) = server_log {
        config.server.log_path = path.clone();
    }
    if seed.is_some() {
        config.seed = seed;
    }
    if quiet_output {
        config.echo_output = false;
    }
}

fn report_pass(check: Check) {
    println!(
        "{}",
        format!("{check}: Test completed successfully.")
            .bright_green()
            .bold()
    );
}

fn report_failure(err: &anyhow::Error) {
    eprintln!("{}", format!("{err:#}").bright_red().bold());

    let payload = err
        .downcast_ref::<newscheck_core::Error>()
        .and_then(newscheck_core::Error::payload);
    if let Some(payload) = payload {
        eprintln!("{payload}");
    }
}
