//! Slipway command line.
//!
//! Builds an api project from the workspace into a release folder and hands
//! it to the configured push command.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};

use slipway_pipeline::{
    push_api, resolve_config, PushArgs, PushRequest, ReleaseReport, SystemRunner,
};
use slipway_telemetry::{LogFormat, TelemetryConfig};

/// Folder under the user's home directory used when `--home` is not given.
const DEFAULT_HOME: &str = ".slipway";

#[derive(Parser, Debug)]
#[command(name = "slipway", about = "Build and push api projects", version)]
struct Cli {
    /// Tool home holding settings, keys, recipes and the build folder.
    #[arg(long, env = "SLIPWAY_HOME", global = true)]
    home: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log format (compact, pretty or json).
    #[arg(long, default_value = "compact", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build and push an api: `push api <namespace> [recipe|environment]`.
    Push(PushCommand),

    /// Print the effective configuration for a recipe or environment.
    Resolve {
        /// Recipe or environment id. Only `common` applies when omitted.
        selector: Option<String>,
    },
}

#[derive(Args, Debug)]
struct PushCommand {
    /// Push arguments: `api <namespace> [selector]`.
    #[arg(required = true, num_args = 1..)]
    args: Vec<String>,

    /// Workspace holding the api projects.
    #[arg(long, env = "SLIPWAY_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Release version, instead of the configured `version`.
    #[arg(long)]
    release_version: Option<String>,

    /// Release notes, instead of the configured `notes`.
    #[arg(long)]
    notes: Option<String>,

    /// Push command template. Placeholders: {namespace}, {folder}, {build}.
    #[arg(long, env = "SLIPWAY_PUSH_COMMAND")]
    push_command: Option<String>,

    /// Assemble the build folder without running the push command.
    #[arg(long)]
    no_install: bool,

    /// Skip copying the project into the build folder.
    #[arg(long)]
    no_copy: bool,

    /// Keep the final build folder after publishing.
    #[arg(long)]
    keep_build: bool,
}

impl PushCommand {
    fn into_request(self, home: PathBuf) -> anyhow::Result<PushRequest> {
        let parsed = PushArgs::parse(&self.args.join(" "))?;
        Ok(PushRequest {
            workspace: self.workspace,
            selector: parsed.selector,
            version: self.release_version,
            notes: self.notes,
            push_command: self.push_command,
            no_install: self.no_install,
            no_copy: self.no_copy,
            keep_build: self.keep_build,
            ..PushRequest::new(home, parsed.namespace)
        })
    }
}

fn home_dir(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(home) => Ok(home),
        None => home::home_dir()
            .map(|dir| dir.join(DEFAULT_HOME))
            .ok_or_else(|| anyhow!("cannot determine home directory; pass --home")),
    }
}

/// Run the push command.
fn run_push(home: PathBuf, command: PushCommand) -> anyhow::Result<()> {
    let request = command.into_request(home)?;
    let report = push_api(&request, &SystemRunner)?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &ReleaseReport) {
    for warn in &report.warnings {
        match &warn.location {
            Some(loc) => eprintln!("  {} [{}]: {} (warning)", warn.code, loc, warn.message),
            None => eprintln!("  {}: {} (warning)", warn.code, warn.message),
        }
    }

    match &report.pushed_with {
        Some(command) => eprintln!("pushed {} with: {}", report.namespace, command),
        None => eprintln!("built {} (not pushed)", report.namespace),
    }
    if let Some(target) = &report.copied_to {
        eprintln!("copied to {}", target.display());
    }
    if report.kept {
        eprintln!("build folder kept at {}", report.folder.display());
    }
    eprintln!(
        "{} service spec(s), {} marker(s), {} warning(s)",
        report.services,
        report.markers,
        report.warnings.len()
    );
}

/// Run the resolve command.
fn run_resolve(home: &Path, selector: Option<&str>) -> anyhow::Result<()> {
    let resolved = resolve_config(home, selector)?;
    let output = serde_json::to_string_pretty(&resolved.effective.to_value())
        .context("failed to render configuration")?;
    match &resolved.source {
        Some(source) => eprintln!("resolved from {}", source.path.display()),
        None => eprintln!("no recipes or environments file found; using defaults"),
    }
    println!("{}", output);
    Ok(())
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let format = LogFormat::parse(&cli.log_format)
        .ok_or_else(|| anyhow!("unknown log format '{}'", cli.log_format))?;
    let config = TelemetryConfig::new()
        .with_log_level(cli.log_level.clone())
        .with_log_format(format);
    slipway_telemetry::init(&config)?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("error: {:#}", e);
        return ExitCode::from(1);
    }

    let result = home_dir(cli.home).and_then(|home| match cli.command {
        Commands::Push(command) => run_push(home, command),
        Commands::Resolve { selector } => run_resolve(&home, selector.as_deref()),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}
