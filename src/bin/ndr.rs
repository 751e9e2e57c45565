use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ninox_dart_reconcile::app::{App, ProgressSink};
use ninox_dart_reconcile::config::{ConfigLoader, DEFAULT_CONFIG_FILE, ResolvedConfig};
use ninox_dart_reconcile::error::ReconcileError;
use ninox_dart_reconcile::output::{JsonOutput, OutputMode, StderrProgress, print_summary};
use ninox_dart_reconcile::prompt::{BatchDecision, DecisionInput, TerminalAsker, decide};
use ninox_dart_reconcile::report::RunReport;
use ninox_dart_reconcile::store::Store;

#[derive(Parser)]
#[command(name = "ndr")]
#[command(about = "Reconcile Ninox survey exports with DArT genotyping batch reports")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    root: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Merge survey categories, extract batches and combine (default)")]
    Run(BatchArgs),
    #[command(about = "Merge survey categories into the category and global ledgers")]
    Ledger,
    #[command(about = "Extract sample identifiers from DArT batch reports")]
    Batches(BatchArgs),
    #[command(about = "Join the global ledger with the batch-sample table")]
    Combine,
}

#[derive(Args, Clone, Default)]
struct BatchArgs {
    #[arg(long, conflicts_with = "reuse_batches")]
    regather: bool,

    #[arg(long)]
    reuse_batches: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<ReconcileError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ReconcileError) -> u8 {
    match error {
        ReconcileError::ConfigRead(_)
        | ReconcileError::ConfigParse(_)
        | ReconcileError::InvalidConfig(_) => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = load_config(cli.config.as_deref(), cli.root.as_ref())?;
    let store = match &cli.root {
        Some(root) => Store::new_with_root(root.clone(), &config),
        None => Store::new(&config)?,
    };
    info!(root = %store.root(), "ndr run started");
    let app = App::new(store, config);

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Interactive => &StderrProgress,
        OutputMode::NonInteractive => &JsonOutput,
    };

    let command = cli
        .command
        .unwrap_or_else(|| Commands::Run(BatchArgs::default()));
    let report = match command {
        Commands::Run(args) => {
            let decision = batch_decision(&app, &args, output_mode)?;
            app.run(decision, sink)?
        }
        Commands::Ledger => {
            let stage = app.run_ledger(sink)?;
            RunReport {
                ledger: Some(stage.report),
                conditions: stage.conditions,
                ..RunReport::default()
            }
        }
        Commands::Batches(args) => {
            let decision = batch_decision(&app, &args, output_mode)?;
            let stage = app.run_batches(decision, sink)?;
            RunReport {
                batches: Some(stage.report),
                conditions: stage.conditions,
                ..RunReport::default()
            }
        }
        Commands::Combine => {
            let stage = app.run_combine(sink)?;
            RunReport {
                combine: stage.report,
                conditions: stage.conditions,
                ..RunReport::default()
            }
        }
    };

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_report(&report).into_diagnostic()?,
        OutputMode::Interactive => print_summary(&report),
    }
    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .into_diagnostic()?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn load_config(
    path: Option<&str>,
    root: Option<&Utf8PathBuf>,
) -> Result<ResolvedConfig, ReconcileError> {
    if path.is_some() {
        return ConfigLoader::resolve(path);
    }
    match root.map(|root| root.join(DEFAULT_CONFIG_FILE)) {
        Some(candidate) if candidate.is_file() => ConfigLoader::resolve(Some(candidate.as_str())),
        Some(_) => ConfigLoader::resolve_config(Default::default()),
        None => ConfigLoader::resolve(None),
    }
}

fn batch_decision(
    app: &App,
    args: &BatchArgs,
    output_mode: OutputMode,
) -> Result<BatchDecision, ReconcileError> {
    let default = BatchDecision::from_regather(app.config().regather_on_timeout);
    let input = if args.regather {
        DecisionInput::Flag(BatchDecision::Regather)
    } else if args.reuse_batches {
        DecisionInput::Flag(BatchDecision::Reuse)
    } else {
        match output_mode {
            OutputMode::Interactive => DecisionInput::Prompt {
                timeout: app.config().prompt_timeout,
                default,
            },
            OutputMode::NonInteractive => DecisionInput::Default(default),
        }
    };
    let (decision, _) = decide(app.batch_table_exists(), input, &TerminalAsker)?;
    Ok(decision)
}
