use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use biomed_migrate::app::{Migrator, RunOptions, RunSummary};
use biomed_migrate::config::{ConfigLoader, ResolvedConfig};
use biomed_migrate::daemon::{DaemonClient, DaemonHandle, DaemonHttpClient, DaemonStatus};
use biomed_migrate::domain::{MigrationKind, ProcessStatus};
use biomed_migrate::error::MigrateError;
use biomed_migrate::fs_util::list_files;
use biomed_migrate::metadata::FieldRules;
use biomed_migrate::output::{ConsoleProgress, JsonOutput, OutputMode};
use biomed_migrate::sheet::extract_workbook;
use biomed_migrate::store::{LegacyStore, TargetStore};

#[derive(Parser)]
#[command(name = "biomed-migrate")]
#[command(about = "Migrate legacy biomedical records and CGH/VCF files into the new schema")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run one migration")]
    Run(RunArgs),
    #[command(about = "Parse one aberration workbook and print its metadata and CNV rows")]
    Extract(ExtractArgs),
    #[command(about = "List input files in a directory")]
    List(ListArgs),
}

#[derive(Args)]
struct RunArgs {
    kind: MigrationKind,

    #[arg(long)]
    dir: Option<PathBuf>,

    #[arg(long)]
    recursive: bool,

    #[arg(long)]
    no_daemon: bool,
}

#[derive(Args)]
struct ExtractArgs {
    file: PathBuf,
}

#[derive(Args)]
struct ListArgs {
    dir: PathBuf,

    #[arg(long)]
    ext: Option<String>,

    #[arg(long)]
    recursive: bool,
}

fn main() -> ExitCode {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    let result = tracing::subscriber::with_default(subscriber, || run(Cli::parse()));
    if let Err(report) = result {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<MigrateError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &MigrateError) -> u8 {
    match error {
        MigrateError::MissingConfig
        | MigrateError::ConfigMissingValue(_)
        | MigrateError::UnsupportedSchemaVersion { .. }
        | MigrateError::InputNotFound(_) => 2,
        MigrateError::Database(_)
        | MigrateError::DaemonHttp(_)
        | MigrateError::DaemonStatus { .. } => 3,
        MigrateError::Parse { .. } | MigrateError::Workbook(_) => 4,
        _ => 1,
    }
}

fn run(cli: Cli) -> miette::Result<()> {
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Run(args) => {
            let resolved = ConfigLoader::resolve(cli.config.as_deref())?;
            run_migration(args, resolved, output_mode)
        }
        Commands::Extract(args) => {
            let rules = match cli.config.as_deref() {
                Some(path) => ConfigLoader::resolve(Some(path))?.field_rules,
                None => ConfigLoader::resolve(None)
                    .map(|resolved| resolved.field_rules)
                    .unwrap_or_else(|_| FieldRules::default()),
            };
            let result = extract_workbook(&args.file, &rules)?;
            JsonOutput::print_extraction(&result).into_diagnostic()
        }
        Commands::List(args) => {
            let files = list_files(&args.dir, args.ext.as_deref(), args.recursive)?
                .into_iter()
                .map(|path| path.to_string())
                .collect::<Vec<_>>();
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_files(&files).into_diagnostic(),
                OutputMode::Interactive => {
                    for file in &files {
                        println!("{file}");
                    }
                    Ok(())
                }
            }
        }
    }
}

fn run_migration(
    args: RunArgs,
    resolved: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let legacy = match &resolved.legacy_db {
        Some(path) => Some(LegacyStore::open(path)?),
        None => None,
    };
    let target = TargetStore::open(&resolved.target_db)?;
    let options = RunOptions {
        dir: args.dir,
        recursive: args.recursive,
    };

    let summary = match resolved.daemon.as_ref().filter(|_| !args.no_daemon) {
        Some(settings) => {
            let daemon = DaemonHttpClient::new(settings)?;
            let mut migrator = Migrator::new(legacy, target, daemon, resolved.field_rules);
            execute(&mut migrator, args.kind, &options, output_mode)?
        }
        None => {
            let mut migrator = Migrator::new(legacy, target, NopDaemon, resolved.field_rules);
            execute(&mut migrator, args.kind, &options, output_mode)?
        }
    };

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_summary(&summary).into_diagnostic()?,
        OutputMode::Interactive => print_run_summary(&summary),
    }
    Ok(())
}

fn execute<D: DaemonClient>(
    migrator: &mut Migrator<D>,
    kind: MigrationKind,
    options: &RunOptions,
    output_mode: OutputMode,
) -> miette::Result<RunSummary> {
    match output_mode {
        OutputMode::NonInteractive => Ok(migrator.run(kind, options, &JsonOutput)?),
        OutputMode::Interactive => Ok(migrator.run(kind, options, &ConsoleProgress)?),
    }
}

fn print_run_summary(summary: &RunSummary) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}biomed-migrate {} ({}){reset}", summary.kind, summary.process_id);
    println!(
        "{green}processed: {}/{}{reset}",
        summary.processed, summary.total
    );
    let errors_color = if summary.not_processed == 0 { yellow } else { red };
    println!("{errors_color}not processed: {}{reset}", summary.not_processed);

    for item in &summary.items {
        println!("{green}  ok {} -> {} ({} records){reset}", item.source, item.id, item.records);
    }
    for error in &summary.errors {
        println!("{red}  failed {}: {}{reset}", error.source, error.message);
    }

    let status_color = match summary.status {
        ProcessStatus::Success => green,
        ProcessStatus::Error => red,
        ProcessStatus::Initializing | ProcessStatus::Running => yellow,
    };
    println!("{status_color}status: {}{reset}", summary.status);
}

struct NopDaemon;

impl DaemonClient for NopDaemon {
    fn create(&self, status: &DaemonStatus) -> Result<DaemonHandle, MigrateError> {
        Ok(DaemonHandle {
            id: status.process_id.clone(),
        })
    }

    fn update(&self, _handle: &DaemonHandle, _status: &DaemonStatus) -> Result<(), MigrateError> {
        Ok(())
    }
}
