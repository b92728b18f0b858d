use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cnpj_pipeline::{
    get_runs, record_run, run_with_report, setup_database, snapshot_fingerprint, PipelineConfig,
    RunRecord, RunReport,
};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "cnpj-pipeline", version, about = "Cleanse and join the CNPJ business registry release")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the cleansing + join pipeline over an extracted snapshot
    Run {
        /// JSON config file; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        base_dir: Option<PathBuf>,

        #[arg(long)]
        output: Option<PathBuf>,

        /// Number of company / venture chunks to attempt
        #[arg(long)]
        chunks: Option<usize>,

        /// Read chunks one at a time
        #[arg(long)]
        sequential: bool,

        /// Record the run in this SQLite ledger
        #[arg(long)]
        ledger: Option<PathBuf>,
    },

    /// List recent runs recorded in a ledger
    History {
        #[arg(long)]
        ledger: PathBuf,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let result = match cli.command {
        Command::Run {
            config,
            base_dir,
            output,
            chunks,
            sequential,
            ledger,
        } => load_config(config.as_deref(), base_dir, output, chunks, sequential, ledger)
            .and_then(|config| run_pipeline(&config)),
        Command::History { ledger, limit } => show_history(&ledger, limit),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{:#}", err), "command failed");
            println!("❌ Operation failed: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "cnpj_pipeline=info",
        1 => "cnpj_pipeline=debug",
        _ => "cnpj_pipeline=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn load_config(
    path: Option<&Path>,
    base_dir: Option<PathBuf>,
    output: Option<PathBuf>,
    chunks: Option<usize>,
    sequential: bool,
    ledger: Option<PathBuf>,
) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(base_dir) = base_dir {
        config.base_dir = base_dir;
    }
    if let Some(output) = output {
        config.output_path = output;
    }
    if let Some(chunks) = chunks {
        config.chunk_count = chunks;
    }
    if sequential {
        config.parallel_reads = false;
    }
    if ledger.is_some() {
        config.ledger_path = ledger;
    }

    config.validate()?;
    Ok(config)
}

fn run_pipeline(config: &PipelineConfig) -> Result<()> {
    println!("🏭 CNPJ Pipeline - clean + join");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📂 Snapshot: {}", config.base_dir.display());

    let mut report = RunReport::new();
    let result = run_with_report(config, &mut report);

    if let Some(ledger) = &config.ledger_path {
        let error = result.as_ref().err().map(|e| e.to_string());
        record_outcome(ledger, config, &report, error);
    }

    for unit in report.skipped() {
        println!(
            "⚠️  Skipped {}: {}",
            unit.path.display(),
            unit.status.reason().unwrap_or("unknown")
        );
    }

    let table = result.context("Pipeline run failed")?;
    let (rows, columns) = table.shape();

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Operation completed successfully");
    println!("📊 Result shape: ({}, {})", rows, columns);
    println!("💾 Written to {}", config.output_path.display());
    println!("   {}", report.summary());
    Ok(())
}

/// Record the run; a ledger failure is logged and never replaces the run's
/// own outcome.
fn record_outcome(
    path: &Path,
    config: &PipelineConfig,
    report: &RunReport,
    error: Option<String>,
) -> bool {
    match write_ledger(path, config, report, error) {
        Ok(()) => {
            println!("🗄️  Run {} recorded in {}", report.run_id, path.display());
            true
        }
        Err(err) => {
            error!(
                ledger = %path.display(),
                error = %format!("{:#}", err),
                "could not record run in ledger"
            );
            false
        }
    }
}

fn write_ledger(
    path: &Path,
    config: &PipelineConfig,
    report: &RunReport,
    error: Option<String>,
) -> Result<()> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open ledger: {}", path.display()))?;
    setup_database(&conn)?;

    let fingerprint = snapshot_fingerprint(&config.base_dir)?;
    let record = RunRecord::from_report(report, &fingerprint, error);
    record_run(&conn, &record, &report.units)
}

fn show_history(path: &Path, limit: usize) -> Result<()> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open ledger: {}", path.display()))?;
    setup_database(&conn)?;

    let runs = get_runs(&conn, limit)?;
    if runs.is_empty() {
        println!("No runs recorded in {}", path.display());
        return Ok(());
    }

    println!("🗄️  {} most recent runs", runs.len());
    for run in &runs {
        println!("  {}", run.summary());
        if let Some(error) = &run.error {
            println!("      ↳ {}", error);
        }
    }
    Ok(())
}
