//! Taxi Ingest - trip file loader

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use taxi_common::logging::{init_logging, LogConfig, LogLevel};
use taxi_ingest::{
    create_pool, CsvDuplicateSink, IngestConfig, IngestPipeline, PgBulkLoader, TripReader,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "taxi-ingest")]
#[command(author, version, about = "Load taxi trip files into PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that a file has every required column
    Validate {
        /// Input file
        file: PathBuf,
    },

    /// Deduplicate a file and bulk load it
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Input file
    file: PathBuf,

    /// Unique records per bulk load
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Treat zone-less timestamps as reference-zone time and store them as UTC
    #[arg(long)]
    convert_to_utc: bool,

    /// Where duplicate records are written
    #[arg(short, long)]
    duplicates: Option<PathBuf>,

    /// Destination table
    #[arg(short, long)]
    table: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("taxi-ingest")
        .filter_directives("sqlx=warn")
        .build();
    let log_config = match log_config.clone().merge_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Ignoring invalid logging environment: {err:#}");
            log_config
        }
    };

    let guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Failed to initialize logging: {err:#}");
            std::process::exit(1);
        }
    };

    let code = match execute(cli.command).await {
        Ok(()) => 0,
        Err(err) => {
            report_failure(&mut std::io::stderr(), &err);
            1
        }
    };

    drop(guard);
    std::process::exit(code);
}

async fn execute(command: Command) -> Result<()> {
    match command {
        Command::Validate { file } => {
            ensure_exists(&file)?;
            let config = IngestConfig::load()?;
            let reader = TripReader::new(config.reference_tz()?);
            reader.validate(&file).await?;
            info!(path = %file.display(), "File is valid");
        }
        Command::Run(args) => run(args).await?,
    }
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    ensure_exists(&args.file)?;

    let mut config = IngestConfig::load()?;
    if let Some(batch_size) = args.batch_size {
        config = config.with_batch_size(batch_size);
    }
    if args.convert_to_utc {
        config = config.with_convert_to_utc(true);
    }
    if let Some(path) = args.duplicates {
        config = config.with_duplicates_path(path);
    }
    if let Some(table) = args.table {
        config = config.with_table(table);
    }
    config.validate()?;

    let reader = TripReader::new(config.reference_tz()?);
    reader.validate(&args.file).await?;

    let pool = create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;
    let loader = PgBulkLoader::new(pool, &config.table);
    let sink = CsvDuplicateSink::create(&config.duplicates_path)
        .await
        .with_context(|| {
            format!(
                "Failed to create duplicates file {}",
                config.duplicates_path.display()
            )
        })?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        }
    });

    let summary = IngestPipeline::new(reader, loader, sink)
        .run(&args.file, config.batch_size, config.convert_to_utc, cancel)
        .await?;

    info!(
        rows_committed = summary.rows_committed,
        duplicates = summary.duplicates,
        duplicates_path = %config.duplicates_path.display(),
        "Ingestion complete"
    );
    Ok(())
}

fn ensure_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("File not found at path: {}", path.display());
    }
    Ok(())
}

/// Log `err` and print it, so it reaches the terminal when logs go to a file
fn report_failure(out: &mut impl Write, err: &anyhow::Error) {
    error!("Ingestion failed: {err:#}");
    let _ = writeln!(out, "Error: {err:#}");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_is_printed_with_its_causes() {
        let err = anyhow::anyhow!("connection refused").context("Failed to connect to database");
        let mut out = Vec::new();

        report_failure(&mut out, &err);

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Error: Failed to connect to database: connection refused\n"
        );
    }

    #[test]
    fn test_missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_exists(&dir.path().join("absent.csv")).unwrap_err();
        assert!(err.to_string().starts_with("File not found at path: "));
    }
}
