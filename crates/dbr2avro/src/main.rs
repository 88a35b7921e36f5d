use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dbr2avro::{ConvertRequest, RunOutcome};
use dbr2avro_config::RuntimeConfig;
use dbr2avro_core::ConversionSummary;
use dbr2avro_storage::Credentials;
use tracing::{error, info, warn};

/// Exit status when `--strict` is set and a cell could not be coerced
const EXIT_STRICT_FAILURE: u8 = 2;

/// Convert AWS Detailed Billing Reports into Avro container files
#[derive(Parser)]
#[command(name = "dbr2avro")]
#[command(version)]
#[command(about = "Convert AWS Detailed Billing Reports into Avro container files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Records per Avro block (overrides config file)
    #[arg(long, value_name = "N", global = true)]
    block_records: Option<usize>,

    /// S3 region (skips bucket region detection)
    #[arg(long, value_name = "REGION", global = true)]
    region: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one report (CSV, .zip or .gz) into Avro
    Convert {
        /// Source locator: s3://bucket/key, file://path or a plain path
        source: String,

        /// Destination locator for the Avro output
        dest: String,

        /// AWS access key id (default: from the environment)
        #[arg(long, value_name = "KEY")]
        access_key: Option<String>,

        /// AWS secret access key (default: from the environment)
        #[arg(long, value_name = "SECRET")]
        secret_key: Option<String>,

        /// AWS session token for temporary credentials
        #[arg(long, value_name = "TOKEN")]
        session_token: Option<String>,

        /// Write one file per StartDate under <dest stem>/date=YYYYMMDD.avro
        #[arg(long)]
        partition: bool,

        /// Exit with status 2 when any cell could not be coerced
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Step 1: Resolve configuration before tracing so log settings apply
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    // Step 2: Initialize tracing
    dbr2avro::init_tracing(&config.logging);

    // Step 3: Run the command
    match run_command(cli.command, &config) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<RuntimeConfig> {
    let mut config =
        RuntimeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_cli_overrides(&mut config, cli);
    config
        .validate()
        .context("Invalid configuration after applying command-line options")?;
    Ok(config)
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) {
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    if let Some(block_records) = cli.block_records {
        config.encoder.max_block_records = block_records;
    }

    if let Some(region) = &cli.region {
        config.storage.region = Some(region.clone());
    }
}

fn run_command(command: Commands, config: &RuntimeConfig) -> Result<ExitCode> {
    let Commands::Convert {
        source,
        dest,
        access_key,
        secret_key,
        session_token,
        partition,
        strict,
    } = command;

    let request = ConvertRequest {
        source,
        dest,
        partition,
        credentials: Credentials {
            access_key_id: access_key,
            secret_access_key: secret_key,
            session_token,
        },
    };

    // opendal is async; a current-thread runtime is enough for one sequential run
    let outcome = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(dbr2avro::run(&request, config))?;

    match outcome {
        RunOutcome::Converted(summary) => {
            report(&summary);
            if strict && summary.coercion_failures > 0 {
                error!(
                    coercion_failures = summary.coercion_failures,
                    "Strict mode: some cells could not be coerced"
                );
                return Ok(ExitCode::from(EXIT_STRICT_FAILURE));
            }
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::SourceSkipped(reason) => {
            warn!(reason = %reason, "Source skipped, no output written");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn report(summary: &ConversionSummary) {
    if !summary.has_output() {
        warn!("Source had no header line, no output written");
        return;
    }

    info!("╭─────────────────────────────────────────────────");
    info!("│ dbr2avro v{}", env!("CARGO_PKG_VERSION"));
    info!("├─────────────────────────────────────────────────");
    info!("│ Payloads: {}", summary.payloads);
    info!("│ Rows read: {}", summary.rows_read);
    info!("│ Rows written: {}", summary.rows_written);
    info!("│ Malformed rows: {}", summary.malformed_rows);
    info!("│ Coercion failures: {}", summary.coercion_failures);
    if summary.lossy_cells > 0 {
        info!("│ Cells with invalid UTF-8: {}", summary.lossy_cells);
    }

    for failure in &summary.failure_samples {
        info!("│   - {}", failure);
    }
    for entry in &summary.skipped_entries {
        info!("│ Skipped entry {}: {}", entry.name, entry.reason);
    }
    if !summary.partitions.is_empty() {
        info!("│ Partitions: {}", summary.partitions.join(", "));
    }

    info!("╰─────────────────────────────────────────────────");
}
