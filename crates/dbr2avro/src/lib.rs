// dbr2avro - convert one billing report source into Avro
//
// Orchestrates a single run:
// 1. Parse source and destination locators
// 2. Verify the destination is reachable
// 3. Fetch the source and check its declared length
// 4. Convert into staged outputs (dbr2avro-core)
// 5. Publish each output under the destination key

mod init;

use std::path::PathBuf;

use anyhow::{Context, Result};
use dbr2avro_config::RuntimeConfig;
use dbr2avro_core::{
    convert, partition_path, ConversionSummary, ConvertError, ConvertOptions, EncoderOptions,
};
use dbr2avro_storage::{Credentials, Fetched, Locator, StagedOutput, Store, StoreOptions};
use tracing::{info, warn};

pub use init::init_tracing;

/// One `convert` invocation
#[derive(Debug, Clone, Default)]
pub struct ConvertRequest {
    pub source: String,
    pub dest: String,
    /// Write one output per StartDate
    pub partition: bool,
    pub credentials: Credentials,
}

/// How a run ended when nothing fatal happened
#[derive(Debug)]
pub enum RunOutcome {
    /// The source was converted; outputs were written when it had a header
    Converted(ConversionSummary),
    /// The source could not be read; no output was written
    SourceSkipped(String),
}

/// Build core conversion options from the runtime config
pub fn convert_options(config: &RuntimeConfig, partition: bool) -> ConvertOptions {
    ConvertOptions {
        record_name: config.encoder.record_name.clone(),
        encoder: EncoderOptions {
            max_block_records: config.encoder.max_block_records,
            compression_level: config.encoder.compression_level,
        },
        partition,
    }
}

fn store_options(config: &RuntimeConfig, credentials: &Credentials) -> StoreOptions {
    StoreOptions {
        region: config.storage.region.clone(),
        endpoint: config.storage.endpoint.clone(),
        default_region: config.storage.default_region.clone(),
        credentials: credentials.clone(),
    }
}

/// Convert `request.source` into `request.dest`.
///
/// Errors are fatal to the run. A source that cannot be fetched, or whose
/// length does not match its metadata, yields [`RunOutcome::SourceSkipped`].
pub async fn run(request: &ConvertRequest, config: &RuntimeConfig) -> Result<RunOutcome> {
    let source = Locator::parse(&request.source).context("Invalid source")?;
    let dest = Locator::parse(&request.dest).context("Invalid destination")?;
    let options = store_options(config, &request.credentials);

    let dest_store = Store::open(&dest, &options)
        .await
        .with_context(|| format!("Failed to open destination {}", dest))?;
    if dest.is_s3() {
        dest_store
            .check_reachable()
            .await
            .with_context(|| format!("Destination {} is not reachable", dest))?;
    }

    let source_store = Store::open(&source, &options)
        .await
        .with_context(|| format!("Failed to open source {}", source))?;

    let fetched = match source_store.fetch(source_store.key()).await {
        Ok(fetched) => fetched,
        Err(e) if e.is_source_recoverable() => {
            warn!(source = %source, code = e.code().as_str(), error = %e, "Skipping source");
            return Ok(RunOutcome::SourceSkipped(e.to_string()));
        }
        Err(e) => return Err(e).context("Failed to fetch source"),
    };
    publish(&source, fetched, &dest, &dest_store, request, config).await
}

/// Check, convert and commit one fetched source
async fn publish(
    source: &Locator,
    fetched: Fetched,
    dest: &Locator,
    dest_store: &Store,
    request: &ConvertRequest,
    config: &RuntimeConfig,
) -> Result<RunOutcome> {
    if let Err(e) = fetched.check_length(source) {
        warn!(source = %source, code = e.code().as_str(), error = %e, "Skipping source");
        return Ok(RunOutcome::SourceSkipped(e.to_string()));
    }

    let staging_dir = config.storage.staging_dir.as_ref().map(PathBuf::from);
    let conversion = match convert(
        &source.file_name(),
        &fetched.bytes,
        &convert_options(config, request.partition),
        |_| StagedOutput::new(staging_dir.as_deref()),
    ) {
        Ok(conversion) => conversion,
        Err(e @ ConvertError::Archive { .. }) => {
            warn!(source = %source, error = %e, "Skipping source");
            return Ok(RunOutcome::SourceSkipped(e.to_string()));
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to convert {}", source)),
    };

    for output in conversion.outputs {
        let key = match &output.partition {
            Some(partition) => partition_path(dest_store.key(), partition),
            None => dest_store.key().to_string(),
        };
        dest_store
            .commit(&key, output.writer)
            .await
            .with_context(|| format!("Failed to write {}", dest.with_key(&key)))?;
    }

    let summary = conversion.summary;
    info!(
        source = %source,
        destination = %dest,
        payloads = summary.payloads,
        rows_written = summary.rows_written,
        malformed_rows = summary.malformed_rows,
        coercion_failures = summary.coercion_failures,
        lossy_cells = summary.lossy_cells,
        skipped_entries = summary.skipped_entries.len(),
        partitions = summary.partitions.len(),
        "Conversion finished"
    );
    Ok(RunOutcome::Converted(summary))
}
