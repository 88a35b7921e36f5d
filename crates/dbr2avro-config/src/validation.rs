// Configuration validation
//
// Validates that values are sensible before anything is fetched

use crate::*;
use anyhow::{bail, Result};
use dbr2avro_core::is_avro_name;
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_encoder_config(&config.encoder)?;
    validate_storage_config(&config.storage)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_encoder_config(config: &EncoderConfig) -> Result<()> {
    if config.max_block_records == 0 {
        bail!("encoder.max_block_records must be greater than 0");
    }

    // Each block is buffered uncompressed before deflate
    if config.max_block_records > 1_000_000 {
        warn!(
            max_block_records = config.max_block_records,
            "encoder.max_block_records is very large; may cause memory issues"
        );
    }

    if !is_avro_name(&config.record_name) {
        bail!(
            "encoder.record_name '{}' is not a valid Avro name ([A-Za-z_][A-Za-z0-9_]*)",
            config.record_name
        );
    }

    if config.compression_level > 9 {
        bail!("encoder.compression_level must be between 0 and 9");
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    if config.default_region.is_empty() {
        bail!("storage.default_region must not be empty");
    }

    if let Some(ref endpoint) = config.endpoint {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            bail!("storage.endpoint must start with http:// or https://");
        }
    }

    Ok(())
}

fn validate_logging_config(config: &LoggingConfig) -> Result<()> {
    if config.level.trim().is_empty() {
        bail!("logging.level must not be empty");
    }
    Ok(())
}
