use super::{LogFormat, RuntimeConfig};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "DBR2AVRO_";

/// Abstraction over environment-variable lookups so tests can supply their
/// own source of overrides.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the DBR2AVRO_ prefix
    /// Used for AWS standard variables (AWS_ENDPOINT_URL)
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Encoder configuration
    if let Some(val) = get_env_usize(env, "BLOCK_RECORDS")? {
        config.encoder.max_block_records = val;
    }
    if let Some(name) = get_env_string(env, "RECORD_NAME") {
        config.encoder.record_name = name;
    }
    if let Some(val) = get_env_u32(env, "COMPRESSION_LEVEL")? {
        config.encoder.compression_level = val;
    }

    // Storage. AWS_REGION is not read: an ambient profile region would
    // disable bucket region detection for buckets elsewhere.
    if let Some(endpoint) = env.get_raw("AWS_ENDPOINT_URL").filter(|e| !e.is_empty()) {
        config.storage.endpoint = Some(endpoint);
    }
    if let Some(region) = get_env_string(env, "REGION") {
        config.storage.region = non_empty(region);
    }
    if let Some(endpoint) = get_env_string(env, "ENDPOINT") {
        config.storage.endpoint = non_empty(endpoint);
    }
    if let Some(region) = get_env_string(env, "DEFAULT_REGION") {
        config.storage.default_region = region;
    }
    if let Some(dir) = get_env_string(env, "STAGING_DIR") {
        config.storage.staging_dir = non_empty(dir);
    }

    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT") {
        config.logging.format = format
            .parse::<LogFormat>()
            .context("Invalid DBR2AVRO_LOG_FORMAT value")?;
    }

    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get(key)
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val
                .parse::<usize>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_u32<E: EnvSource>(env: &E, key: &str) -> Result<Option<u32>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val
                .parse::<u32>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
