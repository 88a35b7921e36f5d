// Configuration source loading.
//
// Priority order:
// 1. Environment variables (DBR2AVRO_* prefix)
// 2. Config file path from --config, then DBR2AVRO_CONFIG
// 3. Default config file (./dbr2avro.toml)
// 4. Built-in defaults

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::*;
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "./dbr2avro.toml";

/// Load configuration using native environment and file access.
pub fn load_config(explicit_path: Option<&Path>) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    if let Some(file_config) = load_from_file(explicit_path)? {
        config.merge(file_config);
    }

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

/// Build a configuration from optional inline TOML and a custom env source.
pub fn load_with_env<E: EnvSource>(inline_config: Option<&str>, env: &E) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    if let Some(inline) = inline_config {
        let file_config: RuntimeConfig =
            toml::from_str(inline).context("Failed to parse inline config content")?;
        config.merge(file_config);
    }

    env_overrides::apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file(explicit_path: Option<&Path>) -> Result<Option<RuntimeConfig>> {
    // An explicitly named file must exist
    let named: Option<PathBuf> = explicit_path
        .map(Path::to_path_buf)
        .or_else(|| env::var(format!("{}CONFIG", ENV_PREFIX)).ok().map(PathBuf::from));

    if let Some(path) = named {
        return read_file(&path).map(Some);
    }

    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        return read_file(default_path).map(Some);
    }

    Ok(None)
}

fn read_file(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: RuntimeConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    tracing::debug!(path = %path.display(), "Loaded config file");
    Ok(config)
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}
