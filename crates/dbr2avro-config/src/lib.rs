// dbr2avro-config - Layered configuration for the converter
//
// Supports configuration from multiple sources (highest priority first):
// 1. Command-line flags (applied by the CLI on top of the loaded config)
// 2. Environment variables (DBR2AVRO_* prefix)
// 3. Config file from --config or DBR2AVRO_CONFIG
// 4. Default config file (./dbr2avro.toml)
// 5. Built-in defaults

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};

/// Records per Avro block when not configured
pub const DEFAULT_MAX_BLOCK_RECORDS: usize = 13;

/// Avro record name when not configured
pub const DEFAULT_RECORD_NAME: &str = "BillingReport";

/// Main runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Avro encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub max_block_records: usize,
    pub record_name: String,
    /// Deflate level, 0-9
    pub compression_level: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            max_block_records: DEFAULT_MAX_BLOCK_RECORDS,
            record_name: DEFAULT_RECORD_NAME.to_string(),
            compression_level: 6,
        }
    }
}

/// Object storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Fixed S3 region; detected from the bucket when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Custom S3 endpoint (MinIO, LocalStack)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Region used when detection fails
    pub default_region: String,

    /// Directory for staged output; the system temp dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            region: None,
            endpoint: None,
            default_region: "us-east-1".to_string(),
            staging_dir: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Unsupported log format: {}. Supported: text, json", s),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority.
    ///
    /// `config_path` is the `--config` flag; it takes precedence over
    /// `DBR2AVRO_CONFIG` and the default file.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        sources::load_config(config_path)
    }

    /// Build a configuration from inline TOML plus overrides from `env`
    pub fn load_with_env<E: EnvSource>(inline_config: Option<&str>, env: &E) -> Result<Self> {
        sources::load_with_env(inline_config, env)
    }

    /// Merge another config into this one (used for TOML layering).
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.encoder = other.encoder;
        self.storage = other.storage;
        self.logging = other.logging;
    }

    /// Apply environment overrides from a custom source
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}
