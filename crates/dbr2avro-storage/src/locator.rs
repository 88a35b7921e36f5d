//! Source and destination locators
//!
//! Accepted forms:
//! - `s3://bucket/key`
//! - `file:///abs/path`, `file://rel/path`
//! - a plain filesystem path

use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{Result, StorageError};

/// Where an object lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    S3 { bucket: String, key: String },
    File { path: PathBuf },
}

impl Locator {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(StorageError::invalid_locator(raw, "locator is empty"));
        }

        let Some((scheme, rest)) = raw.split_once("://") else {
            return Ok(Self::File {
                path: PathBuf::from(raw),
            });
        };

        match scheme.to_ascii_lowercase().as_str() {
            "s3" => {
                let url = Url::parse(raw).map_err(|e| StorageError::invalid_locator(raw, e))?;
                let bucket = url
                    .host_str()
                    .filter(|b| !b.is_empty())
                    .ok_or_else(|| StorageError::invalid_locator(raw, "missing bucket"))?
                    .to_string();
                // Key is taken verbatim so it matches the object name exactly
                let key = rest
                    .split_once('/')
                    .map(|(_, key)| key)
                    .unwrap_or_default();
                if key.is_empty() {
                    return Err(StorageError::invalid_locator(raw, "missing object key"));
                }
                Ok(Self::S3 {
                    bucket,
                    key: key.to_string(),
                })
            }
            "file" => {
                if rest.is_empty() {
                    return Err(StorageError::invalid_locator(raw, "missing path"));
                }
                Ok(Self::File {
                    path: PathBuf::from(rest),
                })
            }
            other => Err(StorageError::unsupported_scheme(raw, other)),
        }
    }

    /// Object key (S3) or path as text (file)
    pub fn key(&self) -> String {
        match self {
            Self::S3 { key, .. } => key.clone(),
            Self::File { path } => path.to_string_lossy().into_owned(),
        }
    }

    /// Final path segment
    pub fn file_name(&self) -> String {
        match self {
            Self::S3 { key, .. } => key.rsplit('/').next().unwrap_or(key).to_string(),
            Self::File { path } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// Same bucket or filesystem, different key
    pub fn with_key(&self, key: &str) -> Self {
        match self {
            Self::S3 { bucket, .. } => Self::S3 {
                bucket: bucket.clone(),
                key: key.to_string(),
            },
            Self::File { .. } => Self::File {
                path: PathBuf::from(key),
            },
        }
    }

    pub fn is_s3(&self) -> bool {
        matches!(self, Self::S3 { .. })
    }

    /// Split a file locator into an absolute root directory and a file name
    pub(crate) fn fs_root_and_name(path: &Path) -> Result<(PathBuf, String)> {
        let absolute = std::path::absolute(path)
            .map_err(|e| StorageError::invalid_locator(path.display().to_string(), e))?;
        let name = absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                StorageError::invalid_locator(path.display().to_string(), "path has no file name")
            })?;
        let root = absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        Ok((root, name))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S3 { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
            Self::File { path } => write!(f, "{}", path.display()),
        }
    }
}

impl std::str::FromStr for Locator {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
