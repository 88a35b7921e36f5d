// OpenDAL-based object store
//
// One operator per locator root:
// - S3: the bucket, region fixed by config or detected from the bucket
// - Filesystem: the parent directory of the file

use std::io::Read;
use std::path::Path;

use opendal::{services, ErrorKind, Operator};

use crate::error::{Result, StorageError};
use crate::locator::Locator;
use crate::staging::StagedOutput;

const STREAM_CHUNK: usize = 8 * 1024 * 1024;
const DEFAULT_S3_ENDPOINT: &str = "https://s3.amazonaws.com";

/// Explicit S3 credentials; when absent opendal loads them from the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

/// Connection settings shared by every store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub default_region: String,
    pub credentials: Credentials,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            region: None,
            endpoint: None,
            default_region: "us-east-1".to_string(),
            credentials: Credentials::default(),
        }
    }
}

/// Bytes of a fetched source and the length its metadata declared
#[derive(Debug)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub declared_len: u64,
}

impl Fetched {
    /// Fail when the byte count differs from the declared length
    pub fn check_length(&self, locator: &Locator) -> Result<()> {
        let actual = self.bytes.len() as u64;
        if actual != self.declared_len {
            return Err(StorageError::length_mismatch(
                locator.to_string(),
                self.declared_len,
                actual,
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Fs,
}

/// Object access rooted at a bucket or directory
#[derive(Clone)]
pub struct Store {
    operator: Operator,
    backend: Backend,
    /// Locator the store was opened for, used in error messages
    locator: Locator,
    /// Key of that locator relative to the operator root
    key: String,
}

impl Store {
    /// Open a store for the bucket or directory holding `locator`
    pub async fn open(locator: &Locator, options: &StoreOptions) -> Result<Self> {
        match locator {
            Locator::S3 { bucket, key } => {
                let region = resolve_region(bucket, options).await;
                let mut builder = services::S3::default().bucket(bucket).region(&region);

                if let Some(endpoint) = &options.endpoint {
                    builder = builder.endpoint(endpoint);
                }
                let creds = &options.credentials;
                if let Some(key) = &creds.access_key_id {
                    builder = builder.access_key_id(key);
                }
                if let Some(secret) = &creds.secret_access_key {
                    builder = builder.secret_access_key(secret);
                }
                if let Some(token) = &creds.session_token {
                    builder = builder.session_token(token);
                }

                let operator = Operator::new(builder)
                    .map_err(|e| StorageError::invalid_locator(locator.to_string(), e))?
                    .finish();
                tracing::debug!(bucket = %bucket, region = %region, "Opened S3 store");

                Ok(Self {
                    operator,
                    backend: Backend::S3,
                    locator: locator.clone(),
                    key: key.clone(),
                })
            }
            Locator::File { path } => {
                let (root, name) = Locator::fs_root_and_name(path)?;
                let builder = services::Fs::default().root(&root.to_string_lossy());
                let operator = Operator::new(builder)
                    .map_err(|e| StorageError::invalid_locator(locator.to_string(), e))?
                    .finish();
                tracing::debug!(root = %root.display(), "Opened filesystem store");

                Ok(Self {
                    operator,
                    backend: Backend::Fs,
                    locator: locator.clone(),
                    key: name,
                })
            }
        }
    }

    /// Wrap an existing operator (tests use the memory service)
    pub fn from_operator(operator: Operator, locator: Locator, key: impl Into<String>) -> Self {
        let backend = if locator.is_s3() {
            Backend::S3
        } else {
            Backend::Fs
        };
        Self {
            operator,
            backend,
            locator,
            key: key.into(),
        }
    }

    /// Key of the opened locator relative to the store root
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fetch the object at `key` together with its declared length
    pub async fn fetch(&self, key: &str) -> Result<Fetched> {
        let shown = self.display_key(key);

        let meta = self
            .operator
            .stat(key)
            .await
            .map_err(|e| StorageError::fetch_failure(&shown, e))?;
        let declared_len = meta.content_length();

        let buffer = self
            .operator
            .read(key)
            .await
            .map_err(|e| StorageError::fetch_failure(&shown, e))?;

        let bytes = buffer.to_vec();
        tracing::info!(source = %shown, bytes = bytes.len(), "Fetched source");
        Ok(Fetched {
            bytes,
            declared_len,
        })
    }

    /// Verify the store root can be listed and written to
    pub async fn check_reachable(&self) -> Result<()> {
        self.operator
            .check()
            .await
            .map_err(|e| StorageError::destination_unreachable(self.locator.to_string(), e))
    }

    /// Write an in-memory buffer to `key`
    pub async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let shown = self.display_key(key);
        self.operator
            .write(key, bytes)
            .await
            .map(|_| ())
            .map_err(|e| StorageError::write_failure(shown, e))
    }

    /// Publish a staged output under `key`.
    ///
    /// Filesystem outputs are written to `<key>.tmp` and renamed into place.
    /// S3 outputs are streamed directly; the object only appears on completion.
    pub async fn commit(&self, key: &str, staged: StagedOutput) -> Result<u64> {
        let shown = self.display_key(key);
        let file = staged
            .into_file()
            .map_err(|e| StorageError::write_failure(&shown, e))?;

        let written = match self.backend {
            Backend::S3 => self.stream_file(key, file.path()).await?,
            Backend::Fs => {
                let tmp_key = format!("{}.tmp", key);
                let written = match self.stream_file(&tmp_key, file.path()).await {
                    Ok(written) => written,
                    Err(e) => {
                        self.remove_quietly(&tmp_key).await;
                        return Err(e);
                    }
                };
                if let Err(e) = self.operator.rename(&tmp_key, key).await {
                    self.remove_quietly(&tmp_key).await;
                    return Err(StorageError::write_failure(&shown, e));
                }
                written
            }
        };

        tracing::info!(destination = %shown, bytes = written, "Wrote output");
        Ok(written)
    }

    async fn stream_file(&self, key: &str, path: &Path) -> Result<u64> {
        let source = std::fs::File::open(path)
            .map_err(|e| StorageError::write_failure(&self.display_key(key), e))?;
        self.stream_from(key, source, STREAM_CHUNK).await
    }

    async fn stream_from(
        &self,
        key: &str,
        mut source: impl Read,
        chunk_size: usize,
    ) -> Result<u64> {
        let shown = self.display_key(key);
        let mut writer = self
            .operator
            .writer(key)
            .await
            .map_err(|e| StorageError::write_failure(&shown, e))?;

        let mut chunk = vec![0u8; chunk_size];
        let mut written = 0u64;
        loop {
            let n = source
                .read(&mut chunk)
                .map_err(|e| StorageError::write_failure(&shown, e))?;
            if n == 0 {
                break;
            }
            written += n as u64;
            if let Err(e) = writer.write(chunk[..n].to_vec()).await {
                if let Err(abort) = writer.abort().await {
                    tracing::warn!(key, error = %abort, "Failed to abort upload");
                }
                return Err(StorageError::write_failure(&shown, e));
            }
        }

        writer
            .close()
            .await
            .map_err(|e| StorageError::write_failure(&shown, e))?;
        Ok(written)
    }

    async fn remove_quietly(&self, key: &str) {
        if let Err(e) = self.operator.delete(key).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(key, error = %e, "Failed to remove temporary output");
            }
        }
    }

    fn display_key(&self, key: &str) -> String {
        self.locator.with_key(key).to_string()
    }
}

async fn resolve_region(bucket: &str, options: &StoreOptions) -> String {
    if let Some(region) = &options.region {
        return region.clone();
    }

    let endpoint = options.endpoint.as_deref().unwrap_or(DEFAULT_S3_ENDPOINT);
    match services::S3::detect_region(endpoint, bucket).await {
        Some(region) => {
            tracing::debug!(bucket, region = %region, "Detected bucket region");
            region
        }
        None => {
            tracing::warn!(
                bucket,
                default_region = %options.default_region,
                "Could not detect bucket region, using default"
            );
            options.default_region.clone()
        }
    }
}
