//! Error types for the storage crate

use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Locator could not be parsed
    E001InvalidLocator,
    /// E002: Locator scheme is not s3 or file
    E002UnsupportedScheme,
    /// E003: Destination bucket or directory cannot be reached
    E003DestinationUnreachable,
    /// E004: Source could not be fetched or was truncated
    E004FetchFailure,
    /// E005: Output could not be written
    E005WriteFailure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E001InvalidLocator => "E001",
            Self::E002UnsupportedScheme => "E002",
            Self::E003DestinationUnreachable => "E003",
            Self::E004FetchFailure => "E004",
            Self::E005WriteFailure => "E005",
        }
    }

    /// Anchor in the bundled troubleshooting guide
    pub fn docs_url(&self) -> String {
        format!("docs/troubleshooting.md#{}", self.as_str().to_lowercase())
    }
}

/// Errors that can occur while fetching sources or publishing outputs
#[derive(Debug, Error)]
pub enum StorageError {
    /// Locator is malformed
    #[error("[{code}] Invalid locator '{locator}': {reason}\n\nSee: {docs_url}")]
    InvalidLocator {
        code: &'static str,
        locator: String,
        reason: String,
        docs_url: String,
    },

    /// Locator scheme is not supported
    #[error("[{code}] Unsupported scheme '{scheme}' in '{locator}'\n\nSupported: s3://bucket/key, file://path, plain paths\n\nSee: {docs_url}")]
    UnsupportedScheme {
        code: &'static str,
        scheme: String,
        locator: String,
        docs_url: String,
    },

    /// Destination cannot be reached
    #[error("[{code}] Destination '{locator}' is unreachable: {reason}\n\nTroubleshooting:\n  • Check the bucket exists and the region is right\n  • Check credentials can write to it\n\nSee: {docs_url}")]
    DestinationUnreachable {
        code: &'static str,
        locator: String,
        reason: String,
        docs_url: String,
    },

    /// Source could not be fetched
    #[error("[{code}] Failed to fetch '{locator}': {reason}\n\nSee: {docs_url}")]
    FetchFailure {
        code: &'static str,
        locator: String,
        reason: String,
        docs_url: String,
    },

    /// Fetched byte count differs from the declared object length
    #[error("[{code}] Read {actual} bytes from '{locator}' but {declared} were declared\n\nSee: {docs_url}")]
    LengthMismatch {
        code: &'static str,
        locator: String,
        declared: u64,
        actual: u64,
        docs_url: String,
    },

    /// Output could not be written
    #[error("[{code}] Failed to write '{locator}': {reason}\n\nSee: {docs_url}")]
    WriteFailure {
        code: &'static str,
        locator: String,
        reason: String,
        docs_url: String,
    },
}

impl StorageError {
    /// Create an invalid locator error with error code
    pub fn invalid_locator(locator: impl Into<String>, reason: impl ToString) -> Self {
        let code_enum = ErrorCode::E001InvalidLocator;
        Self::InvalidLocator {
            code: code_enum.as_str(),
            locator: locator.into(),
            reason: reason.to_string(),
            docs_url: code_enum.docs_url(),
        }
    }

    /// Create an unsupported scheme error with error code
    pub fn unsupported_scheme(locator: impl Into<String>, scheme: impl Into<String>) -> Self {
        let code_enum = ErrorCode::E002UnsupportedScheme;
        Self::UnsupportedScheme {
            code: code_enum.as_str(),
            scheme: scheme.into(),
            locator: locator.into(),
            docs_url: code_enum.docs_url(),
        }
    }

    /// Create a destination unreachable error with error code
    pub fn destination_unreachable(locator: impl Into<String>, reason: impl ToString) -> Self {
        let code_enum = ErrorCode::E003DestinationUnreachable;
        Self::DestinationUnreachable {
            code: code_enum.as_str(),
            locator: locator.into(),
            reason: reason.to_string(),
            docs_url: code_enum.docs_url(),
        }
    }

    /// Create a fetch failure error with error code
    pub fn fetch_failure(locator: impl Into<String>, reason: impl ToString) -> Self {
        let code_enum = ErrorCode::E004FetchFailure;
        Self::FetchFailure {
            code: code_enum.as_str(),
            locator: locator.into(),
            reason: reason.to_string(),
            docs_url: code_enum.docs_url(),
        }
    }

    /// Create a length mismatch error with error code
    pub fn length_mismatch(locator: impl Into<String>, declared: u64, actual: u64) -> Self {
        let code_enum = ErrorCode::E004FetchFailure;
        Self::LengthMismatch {
            code: code_enum.as_str(),
            locator: locator.into(),
            declared,
            actual,
            docs_url: code_enum.docs_url(),
        }
    }

    /// Create a write failure error with error code
    pub fn write_failure(locator: impl Into<String>, reason: impl ToString) -> Self {
        let code_enum = ErrorCode::E005WriteFailure;
        Self::WriteFailure {
            code: code_enum.as_str(),
            locator: locator.into(),
            reason: reason.to_string(),
            docs_url: code_enum.docs_url(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidLocator { .. } => ErrorCode::E001InvalidLocator,
            Self::UnsupportedScheme { .. } => ErrorCode::E002UnsupportedScheme,
            Self::DestinationUnreachable { .. } => ErrorCode::E003DestinationUnreachable,
            Self::FetchFailure { .. } | Self::LengthMismatch { .. } => ErrorCode::E004FetchFailure,
            Self::WriteFailure { .. } => ErrorCode::E005WriteFailure,
        }
    }

    /// Whether the run can continue by skipping this source
    pub fn is_source_recoverable(&self) -> bool {
        matches!(self, Self::FetchFailure { .. } | Self::LengthMismatch { .. })
    }
}

/// Result type alias for StorageError
pub type Result<T> = std::result::Result<T, StorageError>;
