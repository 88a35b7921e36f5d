//! Error types for the conversion pipeline

use thiserror::Error;

/// Errors that stop conversion of a source
///
/// Per-record and per-entry problems are not errors; they are reported in
/// [`crate::ConversionSummary`] and processing continues.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Payload had no header line, so no schema can be built
    #[error("input has no header line")]
    EmptyInput,

    /// The archive container itself could not be opened
    #[error("unable to open archive '{source_name}': {reason}")]
    Archive { source_name: String, reason: String },

    /// Schema could not be serialized or parsed as Avro
    #[error("unable to build Avro schema: {0}")]
    Schema(String),

    /// A record could not be encoded against the schema
    #[error("unable to encode record: {0}")]
    Encode(String),

    /// Writing to the output sink failed
    #[error("output write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    pub(crate) fn archive(source_name: &str, reason: impl ToString) -> Self {
        Self::Archive {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<apache_avro::Error> for ConvertError {
    fn from(err: apache_avro::Error) -> Self {
        Self::Encode(err.to_string())
    }
}

/// Result type alias for ConvertError
pub type Result<T> = std::result::Result<T, ConvertError>;
