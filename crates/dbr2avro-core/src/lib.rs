// dbr2avro-core - billing report conversion logic
//
// Pure processing: buffered report bytes in, Avro container bytes out. No
// storage, networking or async runtime here; those live in dbr2avro-storage
// and the CLI.
//
// Flow: archive::extract → schema::build_schema → transform::RecordTransformer
// → avro::BlockEncoder, driven by pipeline::convert.

pub mod archive;
pub mod avro;
pub mod classify;
pub mod columns;
pub mod error;
pub mod partition;
pub mod pipeline;
pub mod schema;
pub mod summary;
pub mod transform;

// Re-export commonly used types
pub use archive::{extract, ArchiveKind, Payload, SkippedEntry};
pub use avro::{BlockEncoder, EncoderOptions, DEFAULT_MAX_BLOCK_RECORDS};
pub use classify::classify_service;
pub use error::{ConvertError, Result};
pub use partition::{partition_key, partition_path};
pub use pipeline::{convert, convert_to_vec, Conversion, ConvertOptions, Output};
pub use schema::{
    build_schema, is_avro_name, FieldKind, FieldSpec, Header, Schema, DEFAULT_RECORD_NAME,
};
pub use summary::ConversionSummary;
pub use transform::{CoercionFailure, FailureReason, RecordTransformer, TypedRecord, TypedValue};
