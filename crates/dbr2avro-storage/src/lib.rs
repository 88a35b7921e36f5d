// dbr2avro-storage - I/O and persistence layer
//
// This crate provides the storage side of a conversion:
// - Locator parsing (s3://, file://, plain paths)
// - OpenDAL stores for fetching sources and publishing outputs
// - Local staging of encoded output before it is published
//
// Conversion itself lives in dbr2avro-core and never touches storage.

pub mod error;
pub mod locator;
pub mod staging;
pub mod store;

pub use error::{ErrorCode, Result, StorageError};
pub use locator::Locator;
pub use staging::StagedOutput;
pub use store::{Credentials, Fetched, Store, StoreOptions};
