//! Error types for MongoDB operations.
//!
//! [`MongoError`] wraps driver failures; converting it into a [`StoreError`]
//! classifies server error codes into the store-level taxonomy.

use geostore_core::StoreError;
use mongodb::error::{ErrorKind, WriteFailure};
use thiserror::Error;

/// Server code for a unique index violation.
pub const DUPLICATE_KEY: i32 = 11000;
/// Server code: an index with the same name but different options exists.
pub const INDEX_OPTIONS_CONFLICT: i32 = 85;
/// Server code: an index with the same name but different keys exists.
pub const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
/// Server code: no index found for a geospatial operator.
pub const INDEX_NOT_FOUND: i32 = 27;
/// Server code: no query solutions (raised for `$geoNear` without an index).
pub const NO_QUERY_EXECUTION_PLANS: i32 = 291;
/// Server code: the collection does not exist.
pub const NAMESPACE_NOT_FOUND: i32 = 26;

/// A failure reported by the MongoDB driver.
#[derive(Error, Debug)]
#[error("mongodb error: {0}")]
pub struct MongoError(#[from] mongodb::error::Error);

impl MongoError {
    /// The server error code, for command and write errors.
    pub fn server_code(&self) -> Option<i32> {
        match self.0.kind.as_ref() {
            ErrorKind::Command(command) => Some(command.code),
            ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
            ErrorKind::Write(WriteFailure::WriteConcernError(concern)) => Some(concern.code),
            _ => None,
        }
    }

    /// Whether the driver failed to reach the server.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self.0.kind.as_ref(),
            ErrorKind::Io(_)
                | ErrorKind::ServerSelection { .. }
                | ErrorKind::ConnectionPoolCleared { .. }
                | ErrorKind::DnsResolve { .. }
        )
    }

    /// Whether the driver gave up waiting on the server.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.0.kind.as_ref(),
            ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::TimedOut
        )
    }

    /// Whether the collection targeted by the operation does not exist.
    pub fn is_namespace_not_found(&self) -> bool {
        self.server_code() == Some(NAMESPACE_NOT_FOUND)
    }

    /// Convert into a store error, naming the collection the operation targeted.
    pub fn into_store_error(self, collection: &str) -> StoreError {
        if self.is_timeout() {
            return StoreError::Timeout(0);
        }
        if self.is_network_error() {
            return StoreError::connection(self.0.to_string());
        }
        match self.0.kind.as_ref() {
            ErrorKind::BsonDeserialization(e) => StoreError::serialization(e.to_string()),
            ErrorKind::BsonSerialization(e) => StoreError::serialization(e.to_string()),
            _ => classify_server_error(self.server_code(), &self.0.to_string(), collection),
        }
    }
}

/// Map a server error code and message onto the store taxonomy.
pub fn classify_server_error(code: Option<i32>, message: &str, collection: &str) -> StoreError {
    match code {
        Some(DUPLICATE_KEY) => {
            StoreError::duplicate_key(collection, duplicate_key_index(message).unwrap_or("unknown"))
        }
        Some(INDEX_OPTIONS_CONFLICT | INDEX_KEY_SPECS_CONFLICT) => {
            StoreError::driver(format!("index conflict on {}: {}", collection, message))
        }
        Some(INDEX_NOT_FOUND | NO_QUERY_EXECUTION_PLANS) => {
            StoreError::geo_index_unavailable(collection, "")
        }
        _ if message.contains("unable to find index for $geoNear") => {
            StoreError::geo_index_unavailable(collection, "")
        }
        _ if message.contains("E11000") => {
            StoreError::duplicate_key(collection, duplicate_key_index(message).unwrap_or("unknown"))
        }
        _ => StoreError::driver(message.to_string()),
    }
}

/// Whether a server code reports an index name/key/options clash.
pub fn is_index_conflict_code(code: Option<i32>) -> bool {
    matches!(code, Some(INDEX_OPTIONS_CONFLICT | INDEX_KEY_SPECS_CONFLICT))
}

/// Extract the index name from an `E11000` message.
fn duplicate_key_index(message: &str) -> Option<&str> {
    let start = message.find("index: ")? + "index: ".len();
    message[start..].split_whitespace().next()
}
