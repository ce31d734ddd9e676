//! Error types for store access, index provisioning and geospatial queries.
//!
//! Every variant carries an [`ErrorCode`] so callers can branch on the
//! failure class without matching message text.
//!
//! # Error Codes
//!
//! Error codes follow a pattern: G{category}{number}
//! - 1xxx: Credential and configuration errors (fatal at startup)
//! - 2xxx: Connection errors
//! - 3xxx: Index provisioning errors (fatal at startup)
//! - 4xxx: Query errors (caller mistakes, rejected before store access)
//! - 5xxx: Identifier allocation errors
//! - 6xxx: Execution errors (timeouts, driver and serialization failures)
//!
//! ```rust
//! use geostore_core::{ErrorCode, StoreError};
//!
//! let err = StoreError::invalid_query("radius must be positive");
//! assert_eq!(err.code(), ErrorCode::InvalidQuery);
//! assert_eq!(err.code().code(), "G4001");
//! ```

use std::fmt;

use thiserror::Error;

use crate::index::IndexConflict;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Credential / configuration errors (1xxx)
    /// Credentials in the connection descriptor cannot be split unambiguously (G1001).
    MalformedCredential = 1001,
    /// Invalid configuration (G1002).
    InvalidConfiguration = 1002,

    // Connection errors (2xxx)
    /// Store unreachable or handle closed (G2001).
    ConnectionFailed = 2001,

    // Index errors (3xxx)
    /// Declared index drifts from the live index (G3001).
    IndexConflict = 3001,
    /// A mandatory index could not be provisioned (G3002).
    MissingIndex = 3002,
    /// The store has no geospatial index for a `$geoNear` query (G3003).
    GeoIndexUnavailable = 3003,
    /// Records carry scalar coordinates but no indexed geospatial field (G3004).
    UnplacedRecords = 3004,

    // Query errors (4xxx)
    /// Bad coordinates, radius or pagination (G4001).
    InvalidQuery = 4001,

    // Allocation errors (5xxx)
    /// Retry budget exhausted while allocating an identifier (G5001).
    AllocationExhausted = 5001,
    /// Uniqueness constraint rejected a write (G5002).
    DuplicateKey = 5002,

    // Execution errors (6xxx)
    /// Operation exceeded its deadline (G6001).
    Timeout = 6001,
    /// Driver / server error (G6002).
    Driver = 6002,
    /// BSON or JSON conversion failure (G6003).
    Serialization = 6003,
}

impl ErrorCode {
    /// Get the error code string (e.g., "G4001").
    pub fn code(&self) -> String {
        format!("G{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::MalformedCredential => "Malformed credentials in connection descriptor",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::ConnectionFailed => "Store connection failed",
            Self::IndexConflict => "Index drift between declaration and store",
            Self::MissingIndex => "Mandatory index missing",
            Self::GeoIndexUnavailable => "Geospatial index unavailable",
            Self::UnplacedRecords => "Records missing the geospatial field",
            Self::InvalidQuery => "Invalid query",
            Self::AllocationExhausted => "Identifier allocation exhausted",
            Self::DuplicateKey => "Duplicate key",
            Self::Timeout => "Operation timed out",
            Self::Driver => "Store driver error",
            Self::Serialization => "Serialization error",
        }
    }

    /// Whether an error with this code must halt process startup.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            Self::MalformedCredential
                | Self::InvalidConfiguration
                | Self::ConnectionFailed
                | Self::IndexConflict
                | Self::MissingIndex
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by the store access layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The username/password boundary in a descriptor is ambiguous.
    #[error("malformed credentials: {0}")]
    MalformedCredential(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error (unreachable store, closed handle, network failure).
    #[error("connection error: {0}")]
    Connection(String),

    /// One or more declared indexes drift from the live store.
    #[error("index conflict: {}", format_conflicts(.0))]
    IndexConflict(Vec<IndexConflict>),

    /// Mandatory indexes could not be provisioned.
    #[error("mandatory indexes missing: {}", .0.join(", "))]
    MissingIndex(Vec<String>),

    /// The target collection has no usable geospatial index.
    #[error("geospatial index unavailable on {collection}.{field}")]
    GeoIndexUnavailable {
        /// Collection name.
        collection: String,
        /// Geospatial field.
        field: String,
    },

    /// Records in range carry scalar coordinates but no geospatial field, so
    /// the native ranking would miss them.
    #[error("{records} records in {collection} have coordinates but no {field}")]
    UnplacedRecords {
        /// Collection name.
        collection: String,
        /// Geospatial field the records lack.
        field: String,
        /// Records affected.
        records: u64,
    },

    /// The query was rejected before touching the store.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A uniqueness constraint rejected the write.
    #[error("duplicate key on {collection} ({index})")]
    DuplicateKey {
        /// Collection name.
        collection: String,
        /// Index (or field) that rejected the write.
        index: String,
    },

    /// Identifier allocation ran out of attempts.
    #[error("identifier allocation exhausted after {attempts} attempts on {collection}.{field}")]
    AllocationExhausted {
        /// Collection name.
        collection: String,
        /// Identifier field.
        field: String,
        /// Attempts made.
        attempts: u32,
    },

    /// Operation timed out.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    /// Store driver error.
    #[error("store error: {0}")]
    Driver(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

fn format_conflicts(conflicts: &[IndexConflict]) -> String {
    conflicts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl StoreError {
    /// Create a malformed credential error.
    pub fn malformed_credential(message: impl Into<String>) -> Self {
        Self::MalformedCredential(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    /// Create a driver error.
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver(message.into())
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a duplicate key error.
    pub fn duplicate_key(collection: impl Into<String>, index: impl Into<String>) -> Self {
        Self::DuplicateKey {
            collection: collection.into(),
            index: index.into(),
        }
    }

    /// Create a geo index unavailable error.
    pub fn geo_index_unavailable(collection: impl Into<String>, field: impl Into<String>) -> Self {
        Self::GeoIndexUnavailable {
            collection: collection.into(),
            field: field.into(),
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedCredential(_) => ErrorCode::MalformedCredential,
            Self::Config(_) => ErrorCode::InvalidConfiguration,
            Self::Connection(_) => ErrorCode::ConnectionFailed,
            Self::IndexConflict(_) => ErrorCode::IndexConflict,
            Self::MissingIndex(_) => ErrorCode::MissingIndex,
            Self::GeoIndexUnavailable { .. } => ErrorCode::GeoIndexUnavailable,
            Self::UnplacedRecords { .. } => ErrorCode::UnplacedRecords,
            Self::InvalidQuery(_) => ErrorCode::InvalidQuery,
            Self::DuplicateKey { .. } => ErrorCode::DuplicateKey,
            Self::AllocationExhausted { .. } => ErrorCode::AllocationExhausted,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Driver(_) => ErrorCode::Driver,
            Self::Serialization(_) => ErrorCode::Serialization,
        }
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is a duplicate key error.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }

    /// Check if this is a caller error.
    pub fn is_invalid_query(&self) -> bool {
        matches!(self, Self::InvalidQuery(_))
    }

    /// Check if this error must halt startup.
    pub fn is_fatal_at_startup(&self) -> bool {
        self.code().is_fatal_at_startup()
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
