//! Error types and result types for connection and persistence operations.
//!
//! Driver failures are carried as [`DriverError`], which keeps a machine
//! readable [`DriverErrorKind`] so callers can tell a missing key apart from
//! a real failure. Everything the persistence layer reports is a
//! [`PersistenceError`].

use serde_json::Error as SerdeJsonError;
use std::convert::Infallible;
use thiserror::Error;

/// Classification of failures reported by a document driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// The requested key does not exist in the bucket.
    KeyNotFound,
    /// An insert targeted a key that is already present.
    KeyExists,
    /// The compare-and-swap token supplied with a write no longer matches.
    CasMismatch,
    /// A bucket with the requested name already exists.
    BucketExists,
    /// The requested index already exists.
    IndexExists,
    /// The supplied credentials were rejected.
    AuthenticationFailed,
    /// The driver cannot execute the requested operation.
    Unsupported,
    /// Any other driver failure.
    Other,
}

/// An error raised by the underlying document driver.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind:?}: {message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn key_not_found(key: &str) -> Self {
        Self::new(DriverErrorKind::KeyNotFound, format!("Key {key} was not found"))
    }

    pub fn key_exists(key: &str) -> Self {
        Self::new(DriverErrorKind::KeyExists, format!("Key {key} already exists"))
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Other, message)
    }

    /// Returns `true` when the driver reports a missing key.
    pub fn is_key_not_found(&self) -> bool {
        self.kind == DriverErrorKind::KeyNotFound
    }
}

/// A specialized `Result` type for driver calls.
pub type DriverResult<T> = Result<T, DriverError>;

/// Represents all errors surfaced by the connection and persistence components.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Missing or invalid connection parameters.
    #[error("Configuration error [{code}]: {message}")]
    Config { code: String, message: String },
    /// Physical connect, bucket open or flush failure.
    #[error("Connection error [{code}]: {message}")]
    Connection {
        code: String,
        message: String,
        #[source]
        cause: Option<DriverError>,
    },
    /// An operation was attempted in a lifecycle state that does not allow it.
    #[error("Invalid state [{code}]: {message}")]
    InvalidState { code: String, message: String },
    /// Error reported verbatim by the driver.
    #[error(transparent)]
    Driver(#[from] DriverError),
    /// Serialization/deserialization error when converting records.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The record does not have the shape the store expects.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An unclassified error.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl PersistenceError {
    pub fn config(code: &str, message: impl Into<String>) -> Self {
        PersistenceError::Config { code: code.to_string(), message: message.into() }
    }

    pub fn connection(code: &str, message: impl Into<String>, cause: Option<DriverError>) -> Self {
        PersistenceError::Connection {
            code: code.to_string(),
            message: message.into(),
            cause,
        }
    }

    pub fn invalid_state(code: &str, message: impl Into<String>) -> Self {
        PersistenceError::InvalidState { code: code.to_string(), message: message.into() }
    }

    /// Returns the stable error code for configuration, connection and state errors.
    pub fn code(&self) -> Option<&str> {
        match self {
            PersistenceError::Config { code, .. }
            | PersistenceError::Connection { code, .. }
            | PersistenceError::InvalidState { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Returns the driver error kind when this error came from the driver.
    pub fn driver_kind(&self) -> Option<DriverErrorKind> {
        match self {
            PersistenceError::Driver(err) => Some(err.kind),
            PersistenceError::Connection { cause: Some(err), .. } => Some(err.kind),
            _ => None,
        }
    }
}

/// A specialized `Result` type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

impl From<SerdeJsonError> for PersistenceError {
    fn from(err: SerdeJsonError) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

impl From<Infallible> for PersistenceError {
    fn from(err: Infallible) -> Self {
        match err {}
    }
}
