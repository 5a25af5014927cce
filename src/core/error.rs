//! Error types and handling for the grid bridge
//!
//! This module defines the errors that cross the dialect boundary. Absent
//! tuples, associations and rows are never errors; they are reported as `None`
//! or as empty collections by the operations that look them up.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::model::key::EntityKeyMetadata;
use crate::model::Tuple;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed native driver error kept as the cause of a dialect failure
pub type NativeCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for the grid bridge
#[derive(Error, Debug)]
pub enum Error {
    /// Generic backend failure raised by a dialect
    #[error(transparent)]
    Dialect(#[from] GridDialectError),

    /// An entity with the same key has already been inserted
    #[error(transparent)]
    TupleAlreadyExists(Box<TupleAlreadyExists>),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key composed from mismatching column names and values
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Native query that the dialect cannot execute
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Work submitted to an operations queue that was already flushed or closed
    #[error("Operations queue is closed")]
    QueueClosed,

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failure of the underlying datastore, wrapping the native driver error
#[derive(Error, Debug)]
#[error("{message}")]
pub struct GridDialectError {
    /// Human readable description of the failed operation
    pub message: String,

    /// The native driver's error, if any
    #[source]
    pub cause: Option<NativeCause>,
}

impl GridDialectError {
    /// Create a dialect error without a native cause
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Create a dialect error preserving the native driver's error
    pub fn with_cause(message: impl Into<String>, cause: impl Into<NativeCause>) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }
}

/// Payload of a duplicate insert: the entity type and the offending id
#[derive(Debug, Clone)]
pub struct TupleAlreadyExists {
    /// Key metadata of the entity type that was inserted twice
    pub entity_key_metadata: Arc<EntityKeyMetadata>,

    /// Tuple holding the id columns and values of the duplicate
    pub id: Tuple,
}

impl fmt::Display for TupleAlreadyExists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tuple already exists in {} with id (", self.entity_key_metadata.table())?;
        for (i, column) in self.id.column_names().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match self.id.get(column) {
                Some(value) => write!(f, "{}={}", column, value)?,
                None => write!(f, "{}=<null>", column)?,
            }
        }
        write!(f, ")")
    }
}

impl std::error::Error for TupleAlreadyExists {}

impl From<TupleAlreadyExists> for Error {
    fn from(err: TupleAlreadyExists) -> Self {
        Self::TupleAlreadyExists(Box::new(err))
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid key error
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create an invalid query error
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// Create a generic dialect error
    pub fn dialect(msg: impl Into<String>) -> Self {
        Self::Dialect(GridDialectError::new(msg))
    }

    /// Create a duplicate insert error
    pub fn tuple_already_exists(entity_key_metadata: Arc<EntityKeyMetadata>, id: Tuple) -> Self {
        TupleAlreadyExists { entity_key_metadata, id }.into()
    }

    /// Check if this error reports a duplicate entity key
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Error::TupleAlreadyExists(_))
    }

    /// Duplicate insert payload, if this is a duplicate key error
    pub fn as_tuple_already_exists(&self) -> Option<&TupleAlreadyExists> {
        match self {
            Error::TupleAlreadyExists(payload) => Some(payload),
            _ => None,
        }
    }

    /// Check if this is a retryable error
    ///
    /// The bridge has no knowledge of whether a native call is safe to repeat,
    /// so nothing is ever reported as retryable.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
