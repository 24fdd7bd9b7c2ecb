//! Error types and result types for gateway and driver operations.
//!
//! Every store-facing call is fail-fast: errors surface to the immediate caller and
//! nothing is retried internally. Use [`DocumentStoreResult<T>`] as the return type
//! for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when talking to a document store
/// through a gateway.
///
/// Translation and identifier coercion are pure and never produce these; they only
/// come from argument validation, the wire driver, or the gateway's own bookkeeping.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Malformed arguments, detected locally before anything reaches the store.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// The connection to the store could not be established.
    ///
    /// Carries the driver's message and, when the driver reports one, its error code.
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        code: Option<i32>,
    },
    /// The store rejected a query or did not acknowledge a write.
    #[error("Query error: {0}")]
    Query(String),
    /// A save targeted an identifier that does not exist in the collection.
    #[error("Consistency error: {0}")]
    Consistency(String),
    /// Misuse of the emulated transaction flag (e.g. rollback without begin).
    #[error("Transaction error: {0}")]
    Transaction(String),
    /// The gateway or adapter could not be set up.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// Serialization/deserialization error when converting between formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DocumentStoreError {
    /// Builds a [`DocumentStoreError::Connection`] from a message and optional code.
    pub fn connection(message: impl Into<String>, code: Option<i32>) -> Self {
        DocumentStoreError::Connection {
            message: message.into(),
            code,
        }
    }

    /// Builds a [`DocumentStoreError::Query`] from any displayable diagnostic.
    pub fn query(diagnostic: impl std::fmt::Display) -> Self {
        DocumentStoreError::Query(diagnostic.to_string())
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
