//! Error types and result types for document mapper operations.
//!
//! Every fallible operation in this crate returns [`DocumentStoreResult<T>`]. Validation
//! failures from a plain `save` are folded into its boolean result and never surface here;
//! store errors are passed through unchanged.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::plugins::validations::ValidationErrors;

/// Represents all possible errors raised by the mapper or its store backends.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// One or more requested documents could not be found.
    ///
    /// `found` and `expected` describe partial results of bulk lookups; a single-document
    /// lookup reports `found: 0, expected: 1`.
    #[error("Document not found in collection {collection}: {detail}")]
    DocumentNotFound {
        collection: String,
        detail: String,
        found: usize,
        expected: usize,
    },
    /// A strict save was rejected by validation.
    #[error("Document not valid: {0}")]
    DocumentNotValid(ValidationErrors),
    /// The caller used an operation incorrectly. Raised before any store interaction.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The document violates structural expectations (e.g. a non-document where one is required).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A behavior module was installed before a module it depends on.
    #[error("Plugin {plugin} requires {requires} to be installed first")]
    PluginDependency { plugin: String, requires: String },
    /// The same behavior module was installed twice on one record type.
    #[error("Plugin {0} is already installed")]
    DuplicatePlugin(String),
    /// An operation needs a capability no installed module provides.
    #[error("No installed plugin provides {0}")]
    MissingPlugin(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    pub(crate) fn not_found(collection: &str, detail: impl Into<String>) -> Self {
        DocumentStoreError::DocumentNotFound {
            collection: collection.to_string(),
            detail: detail.into(),
            found: 0,
            expected: 1,
        }
    }

    /// Returns `true` for [`DocumentStoreError::DocumentNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentStoreError::DocumentNotFound { .. })
    }
}

/// A specialized `Result` type for document mapper operations.
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
