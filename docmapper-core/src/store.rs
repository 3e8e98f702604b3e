//! The document store: the entry point that binds record types to a backend.
//!
//! # Example
//!
//! ```ignore
//! use docmapper::{store::DocumentStore, memory::InMemoryStore, prelude::*};
//!
//! let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//! let users = store.model(DocumentModel::new("users").key("name", FieldType::String).into_definition()?);
//! ```

use std::sync::Arc;

use crate::{
    backend::{DynStoreBackend, StoreBackend},
    error::DocumentStoreResult,
    model::Model,
    registry::ModelDefinition,
};

/// A store backend shared by every record type bound through it.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    backend: Arc<dyn DynStoreBackend>,
}

impl DocumentStore {
    /// Creates a document store with the given backend.
    pub fn new<B: StoreBackend + 'static>(backend: B) -> Self {
        DocumentStore { backend: Arc::new(backend) }
    }

    /// Creates a document store from an already shared backend.
    pub fn from_shared(backend: Arc<dyn DynStoreBackend>) -> Self {
        DocumentStore { backend }
    }

    /// Binds a record type to this store.
    pub fn model(&self, definition: ModelDefinition) -> Model {
        Model::new(definition, self.backend.clone())
    }

    pub fn backend(&self) -> &Arc<dyn DynStoreBackend> {
        &self.backend
    }

    /// Downcasts the backend to its concrete type.
    ///
    /// # Returns
    ///
    /// `None` if the backend is not a `B`.
    pub fn backend_as<B: StoreBackend + 'static>(&self) -> Option<&B> {
        self.backend
            .as_any()
            .downcast_ref::<B>()
    }

    /// Shuts down the backend.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the backend while releasing its resources.
    pub async fn shutdown(&self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}
