//! Convenient re-exports of commonly used types from docmapper.
//!
//! ```ignore
//! use docmapper::prelude::*;
//! ```

pub use docmapper_core::{
    backend::{DynStoreBackend, StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    model::{Model, RecordStream},
    plugin::{FinderLayer, LifecycleEvent, Next, Plugin},
    plugins::{
        DocumentModel,
        callbacks::Callbacks,
        keys::{FieldType, HasSchema, Schema},
        query_logger::QueryRuntime,
        validations::{ValidationErrors, Validations},
    },
    query::{Expr, Filter, FindOptions, IndexSpec, Sort, SortDirection},
    record::{Lifecycle, Record, SaveOptions},
    registry::{ModelDefinition, TYPE_FIELD},
    store::DocumentStore,
};
pub use docmapper_macros::Schema;
pub use docmapper_memory::InMemoryStore;
pub use tracing::Level;
