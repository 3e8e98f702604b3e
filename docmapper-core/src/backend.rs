//! Store client abstraction.
//!
//! The mapper needs only a narrow surface from a document store: fetch one, stream many,
//! count, remove by filter, save (returning the identity) and create indexes. The
//! [`StoreBackend`] trait is that surface. Errors raised by a backend are surfaced unchanged
//! to the caller of the mapper operation that triggered them.
//!
//! # Traits
//!
//! - [`StoreBackend`]: the store client contract
//! - [`DynStoreBackend`]: object-safe view used by bound record types, with downcasting
//! - [`StoreBackendBuilder`]: factory trait for creating backend instances

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::BoxStream;
use std::{any::Any, fmt::Debug};

use crate::{
    error::DocumentStoreResult,
    query::{Criteria, Expr, IndexSpec},
};

/// A lazy, finite, non-restartable stream of raw documents.
pub type DocumentStream = BoxStream<'static, DocumentStoreResult<Document>>;

/// Abstract interface for document store clients.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. The mapper never issues concurrent calls on behalf
/// of a single record, but several record types may share one backend.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Fetches the first document matching `criteria`, honouring sort, offset and projection.
    async fn find_one(&self, collection: &str, criteria: Criteria) -> DocumentStoreResult<Option<Document>>;

    /// Streams every document matching `criteria`.
    ///
    /// The stream is consumed at most once; results are not materialized up front by the
    /// caller.
    async fn find(&self, collection: &str, criteria: Criteria) -> DocumentStoreResult<DocumentStream>;

    /// Counts documents matching `filter`. Modifiers never affect a count.
    async fn count(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64>;

    /// Removes every document matching `filter` and returns how many were removed.
    async fn remove(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64>;

    /// Inserts or replaces a document and returns its identity.
    ///
    /// When the document carries no `_id`, the backend assigns one.
    async fn save(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson>;

    /// Creates an index on a collection.
    async fn create_index(&self, collection: &str, index: IndexSpec) -> DocumentStoreResult<()>;

    /// Releases backend resources. The default implementation is a no-op.
    async fn shutdown(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

/// Object-safe backend handle shared by every record type bound to a store.
///
/// Blanket-implemented for every [`StoreBackend`]; adds downcasting back to the concrete
/// backend type.
pub trait DynStoreBackend: StoreBackend {
    fn as_any(&self) -> &dyn Any;
}

impl<B: StoreBackend + 'static> DynStoreBackend for B {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
