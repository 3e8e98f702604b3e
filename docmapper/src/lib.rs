//! Main docmapper crate: a document mapper with composable record behaviors.
//!
//! This crate is the primary entry point. It re-exports the core types from the sub-crates,
//! the `#[derive(Schema)]` macro and the available store backends.
//!
//! # Features
//!
//! - **Records with a lifecycle** - new, persisted and destroyed, with saves, updates and reloads
//! - **Composable behaviors** - schema, dirty tracking, validations, callbacks and query logging
//!   installed per record type in a checked order
//! - **Options-driven finders** - ids, conditions, order, limit, offset, projection and store hints
//!   compiled through one place
//! - **Single-collection inheritance** - child record types share the parent's collection,
//!   scoped by a `_type` key
//! - **Multiple backends** - in-memory for development and tests, MongoDB behind a feature
//!
//! # Quick Start
//!
//! ```ignore
//! use docmapper::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!
//!     let people = store.model(
//!         DocumentModel::new("people")
//!             .key("name", FieldType::String)
//!             .key_with_default("age", FieldType::Int, 0)
//!             .validations(Validations::new().presence_of("name"))
//!             .logger(Level::DEBUG)
//!             .into_definition()?,
//!     );
//!
//!     let mut alice = people.new_record(doc! { "name": "Alice", "age": 30 });
//!     alice.save().await?;
//!
//!     let adults = people
//!         .all(FindOptions::builder().condition("age", doc! { "$gte": 18 }).order("name").build())
//!         .await?;
//!     println!("found {} adults", adults.len());
//!
//!     alice.destroy().await?;
//!     store.shutdown().await
//! }
//! ```
//!
//! # Deriving a schema
//!
//! ```ignore
//! use docmapper::{prelude::*, Schema};
//!
//! #[derive(Schema)]
//! struct Person {
//!     name: String,
//!     age: Option<i32>,
//! }
//!
//! let definition = DocumentModel::new("people").keys_from::<Person>().into_definition()?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as docmapper;

pub mod prelude;

pub use docmapper_core::{backend, criteria, error, model, plugin, plugins, query, record, registry, store};
pub use docmapper_macros::Schema;

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmapper_memory::{InMemoryStore, InMemoryStoreBuilder, StoreStats};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmapper_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
