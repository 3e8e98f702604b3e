//! In-memory document storage backend for docmapper.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is the reference backend for
//! development and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Full criteria support** - Filtering with dotted paths, multi-key sorting, offset, limit and projection
//! - **Store-assigned identity** - Documents saved without `_id` get a fresh `ObjectId`
//! - **Unique indexes** - Index specs are recorded and unique ones are enforced on save
//! - **Call counters** - [`StoreStats`] reports how many calls of each kind were served
//!
//! # Quick Start
//!
//! ```ignore
//! use docmapper::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let store = DocumentStore::new(backend);
//!     let users = store.model(DocumentModel::new("users").key("name", FieldType::String).into_definition()?);
//!
//!     users.create(doc! { "name": "Alice" }).await?;
//!     assert_eq!(users.count(&FindOptions::new()).await?, 1);
//!
//!     Ok(())
//! }
//! ```

pub mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder, StoreStats};
