//! A document mapper that binds typed, in-memory records to documents in a schemaless store.
//!
//! This crate is the core of the docmapper project and provides:
//!
//! - **Store client abstraction** ([`backend`]) - The narrow surface the mapper needs from a store
//! - **Query options and AST** ([`query`]) - Options structs, filter expressions and compiled criteria
//! - **Criteria compiler** ([`criteria`]) - The single translation from query options to store criteria
//! - **Behavior registry** ([`registry`], [`plugin`]) - Ordered, composable behavior modules per record type
//! - **Records** ([`record`]) - The record lifecycle: new, persisted, destroyed
//! - **Finder façade** ([`model`]) - Every public finder, counter, deleter and updater
//! - **Built-in modules** ([`plugins`]) - Schema, dirty tracking, validations, callbacks, query logging
//! - **Document store** ([`store`]) - Binds record types to a backend
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use docmapper::prelude::*;
//! use bson::doc;
//!
//! let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//! let people = store.model(
//!     DocumentModel::new("people")
//!         .key("name", FieldType::String)
//!         .key("age", FieldType::Int)
//!         .validations(Validations::new().presence_of("name"))
//!         .into_definition()?,
//! );
//!
//! let mut alice = people.new_record(doc! { "name": "Alice", "age": 30 });
//! alice.save().await?;
//!
//! let found = people.find_or_fail(alice.id().cloned().unwrap_or_default()).await?;
//! ```

pub mod backend;
pub mod criteria;
pub mod error;
pub mod model;
pub mod plugin;
pub mod plugins;
pub mod query;
pub mod record;
pub mod registry;
pub mod store;
