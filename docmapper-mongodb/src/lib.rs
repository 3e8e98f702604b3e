//! MongoDB backend for docmapper.
//!
//! Implements [`StoreBackend`](docmapper_core::backend::StoreBackend) on top of the official
//! async driver. Filter expressions are translated to MongoDB query documents, ordering and
//! projection map onto driver find options, and identity assignment is left to the server.
//!
//! Enable it through the `mongodb` feature of the `docmapper` crate:
//!
//! ```toml
//! [dependencies]
//! docmapper = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docmapper::{prelude::*, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::new(
//!         MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!             .build()
//!             .await?,
//!     );
//!
//!     store.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod query;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
