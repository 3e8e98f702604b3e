//! Built-in behavior modules and the standard record type preset.
//!
//! | module | requires | contributes |
//! |---|---|---|
//! | [`keys`] | | schema state, defaults, type checks |
//! | [`dirty`] | `keys` | changed-field tracking |
//! | [`logger`] | | per-type logger handle |
//! | [`querying`] | | terminal finder layer |
//! | [`validations`] | | validation rules |
//! | [`callbacks`] | `validations` | lifecycle callbacks |
//! | [`query_logger`] | `logger`, `querying` | finder timing and logging |
//!
//! [`DocumentModel`] installs them in that order, with user modules between `callbacks`
//! and `query_logger`, so instrumentation is always the outermost finder layer.

pub mod callbacks;
pub mod dirty;
pub mod keys;
pub mod logger;
pub mod query_logger;
pub mod querying;
pub mod validations;

use bson::Bson;
use std::sync::Arc;
use tracing::Level;

use crate::{
    error::DocumentStoreResult,
    plugin::Plugin,
    registry::ModelDefinition,
};
use callbacks::Callbacks;
use dirty::Dirty;
use keys::{FieldType, HasSchema, Keys};
use logger::Logger;
use query_logger::QueryLogger;
use querying::Querying;
use validations::Validations;

/// A record type with the standard module stack.
///
/// ```ignore
/// let definition = DocumentModel::new("people")
///     .key("name", FieldType::String)
///     .key_with_default("age", FieldType::Int, 0)
///     .validations(Validations::new().presence_of("name"))
///     .logger(Level::DEBUG)
///     .into_definition()?;
/// ```
#[derive(Debug, Clone)]
pub struct DocumentModel {
    name: String,
    collection: Option<String>,
    keys: Keys,
    logger: Logger,
    validations: Validations,
    callbacks: Callbacks,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl DocumentModel {
    pub fn new(name: impl Into<String>) -> Self {
        DocumentModel {
            name: name.into(),
            collection: None,
            keys: Keys::new(),
            logger: Logger::disabled(),
            validations: Validations::new(),
            callbacks: Callbacks::new(),
            plugins: Vec::new(),
        }
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn key(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.keys = self.keys.key(name, field_type);
        self
    }

    pub fn key_with_default(mut self, name: impl Into<String>, field_type: FieldType, default: impl Into<Bson>) -> Self {
        self.keys = self
            .keys
            .key_with_default(name, field_type, default);
        self
    }

    /// Replaces the declared keys with the schema of `T`.
    pub fn keys_from<T: HasSchema>(mut self) -> Self {
        self.keys = Keys::from_type::<T>();
        self
    }

    pub fn validations(mut self, validations: Validations) -> Self {
        self.validations = validations;
        self
    }

    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn logger(mut self, level: Level) -> Self {
        self.logger = Logger::new(level);
        self
    }

    /// Adds a user module, installed after `callbacks` and before `query_logger`.
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Installs the module stack.
    ///
    /// # Errors
    ///
    /// Fails if a user module is a duplicate or depends on a module that is not installed
    /// before it.
    pub fn into_definition(self) -> DocumentStoreResult<ModelDefinition> {
        let mut builder = ModelDefinition::builder(self.name);

        if let Some(collection) = self.collection {
            builder = builder.collection(collection);
        }

        builder = builder
            .install(self.keys)?
            .install(Dirty)?
            .install(self.logger)?
            .install(Querying)?
            .install(self.validations)?
            .install(self.callbacks)?;

        for plugin in self.plugins {
            builder = builder.install_shared(plugin)?;
        }

        Ok(builder.install(QueryLogger)?.build())
    }
}
