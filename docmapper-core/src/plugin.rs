//! Behavior modules and the capabilities they can contribute to a record type.
//!
//! A [`Plugin`] is a named, stateless unit of behavior. When installed on a
//! [`ModelDefinition`](crate::registry::ModelDefinition) its [`Plugin::install`] runs once and
//! registers capabilities through the [`Installer`]:
//!
//! - [`FinderLayer`]: wraps the finder operations; composes as a middleware chain
//! - [`ConstructHook`]: runs on every record instance the type constructs or loads
//! - [`Validator`]: contributes to validation gating
//! - [`LifecycleHook`]: before/after hooks around validation, save, create, update, destroy
//! - [`AttributeObserver`]: notified on every attribute write
//! - [`ReloadHook`]: resets derived per-instance state after a reload
//!
//! Capabilities are collected when the type is defined; nothing is looked up per call.

use async_trait::async_trait;
use bson::Bson;
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt::{self, Debug},
    sync::Arc,
};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    model::Model,
    plugins::validations::ValidationErrors,
    query::FindOptions,
    record::Record,
    registry::Installer,
};

/// A composable unit of class-level and instance-level behavior.
pub trait Plugin: Send + Sync + Debug {
    /// Unique name of the module within a record type.
    fn name(&self) -> &'static str;

    /// Names of modules that must already be installed.
    fn requires(&self) -> &'static [&'static str] {
        &[]
    }

    /// Initializer, run once when the module is installed on a type.
    fn install(&self, installer: &mut Installer<'_>) -> DocumentStoreResult<()>;
}

/// A capability tagged with the module that registered it.
#[derive(Debug)]
pub struct Registered<T: ?Sized> {
    pub plugin: &'static str,
    pub hook: Arc<T>,
}

impl<T: ?Sized> Clone for Registered<T> {
    fn clone(&self) -> Self {
        Registered { plugin: self.plugin, hook: self.hook.clone() }
    }
}

/// A layer around the finder operations.
///
/// Each method receives a [`Next`] handle that invokes the previously installed layer; a
/// layer that does not override a method passes straight through. The module installed last
/// is the outermost layer.
#[async_trait]
pub trait FinderLayer: Send + Sync + Debug {
    async fn find_one(
        &self,
        _model: &Model,
        options: &FindOptions,
        next: Next<'_>,
    ) -> DocumentStoreResult<Option<Record>> {
        next.find_one(options).await
    }

    async fn find_many(
        &self,
        _model: &Model,
        options: &FindOptions,
        next: Next<'_>,
    ) -> DocumentStoreResult<Vec<Record>> {
        next.find_many(options).await
    }

    async fn count(
        &self,
        _model: &Model,
        options: &FindOptions,
        next: Next<'_>,
    ) -> DocumentStoreResult<u64> {
        next.count(options).await
    }
}

/// Handle to the rest of a finder chain.
pub struct Next<'a> {
    model: &'a Model,
    layers: &'a [Registered<dyn FinderLayer>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(model: &'a Model, layers: &'a [Registered<dyn FinderLayer>]) -> Self {
        Next { model, layers }
    }

    fn split(self) -> DocumentStoreResult<(&'a Registered<dyn FinderLayer>, Next<'a>)> {
        match self.layers.split_last() {
            Some((outer, rest)) => Ok((outer, Next { model: self.model, layers: rest })),
            None => Err(DocumentStoreError::MissingPlugin("a finder".to_string())),
        }
    }

    pub async fn find_one(self, options: &FindOptions) -> DocumentStoreResult<Option<Record>> {
        let model = self.model;
        let (layer, next) = self.split()?;
        layer.hook.find_one(model, options, next).await
    }

    pub async fn find_many(self, options: &FindOptions) -> DocumentStoreResult<Vec<Record>> {
        let model = self.model;
        let (layer, next) = self.split()?;
        layer.hook.find_many(model, options, next).await
    }

    pub async fn count(self, options: &FindOptions) -> DocumentStoreResult<u64> {
        let model = self.model;
        let (layer, next) = self.split()?;
        layer.hook.count(model, options, next).await
    }
}

/// Runs on every record instance, new or loaded, right after its attributes are in place.
pub trait ConstructHook: Send + Sync + Debug {
    fn construct(&self, record: &mut Record);
}

/// Adds validation errors for a record.
pub trait Validator: Send + Sync + Debug {
    fn validate(&self, record: &Record, errors: &mut ValidationErrors);
}

/// Phases of the record lifecycle that hooks can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Validation,
    Save,
    Create,
    Update,
    Destroy,
}

/// Hooks around lifecycle phases.
///
/// Returning `false` from [`LifecycleHook::before`] halts the operation.
pub trait LifecycleHook: Send + Sync + Debug {
    fn before(&self, _event: LifecycleEvent, _record: &mut Record) -> bool {
        true
    }

    fn after(&self, _event: LifecycleEvent, _record: &mut Record) {}
}

/// Observes attribute writes. `new` is `None` when the attribute is removed.
pub trait AttributeObserver: Send + Sync + Debug {
    fn attribute_changed(
        &self,
        extensions: &mut Extensions,
        field: &str,
        old: Option<&Bson>,
        new: Option<&Bson>,
    );
}

/// Resets derived per-instance state once a record has been reloaded from the store.
pub trait ReloadHook: Send + Sync + Debug {
    fn reset(&self, record: &mut Record);
}

/// A type-keyed map of state slots.
///
/// Record types use it for per-type module state (loggers, accumulators, schemas); records
/// use it for per-instance module state (changed fields).
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Extensions::default()
    }

    /// Inserts a value, returning the previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|previous| previous.downcast::<T>().ok())
            .map(|previous| *previous)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}
