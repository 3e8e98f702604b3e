//! The behavior registry.
//!
//! A [`ModelDefinition`] is the descriptor of a record type: its name, the collection it
//! maps to, and the ordered list of behavior modules installed on it together with the
//! capabilities those modules registered. The resulting contract is a pure function of the
//! ordered module list.
//!
//! ```ignore
//! use docmapper::registry::ModelDefinition;
//! use docmapper::plugins::{keys::{Keys, FieldType}, dirty::Dirty, querying::Querying};
//!
//! let definition = ModelDefinition::builder("users")
//!     .install(Keys::new().key("name", FieldType::String))?
//!     .install(Dirty)?
//!     .install(Querying)?
//!     .build();
//! ```
//!
//! Dependency violations (e.g. installing `dirty` before `keys`) fail here, when the type is
//! defined, never later at runtime.

use std::{any::type_name, sync::Arc};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    plugin::{
        AttributeObserver, ConstructHook, Extensions, FinderLayer, LifecycleHook, Plugin, Registered,
        ReloadHook, Validator,
    },
    plugins::keys::Schema,
};

pub const TYPE_FIELD: &str = "_type";

/// Descriptor of a record type.
#[derive(Debug)]
pub struct ModelDefinition {
    name: String,
    collection: String,
    parent: Option<String>,
    plugins: Vec<Arc<dyn Plugin>>,
    state: Extensions,
    finder_layers: Vec<Registered<dyn FinderLayer>>,
    construct_hooks: Vec<Registered<dyn ConstructHook>>,
    validators: Vec<Registered<dyn Validator>>,
    lifecycle_hooks: Vec<Registered<dyn LifecycleHook>>,
    attribute_observers: Vec<Registered<dyn AttributeObserver>>,
    reload_hooks: Vec<Registered<dyn ReloadHook>>,
}

impl ModelDefinition {
    fn empty(name: String, collection: String, parent: Option<String>) -> Self {
        ModelDefinition {
            name,
            collection,
            parent,
            plugins: Vec::new(),
            state: Extensions::new(),
            finder_layers: Vec::new(),
            construct_hooks: Vec::new(),
            validators: Vec::new(),
            lifecycle_hooks: Vec::new(),
            attribute_observers: Vec::new(),
            reload_hooks: Vec::new(),
        }
    }

    /// Starts a new record type. The collection name defaults to the type name.
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        let name = name.into();
        ModelBuilder { definition: ModelDefinition::empty(name.clone(), name, None) }
    }

    /// Starts a subtype bound to this type's collection.
    ///
    /// The parent's modules are re-installed in the same order, so the subtype begins with
    /// an identical contract and its own fresh per-type state.
    pub fn inherit(&self, name: impl Into<String>) -> DocumentStoreResult<ModelBuilder> {
        let mut builder = ModelBuilder {
            definition: ModelDefinition::empty(name.into(), self.collection.clone(), Some(self.name.clone())),
        };

        for plugin in &self.plugins {
            builder = builder.install_shared(plugin.clone())?;
        }

        Ok(builder)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Name of the type this one was inherited from.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins
            .iter()
            .map(|plugin| plugin.name())
            .collect()
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins
            .iter()
            .any(|plugin| plugin.name() == name)
    }

    /// Per-type state registered by an installed module.
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.state.get::<T>()
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.state::<Schema>()
    }

    /// The `_type` value stamped on new records, when the schema declares `_type`.
    pub fn type_tag(&self) -> Option<&str> {
        self.schema()
            .filter(|schema| schema.contains(TYPE_FIELD))
            .map(|_| self.name.as_str())
    }

    /// Whether queries of this type are scoped to its `_type` within a shared collection.
    pub fn is_single_collection_inherited(&self) -> bool {
        self.parent.is_some() && self.type_tag().is_some()
    }

    pub(crate) fn finder_layers(&self) -> &[Registered<dyn FinderLayer>] {
        &self.finder_layers
    }

    pub(crate) fn construct_hooks(&self) -> &[Registered<dyn ConstructHook>] {
        &self.construct_hooks
    }

    pub(crate) fn validators(&self) -> &[Registered<dyn Validator>] {
        &self.validators
    }

    pub(crate) fn lifecycle_hooks(&self) -> &[Registered<dyn LifecycleHook>] {
        &self.lifecycle_hooks
    }

    pub(crate) fn attribute_observers(&self) -> &[Registered<dyn AttributeObserver>] {
        &self.attribute_observers
    }

    pub(crate) fn reload_hooks(&self) -> &[Registered<dyn ReloadHook>] {
        &self.reload_hooks
    }

    /// Summarises which module provides which capability, in composition order.
    pub fn contract(&self) -> Contract {
        fn names<T: ?Sized>(list: &[Registered<T>]) -> Vec<&'static str> {
            list.iter().map(|entry| entry.plugin).collect()
        }

        Contract {
            collection: self.collection.clone(),
            plugins: self.plugin_names(),
            finder_layers: names(&self.finder_layers)
                .into_iter()
                .rev()
                .collect(),
            construct_hooks: names(&self.construct_hooks),
            validators: names(&self.validators),
            lifecycle_hooks: names(&self.lifecycle_hooks),
            attribute_observers: names(&self.attribute_observers),
            reload_hooks: names(&self.reload_hooks),
            state_slots: self.state.len(),
        }
    }
}

/// Comparable summary of a record type's composed behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    pub collection: String,
    pub plugins: Vec<&'static str>,
    /// Outermost layer first.
    pub finder_layers: Vec<&'static str>,
    pub construct_hooks: Vec<&'static str>,
    pub validators: Vec<&'static str>,
    pub lifecycle_hooks: Vec<&'static str>,
    pub attribute_observers: Vec<&'static str>,
    pub reload_hooks: Vec<&'static str>,
    pub state_slots: usize,
}

/// Builds a [`ModelDefinition`] by installing modules in order.
#[derive(Debug)]
pub struct ModelBuilder {
    definition: ModelDefinition,
}

impl ModelBuilder {
    /// Overrides the collection name.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.definition.collection = collection.into();
        self
    }

    /// Installs a behavior module after every module installed so far.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::DuplicatePlugin`] if a module with the same name is installed
    /// - [`DocumentStoreError::PluginDependency`] if a required module is not yet installed
    /// - any error returned by the module's initializer
    pub fn install(self, plugin: impl Plugin + 'static) -> DocumentStoreResult<Self> {
        self.install_shared(Arc::new(plugin))
    }

    pub fn install_shared(mut self, plugin: Arc<dyn Plugin>) -> DocumentStoreResult<Self> {
        let name = plugin.name();

        if self.definition.has_plugin(name) {
            return Err(DocumentStoreError::DuplicatePlugin(name.to_string()));
        }

        if let Some(missing) = plugin
            .requires()
            .iter()
            .find(|required| !self.definition.has_plugin(required))
        {
            return Err(DocumentStoreError::PluginDependency {
                plugin: name.to_string(),
                requires: missing.to_string(),
            });
        }

        plugin.install(&mut Installer { definition: &mut self.definition, plugin: name })?;
        self.definition.plugins.push(plugin);

        Ok(self)
    }

    pub fn build(self) -> ModelDefinition {
        self.definition
    }
}

/// Registration surface handed to [`Plugin::install`].
pub struct Installer<'a> {
    definition: &'a mut ModelDefinition,
    plugin: &'static str,
}

impl<'a> Installer<'a> {
    pub fn type_name(&self) -> &str {
        &self.definition.name
    }

    pub fn collection(&self) -> &str {
        &self.definition.collection
    }

    pub fn state<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.definition.state.get::<T>()
    }

    /// Per-type state a previously installed module must have registered.
    pub fn require_state<T: Send + Sync + 'static>(&self) -> DocumentStoreResult<&T> {
        self.definition
            .state
            .get::<T>()
            .ok_or_else(|| DocumentStoreError::PluginDependency {
                plugin: self.plugin.to_string(),
                requires: type_name::<T>().to_string(),
            })
    }

    pub fn set_state<T: Send + Sync + 'static>(&mut self, value: T) {
        self.definition.state.insert(value);
    }

    /// Registers this module's finder layer, replacing one it registered earlier.
    pub fn finder_layer(&mut self, layer: Arc<dyn FinderLayer>) {
        replace_or_push(&mut self.definition.finder_layers, self.plugin, layer);
    }

    /// Registers this module's instance-construction hook, replacing one it registered earlier.
    pub fn on_construct(&mut self, hook: Arc<dyn ConstructHook>) {
        replace_or_push(&mut self.definition.construct_hooks, self.plugin, hook);
    }

    pub fn validator(&mut self, validator: Arc<dyn Validator>) {
        self.definition
            .validators
            .push(Registered { plugin: self.plugin, hook: validator });
    }

    pub fn lifecycle_hook(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.definition
            .lifecycle_hooks
            .push(Registered { plugin: self.plugin, hook });
    }

    pub fn attribute_observer(&mut self, observer: Arc<dyn AttributeObserver>) {
        self.definition
            .attribute_observers
            .push(Registered { plugin: self.plugin, hook: observer });
    }

    pub fn on_reload(&mut self, hook: Arc<dyn ReloadHook>) {
        self.definition
            .reload_hooks
            .push(Registered { plugin: self.plugin, hook });
    }
}

fn replace_or_push<T: ?Sized>(list: &mut Vec<Registered<T>>, plugin: &'static str, hook: Arc<T>) {
    match list.iter_mut().find(|entry| entry.plugin == plugin) {
        Some(entry) => entry.hook = hook,
        None => list.push(Registered { plugin, hook }),
    }
}
