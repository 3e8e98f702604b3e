//! Records and their lifecycle.
//!
//! A [`Record`] is an in-memory attribute map bound to a [`Model`]. It moves through the
//! states `New -> Persisted -> Destroyed`; `Destroyed` is terminal and a record never
//! returns to `New` once stored.
//!
//! ```ignore
//! let mut user = users.new_record(doc! { "name": "Alice" });
//! assert!(user.is_new());
//!
//! user.save().await?;
//! assert!(user.is_persisted());
//!
//! user.destroy().await?;
//! assert!(user.is_destroyed());
//! ```

use bson::{
    Bson, Document,
    de::{deserialize_from_bson, deserialize_from_document},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    model::Model,
    plugin::{Extensions, LifecycleEvent},
    plugins::{dirty::ChangedFields, validations::ValidationErrors},
    query::{Filter, ID_FIELD},
    registry::TYPE_FIELD,
};

/// Position of a record in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Never stored; has no identity unless the caller supplied one.
    New,
    /// Stored at least once.
    Persisted,
    /// Deleted. No further store operations are allowed.
    Destroyed,
}

/// Options for [`Record::save_with`].
#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    pub validate: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        SaveOptions { validate: true }
    }
}

/// An in-memory record mapped to one document.
#[derive(Debug)]
pub struct Record {
    model: Model,
    attributes: Document,
    new: bool,
    destroyed: bool,
    errors: ValidationErrors,
    extensions: Extensions,
}

impl Record {
    fn bare(model: Model, attributes: Document, new: bool) -> Self {
        Record {
            model,
            attributes,
            new,
            destroyed: false,
            errors: ValidationErrors::default(),
            extensions: Extensions::new(),
        }
    }

    /// Builds a new record and assigns `attributes` through the attribute setters.
    pub(crate) fn instantiate(model: Model, attributes: Document) -> Self {
        let mut record = Record::bare(model, Document::new(), true);
        record.run_construct_hooks();

        if let Some(tag) = record
            .model
            .definition()
            .type_tag()
            .map(str::to_string)
        {
            // The tag is bookkeeping, not a user change, so it bypasses observers.
            record.attributes_mut().insert(TYPE_FIELD, tag);
        }

        record.set_attributes(attributes);
        record
    }

    /// Materializes a record from a stored document.
    pub(crate) fn load(model: Model, document: Document) -> Self {
        let mut record = Record::bare(model, document, false);
        record.run_construct_hooks();
        record.clear_changes();
        record
    }

    fn run_construct_hooks(&mut self) {
        let model = self.model.clone();

        for entry in model.definition().construct_hooks() {
            entry.hook.construct(self);
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The identity, once assigned.
    pub fn id(&self) -> Option<&Bson> {
        self.attributes.get(ID_FIELD)
    }

    pub fn get(&self, field: &str) -> Option<&Bson> {
        self.attributes.get(field)
    }

    /// Reads an attribute into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Serialization`] if the attribute does not deserialize into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> DocumentStoreResult<Option<T>> {
        self.attributes
            .get(field)
            .cloned()
            .map(deserialize_from_bson)
            .transpose()
            .map_err(Into::into)
    }

    /// Writes an attribute, notifying attribute observers.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Bson>) {
        let field = field.into();
        let old = self
            .attributes
            .insert(field.clone(), value.into());

        self.notify(&field, old.as_ref());
    }

    /// Removes an attribute, returning its value.
    pub fn unset(&mut self, field: &str) -> Option<Bson> {
        let old = self.attributes.remove(field);

        if old.is_some() {
            self.notify(field, old.as_ref());
        }

        old
    }

    pub fn set_attributes(&mut self, attributes: Document) {
        for (field, value) in attributes {
            self.set(field, value);
        }
    }

    fn notify(&mut self, field: &str, old: Option<&Bson>) {
        let model = self.model.clone();

        for entry in model.definition().attribute_observers() {
            entry
                .hook
                .attribute_changed(&mut self.extensions, field, old, self.attributes.get(field));
        }
    }

    pub fn attributes(&self) -> &Document {
        &self.attributes
    }

    /// Mutable access to the attribute map that bypasses attribute observers.
    ///
    /// Intended for construction hooks applying defaults.
    pub fn attributes_mut(&mut self) -> &mut Document {
        &mut self.attributes
    }

    pub fn into_attributes(self) -> Document {
        self.attributes
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn is_new(&self) -> bool {
        self.new
    }

    pub fn is_persisted(&self) -> bool {
        !self.new && !self.destroyed
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.destroyed {
            Lifecycle::Destroyed
        } else if self.new {
            Lifecycle::New
        } else {
            Lifecycle::Persisted
        }
    }

    /// Fields changed since the record was loaded or last saved.
    pub fn changed_fields(&self) -> Vec<String> {
        self.extensions
            .get::<ChangedFields>()
            .map(ChangedFields::fields)
            .unwrap_or_default()
    }

    pub fn is_changed(&self) -> bool {
        self.extensions
            .get::<ChangedFields>()
            .is_some_and(|changes| !changes.is_empty())
    }

    pub fn is_field_changed(&self, field: &str) -> bool {
        self.extensions
            .get::<ChangedFields>()
            .is_some_and(|changes| changes.contains(field))
    }

    /// Value of `field` before the current unsaved changes.
    pub fn original_value(&self, field: &str) -> Option<&Bson> {
        match self
            .extensions
            .get::<ChangedFields>()
            .and_then(|changes| changes.original(field))
        {
            Some(original) => original,
            None => self.attributes.get(field),
        }
    }

    pub fn clear_changes(&mut self) {
        if let Some(changes) = self.extensions.get_mut::<ChangedFields>() {
            changes.clear();
        }
    }

    /// Runs validation hooks and validators, replacing [`Record::errors`].
    pub fn is_valid(&mut self) -> bool {
        let model = self.model.clone();
        self.errors = ValidationErrors::default();

        if !self.run_before(&model, LifecycleEvent::Validation) {
            return false;
        }

        let mut errors = ValidationErrors::default();
        for entry in model.definition().validators() {
            entry.hook.validate(self, &mut errors);
        }
        self.errors = errors;

        self.run_after(&model, LifecycleEvent::Validation);
        self.errors.is_empty()
    }

    /// Errors from the last validation run.
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Adds a validation error outside of the validators, e.g. from a lifecycle hook.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.add(field, message);
    }

    pub fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(serde_json::to_value(&self.attributes)?)
    }

    /// Deserializes the attributes into a typed value.
    pub fn deserialize<T: DeserializeOwned>(&self) -> DocumentStoreResult<T> {
        Ok(deserialize_from_document(self.attributes.clone())?)
    }

    fn run_before(&mut self, model: &Model, event: LifecycleEvent) -> bool {
        for entry in model.definition().lifecycle_hooks() {
            if !entry.hook.before(event, self) {
                trace!(
                    target: "docmapper::record",
                    model = model.name(),
                    plugin = entry.plugin,
                    ?event,
                    "halted by before hook",
                );
                return false;
            }
        }

        true
    }

    fn run_after(&mut self, model: &Model, event: LifecycleEvent) {
        for entry in model.definition().lifecycle_hooks() {
            entry.hook.after(event, self);
        }
    }

    /// Saves the record, validating first. Returns `false` if validation fails or a before
    /// hook halts the save; the store is not contacted in that case.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::InvalidArgument`] if the record is destroyed
    /// - any error raised by the store backend
    pub async fn save(&mut self) -> DocumentStoreResult<bool> {
        self.save_with(SaveOptions::default()).await
    }

    pub async fn save_with(&mut self, options: SaveOptions) -> DocumentStoreResult<bool> {
        if self.destroyed {
            return Err(DocumentStoreError::InvalidArgument(format!(
                "cannot save a destroyed {} record",
                self.model.name()
            )));
        }

        if options.validate && !self.is_valid() {
            return Ok(false);
        }

        let model = self.model.clone();
        let event = if self.new { LifecycleEvent::Create } else { LifecycleEvent::Update };

        if !self.run_before(&model, LifecycleEvent::Save) || !self.run_before(&model, event) {
            return Ok(false);
        }

        let id = model
            .backend()
            .save(model.collection(), self.attributes.clone())
            .await?;

        if !self.attributes.contains_key(ID_FIELD) {
            let mut attributes = Document::new();
            attributes.insert(ID_FIELD, id.clone());
            attributes.extend(std::mem::take(&mut self.attributes));
            self.attributes = attributes;
        }

        self.new = false;
        self.clear_changes();

        self.run_after(&model, event);
        self.run_after(&model, LifecycleEvent::Save);

        trace!(target: "docmapper::record", model = model.name(), %id, ?event, "saved record");

        Ok(true)
    }

    /// Saves the record, raising [`DocumentStoreError::DocumentNotValid`] instead of
    /// returning `false`.
    pub async fn save_or_fail(&mut self) -> DocumentStoreResult<()> {
        if self.save().await? {
            Ok(())
        } else {
            Err(DocumentStoreError::DocumentNotValid(self.errors.clone()))
        }
    }

    /// Assigns `attributes` and saves.
    pub async fn update_attributes(&mut self, attributes: Document) -> DocumentStoreResult<bool> {
        self.set_attributes(attributes);
        self.save().await
    }

    /// Runs destroy hooks, then deletes the record.
    ///
    /// Returns `false` if a before hook halted the destroy. Destroying an already destroyed
    /// record does nothing.
    pub async fn destroy(&mut self) -> DocumentStoreResult<bool> {
        if self.destroyed {
            return Ok(true);
        }

        let model = self.model.clone();

        if !self.run_before(&model, LifecycleEvent::Destroy) {
            return Ok(false);
        }

        self.delete().await?;
        self.run_after(&model, LifecycleEvent::Destroy);

        Ok(true)
    }

    /// Deletes the record without running hooks.
    ///
    /// A persisted record is removed from the store by identity; a new record is only
    /// marked destroyed. The store delete is issued at most once.
    pub async fn delete(&mut self) -> DocumentStoreResult<()> {
        if self.destroyed {
            return Ok(());
        }

        if !self.new {
            let id = self.id().cloned().ok_or_else(|| {
                DocumentStoreError::InvalidDocument(format!(
                    "persisted {} record has no {ID_FIELD}",
                    self.model.name()
                ))
            })?;

            self.model
                .backend()
                .remove(self.model.collection(), Some(Filter::eq(ID_FIELD, id.clone())))
                .await?;

            trace!(target: "docmapper::record", model = self.model.name(), %id, "deleted record");
        }

        self.destroyed = true;
        Ok(())
    }

    /// Replaces the attributes with the stored document and resets derived state.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::InvalidArgument`] if the record is new or destroyed
    /// - [`DocumentStoreError::DocumentNotFound`] if no document has this record's identity
    pub async fn reload(&mut self) -> DocumentStoreResult<()> {
        if self.destroyed || self.new {
            return Err(DocumentStoreError::InvalidArgument(format!(
                "cannot reload a {} {} record",
                if self.destroyed { "destroyed" } else { "new" },
                self.model.name(),
            )));
        }

        let model = self.model.clone();
        let id = self
            .id()
            .cloned()
            .ok_or_else(|| DocumentStoreError::InvalidDocument(format!("persisted {} record has no {ID_FIELD}", model.name())))?;

        let fresh = model
            .find_by_id(id.clone())
            .await?
            .ok_or_else(|| DocumentStoreError::not_found(model.collection(), format!("couldn't find document with id {id}")))?;

        self.attributes = fresh.into_attributes();

        for entry in model.definition().reload_hooks() {
            entry.hook.reset(self);
        }

        Ok(())
    }
}
