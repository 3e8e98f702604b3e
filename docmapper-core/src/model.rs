//! The finder façade.
//!
//! A [`Model`] is a record type bound to a store backend. Every public read goes through
//! one of the canonical entry points ([`Model::find_one`], [`Model::find_many`],
//! [`Model::count`], [`Model::stream`]); the first three run through the type's finder
//! layer chain, so instrumentation installed on the type sees all of them.
//!
//! ```ignore
//! let users = store.model(definition);
//!
//! let alice = users.find_or_fail(id).await?;
//! let adults = users
//!     .all(FindOptions::builder().condition("age", doc! { "$gte": 18 }).order("name").build())
//!     .await?;
//! let oldest = users.last(FindOptions::builder().order("age asc").build()).await?;
//! ```

use bson::{Bson, Document, ser::serialize_to_document};
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use serde::Serialize;
use std::{collections::HashSet, fmt, future::Future, sync::Arc};

use crate::{
    backend::DynStoreBackend,
    criteria::{self, invert_order},
    error::{DocumentStoreError, DocumentStoreResult},
    plugin::Next,
    plugins::query_logger::QueryRuntime,
    query::{Criteria, Expr, Filter, FindOptions, IdSelector, IndexSpec},
    record::Record,
    registry::{ModelDefinition, TYPE_FIELD},
};

/// A stream of materialized records.
pub type RecordStream = BoxStream<'static, DocumentStoreResult<Record>>;

/// A record type bound to a store backend. Cheap to clone.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

struct ModelInner {
    definition: ModelDefinition,
    backend: Arc<dyn DynStoreBackend>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name())
            .field("collection", &self.collection())
            .finish()
    }
}

impl Model {
    pub(crate) fn new(definition: ModelDefinition, backend: Arc<dyn DynStoreBackend>) -> Self {
        Model { inner: Arc::new(ModelInner { definition, backend }) }
    }

    pub fn name(&self) -> &str {
        self.inner.definition.name()
    }

    pub fn collection(&self) -> &str {
        self.inner.definition.collection()
    }

    pub fn definition(&self) -> &ModelDefinition {
        &self.inner.definition
    }

    pub fn backend(&self) -> &Arc<dyn DynStoreBackend> {
        &self.inner.backend
    }

    /// Per-type state registered by an installed module.
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.inner.definition.state::<T>()
    }

    /// Accumulated finder time, when the query logger is installed.
    pub fn query_runtime(&self) -> Option<&QueryRuntime> {
        self.state::<QueryRuntime>()
    }

    /// Compiles query options for this type.
    ///
    /// Subtypes sharing a collection through single-collection inheritance are scoped to
    /// their own `_type`.
    pub fn compile(&self, options: &FindOptions) -> DocumentStoreResult<Criteria> {
        let criteria = criteria::compile(options)?;

        Ok(match self.type_scope() {
            Some(scope) => criteria.and_filter(scope),
            None => criteria,
        })
    }

    fn type_scope(&self) -> Option<Expr> {
        self.inner
            .definition
            .is_single_collection_inherited()
            .then(|| Filter::eq(TYPE_FIELD, self.name()))
    }

    /// Canonical single-record finder.
    pub async fn find_one(&self, options: &FindOptions) -> DocumentStoreResult<Option<Record>> {
        Next::new(self, self.inner.definition.finder_layers())
            .find_one(options)
            .await
    }

    /// Canonical multi-record finder.
    pub async fn find_many(&self, options: &FindOptions) -> DocumentStoreResult<Vec<Record>> {
        Next::new(self, self.inner.definition.finder_layers())
            .find_many(options)
            .await
    }

    /// Counts matching documents. Order, limit and offset do not affect the result.
    pub async fn count(&self, options: &FindOptions) -> DocumentStoreResult<u64> {
        Next::new(self, self.inner.definition.finder_layers())
            .count(options)
            .await
    }

    pub async fn exists(&self, options: &FindOptions) -> DocumentStoreResult<bool> {
        Ok(self.count(options).await? != 0)
    }

    pub async fn find(&self, id: impl Into<Bson>) -> DocumentStoreResult<Option<Record>> {
        self.find_one(&FindOptions::by_id(id)).await
    }

    pub async fn find_by_id(&self, id: impl Into<Bson>) -> DocumentStoreResult<Option<Record>> {
        self.find(id).await
    }

    /// Finds a record by identity, narrowed by further options.
    pub async fn find_with(&self, id: impl Into<Bson>, mut options: FindOptions) -> DocumentStoreResult<Option<Record>> {
        options.ids = Some(IdSelector::One(id.into()));
        self.find_one(&options).await
    }

    /// Finds every record whose identity is in `ids`.
    ///
    /// Duplicate and null ids are dropped; with no ids left the store is not contacted.
    pub async fn find_some(&self, ids: Vec<Bson>) -> DocumentStoreResult<Vec<Record>> {
        let ids = distinct_ids(ids);

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.find_many(&FindOptions::by_ids(ids)).await
    }

    /// Like [`Model::find`], raising [`DocumentStoreError::DocumentNotFound`] on a miss.
    pub async fn find_or_fail(&self, id: impl Into<Bson>) -> DocumentStoreResult<Record> {
        let id = id.into();

        self.find(id.clone())
            .await?
            .ok_or_else(|| DocumentStoreError::not_found(self.collection(), format!("couldn't find document with id {id}")))
    }

    /// Like [`Model::find_some`], raising [`DocumentStoreError::DocumentNotFound`] unless
    /// every requested id resolved to a document.
    pub async fn find_some_or_fail(&self, ids: Vec<Bson>) -> DocumentStoreResult<Vec<Record>> {
        let ids = distinct_ids(ids);

        if ids.is_empty() {
            return Err(DocumentStoreError::DocumentNotFound {
                collection: self.collection().to_string(),
                detail: "couldn't find without an id".to_string(),
                found: 0,
                expected: 0,
            });
        }

        let records = self
            .find_many(&FindOptions::by_ids(ids.clone()))
            .await?;

        if records.len() != ids.len() {
            let requested = ids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");

            return Err(DocumentStoreError::DocumentNotFound {
                collection: self.collection().to_string(),
                detail: format!(
                    "couldn't find all of the ids ({requested}); found {}, expected {}",
                    records.len(),
                    ids.len()
                ),
                found: records.len(),
                expected: ids.len(),
            });
        }

        Ok(records)
    }

    pub async fn first(&self, options: FindOptions) -> DocumentStoreResult<Option<Record>> {
        self.find_one(&options).await
    }

    /// The last record in `options.order`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidArgument`] when the order names no field, since
    /// the store has no natural "last".
    pub async fn last(&self, mut options: FindOptions) -> DocumentStoreResult<Option<Record>> {
        let order = invert_order(options.order.as_deref().unwrap_or_default())?;

        // Blank or separator-only text parses to no sort keys at all.
        if order.is_empty() {
            return Err(DocumentStoreError::InvalidArgument(format!(
                "last on {} requires an order option",
                self.name()
            )));
        }

        options.order = Some(order);
        self.find_one(&options).await
    }

    pub async fn all(&self, options: FindOptions) -> DocumentStoreResult<Vec<Record>> {
        self.find_many(&options).await
    }

    /// Streams matching records one at a time.
    pub async fn stream(&self, options: &FindOptions) -> DocumentStoreResult<RecordStream> {
        let criteria = self.compile(options)?;
        let model = self.clone();

        let documents = self
            .backend()
            .find(self.collection(), criteria)
            .await?;

        Ok(documents
            .map_ok(move |document| Record::load(model.clone(), document))
            .boxed())
    }

    /// Visits matching records one at a time and returns how many were visited.
    pub async fn find_each<F, Fut>(&self, options: &FindOptions, mut visitor: F) -> DocumentStoreResult<u64>
    where
        F: FnMut(Record) -> Fut,
        Fut: Future<Output = DocumentStoreResult<()>>,
    {
        let mut records = self.stream(options).await?;
        let mut visited = 0;

        while let Some(record) = records.try_next().await? {
            visitor(record).await?;
            visited += 1;
        }

        Ok(visited)
    }

    /// First record matching `attributes`, or an unsaved record built from the declared
    /// fields among them.
    pub async fn first_or_new(&self, attributes: Document) -> DocumentStoreResult<Record> {
        let found = self
            .first(FindOptions::with_conditions(attributes.clone()))
            .await?;

        Ok(match found {
            Some(record) => record,
            None => self.new_record(self.declared_only(attributes)),
        })
    }

    /// Like [`Model::first_or_new`], saving the record when nothing matched.
    pub async fn first_or_create(&self, attributes: Document) -> DocumentStoreResult<Record> {
        let mut record = self.first_or_new(attributes).await?;

        if record.is_new() {
            record.save().await?;
        }

        Ok(record)
    }

    fn declared_only(&self, attributes: Document) -> Document {
        match self.inner.definition.schema() {
            Some(schema) => schema.filter_declared(attributes),
            None => attributes,
        }
    }

    /// Builds an unsaved record.
    pub fn new_record(&self, attributes: Document) -> Record {
        Record::instantiate(self.clone(), attributes)
    }

    /// Builds and saves a record. The record is returned even if validation failed; check
    /// [`Record::is_new`] or [`Record::errors`].
    pub async fn create(&self, attributes: Document) -> DocumentStoreResult<Record> {
        let mut record = self.new_record(attributes);
        record.save().await?;
        Ok(record)
    }

    /// Builds and saves a record, raising [`DocumentStoreError::DocumentNotValid`] on failure.
    pub async fn create_or_fail(&self, attributes: Document) -> DocumentStoreResult<Record> {
        let mut record = self.new_record(attributes);
        record.save_or_fail().await?;
        Ok(record)
    }

    pub async fn create_many(&self, attributes: Vec<Document>) -> DocumentStoreResult<Vec<Record>> {
        let mut records = Vec::with_capacity(attributes.len());

        for attributes in attributes {
            records.push(self.create(attributes).await?);
        }

        Ok(records)
    }

    /// Builds and saves a record from a serializable value.
    pub async fn create_from<T: Serialize>(&self, value: &T) -> DocumentStoreResult<Record> {
        self.create(serialize_to_document(value)?).await
    }

    /// Loads one record and updates it with `attributes`.
    pub async fn update(&self, id: impl Into<Bson>, attributes: Document) -> DocumentStoreResult<Record> {
        let id = id.into();

        if id == Bson::Null {
            return Err(DocumentStoreError::InvalidArgument(format!("update on {} requires an id", self.name())));
        }
        if attributes.is_empty() {
            return Err(DocumentStoreError::InvalidArgument(format!("update on {} requires attributes", self.name())));
        }

        let mut record = self.find_or_fail(id).await?;
        record.update_attributes(attributes).await?;
        Ok(record)
    }

    /// Applies [`Model::update`] to each `(id, attributes)` pair.
    ///
    /// Every pair is checked before the store is touched.
    pub async fn update_many(&self, updates: Vec<(Bson, Document)>) -> DocumentStoreResult<Vec<Record>> {
        for (position, (id, attributes)) in updates.iter().enumerate() {
            if *id == Bson::Null {
                return Err(DocumentStoreError::InvalidArgument(format!(
                    "update_many on {} requires an id for every entry, entry {position} has none",
                    self.name()
                )));
            }
            if attributes.is_empty() {
                return Err(DocumentStoreError::InvalidArgument(format!(
                    "update_many on {} requires attributes for every entry, entry {position} has none",
                    self.name()
                )));
            }
        }

        let mut records = Vec::with_capacity(updates.len());

        for (id, attributes) in updates {
            records.push(self.update(id, attributes).await?);
        }

        Ok(records)
    }

    /// Removes documents by identity without loading them or running hooks.
    pub async fn delete(&self, ids: Vec<Bson>) -> DocumentStoreResult<u64> {
        let ids = distinct_ids(ids);

        if ids.is_empty() {
            return Ok(0);
        }

        let criteria = self.compile(&FindOptions::by_ids(ids))?;

        self.backend()
            .remove(self.collection(), criteria.filter)
            .await
    }

    /// Removes every matching document with one store call. Per-record hooks do not run.
    pub async fn delete_all(&self, options: &FindOptions) -> DocumentStoreResult<u64> {
        let criteria = self.compile(options)?;

        self.backend()
            .remove(self.collection(), criteria.filter)
            .await
    }

    /// Loads every record in `ids` and destroys each, running destroy hooks.
    ///
    /// Fails before destroying anything unless every id resolves.
    pub async fn destroy(&self, ids: Vec<Bson>) -> DocumentStoreResult<Vec<Record>> {
        let mut records = self.find_some_or_fail(ids).await?;

        for record in records.iter_mut() {
            record.destroy().await?;
        }

        Ok(records)
    }

    /// Streams matching records and destroys them one at a time, running destroy hooks.
    /// Returns how many were destroyed.
    pub async fn destroy_all(&self, options: &FindOptions) -> DocumentStoreResult<u64> {
        let mut records = self.stream(options).await?;
        let mut destroyed = 0;

        while let Some(mut record) = records.try_next().await? {
            if record.destroy().await? {
                destroyed += 1;
            }
        }

        Ok(destroyed)
    }

    pub async fn ensure_index(&self, index: IndexSpec) -> DocumentStoreResult<()> {
        self.backend()
            .create_index(self.collection(), index)
            .await
    }
}

/// Drops nulls and repeated ids, keeping first-seen order.
///
/// `Bson` has no `Hash`; the debug form is keyed instead, which keeps `Int32(1)` and
/// `Int64(1)` apart exactly as `Bson` equality does.
fn distinct_ids(ids: Vec<Bson>) -> Vec<Bson> {
    let mut seen = HashSet::with_capacity(ids.len());

    ids.into_iter()
        .filter(|id| *id != Bson::Null && seen.insert(format!("{id:?}")))
        .collect()
}
