//! In-memory storage implementation.
//!
//! Collections are kept as insertion-ordered document lists behind an async-aware
//! read-write lock. Every query scans its collection.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use futures::{StreamExt, stream};
use mea::rwlock::RwLock;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::trace;

use docmapper_core::{
    backend::{DocumentStream, StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Criteria, Expr, ID_FIELD, IndexSpec, Modifiers},
};

use crate::evaluator::{DocumentEvaluator, compare_documents, lookup};

#[derive(Debug, Default)]
struct StoreState {
    collections: HashMap<String, Vec<Document>>,
    indexes: HashMap<String, Vec<IndexSpec>>,
}

#[derive(Debug, Default)]
struct Counters {
    find_one: AtomicU64,
    find: AtomicU64,
    count: AtomicU64,
    remove: AtomicU64,
    save: AtomicU64,
    create_index: AtomicU64,
}

/// Snapshot of how many calls of each kind a store has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub find_one: u64,
    pub find: u64,
    pub count: u64,
    pub remove: u64,
    pub save: u64,
    pub create_index: u64,
}

impl StoreStats {
    /// Total number of store calls.
    pub fn total(&self) -> u64 {
        self.find_one + self.find + self.count + self.remove + self.save + self.create_index
    }
}

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses `Arc`-wrapped internal state, so clones share the
/// same collections and counters.
///
/// # Example
///
/// ```ignore
/// use docmapper_memory::InMemoryStore;
/// use docmapper::backend::StoreBackend;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// let id = store.save("users", doc! { "name": "Alice" }).await?;
/// assert_eq!(store.count("users", None).await?, 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
    counters: Arc<Counters>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Calls served so far.
    pub fn stats(&self) -> StoreStats {
        let counters = &self.counters;

        StoreStats {
            find_one: counters.find_one.load(Ordering::Relaxed),
            find: counters.find.load(Ordering::Relaxed),
            count: counters.count.load(Ordering::Relaxed),
            remove: counters.remove.load(Ordering::Relaxed),
            save: counters.save.load(Ordering::Relaxed),
            create_index: counters.create_index.load(Ordering::Relaxed),
        }
    }

    /// Every document of a collection, in insertion order.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.state
            .read()
            .await
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Indexes created on a collection.
    pub async fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.state
            .read()
            .await
            .indexes
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    async fn select(&self, collection: &str, criteria: Criteria) -> DocumentStoreResult<Vec<Document>> {
        let state = self.state.read().await;
        let Some(documents) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut selected = Vec::new();
        for document in documents {
            if DocumentEvaluator::matches(document, criteria.filter.as_ref())? {
                selected.push(document);
            }
        }

        let Modifiers { sort, limit, offset, fields, hints } = criteria.modifiers;

        if !hints.is_empty() {
            trace!(target: "docmapper::memory", collection, ?hints, "ignoring store hints");
        }

        if !sort.is_empty() {
            selected.sort_by(|left, right| compare_documents(left, right, &sort));
        }

        Ok(selected
            .into_iter()
            .skip(offset.unwrap_or(0))
            .take(limit.unwrap_or(usize::MAX))
            .map(|document| project(document, fields.as_deref()))
            .collect())
    }
}

/// Keeps `_id` and the listed fields; a dotted field keeps its top-level field.
fn project(document: &Document, fields: Option<&[String]>) -> Document {
    let Some(fields) = fields else {
        return document.clone();
    };

    document
        .iter()
        .filter(|(key, _)| {
            key.as_str() == ID_FIELD
                || fields
                    .iter()
                    .any(|field| field.split('.').next() == Some(key.as_str()))
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn unique_key<'a>(document: &'a Document, index: &IndexSpec) -> Vec<Option<&'a Bson>> {
    index
        .keys
        .iter()
        .map(|key| lookup(document, &key.field))
        .collect()
}

fn check_unique(collection: &str, documents: &[Document], indexes: &[IndexSpec], candidate: &Document) -> DocumentStoreResult<()> {
    let id = candidate.get(ID_FIELD);

    for index in indexes.iter().filter(|index| index.unique) {
        let key = unique_key(candidate, index);

        let duplicate = documents
            .iter()
            .filter(|existing| existing.get(ID_FIELD) != id)
            .any(|existing| unique_key(existing, index) == key);

        if duplicate {
            return Err(DocumentStoreError::Backend(format!(
                "duplicate key in {collection} for unique index on {:?}",
                index
                    .keys
                    .iter()
                    .map(|key| key.field.as_str())
                    .collect::<Vec<_>>(),
            )));
        }
    }

    Ok(())
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find_one(&self, collection: &str, mut criteria: Criteria) -> DocumentStoreResult<Option<Document>> {
        self.counters.find_one.fetch_add(1, Ordering::Relaxed);
        criteria.modifiers.limit = Some(1);

        Ok(self
            .select(collection, criteria)
            .await?
            .into_iter()
            .next())
    }

    async fn find(&self, collection: &str, criteria: Criteria) -> DocumentStoreResult<DocumentStream> {
        self.counters.find.fetch_add(1, Ordering::Relaxed);
        let documents = self.select(collection, criteria).await?;

        Ok(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    async fn count(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        self.counters.count.fetch_add(1, Ordering::Relaxed);

        let state = self.state.read().await;
        let Some(documents) = state.collections.get(collection) else {
            return Ok(0);
        };

        let mut count = 0;
        for document in documents {
            if DocumentEvaluator::matches(document, filter.as_ref())? {
                count += 1;
            }
        }

        Ok(count)
    }

    async fn remove(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        self.counters.remove.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write().await;
        let Some(documents) = state.collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut matched = Vec::with_capacity(documents.len());
        for document in documents.iter() {
            matched.push(DocumentEvaluator::matches(document, filter.as_ref())?);
        }

        let mut flags = matched.iter();
        documents.retain(|_| !flags.next().copied().unwrap_or(false));

        let removed = matched
            .iter()
            .filter(|matched| **matched)
            .count() as u64;

        trace!(target: "docmapper::memory", collection, removed, "removed documents");
        Ok(removed)
    }

    async fn save(&self, collection: &str, mut document: Document) -> DocumentStoreResult<Bson> {
        self.counters.save.fetch_add(1, Ordering::Relaxed);

        let id = match document.get(ID_FIELD) {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                let mut identified = Document::new();
                identified.insert(ID_FIELD, id.clone());
                identified.extend(document);
                document = identified;
                id
            }
        };

        let mut state = self.state.write().await;
        let StoreState { collections, indexes } = &mut *state;
        let documents = collections
            .entry(collection.to_string())
            .or_default();

        if let Some(indexes) = indexes.get(collection) {
            check_unique(collection, documents, indexes, &document)?;
        }

        match documents
            .iter_mut()
            .find(|existing| existing.get(ID_FIELD) == Some(&id))
        {
            Some(existing) => *existing = document,
            None => documents.push(document),
        }

        trace!(target: "docmapper::memory", collection, %id, "saved document");
        Ok(id)
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> DocumentStoreResult<()> {
        self.counters.create_index.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write().await;
        let indexes = state
            .indexes
            .entry(collection.to_string())
            .or_default();

        match indexes
            .iter_mut()
            .find(|existing| existing.keys == index.keys)
        {
            Some(existing) => *existing = index,
            None => indexes.push(index),
        }

        Ok(())
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// ```ignore
/// use docmapper_memory::InMemoryStore;
/// use docmapper::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().build().await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder {
    collections: HashMap<String, Vec<Document>>,
}

impl InMemoryStoreBuilder {
    /// Seeds a collection with documents. Documents without `_id` get a fresh `ObjectId`.
    pub fn seed(mut self, collection: impl Into<String>, documents: impl IntoIterator<Item = Document>) -> Self {
        let seeded = self
            .collections
            .entry(collection.into())
            .or_default();

        for mut document in documents {
            if !document.contains_key(ID_FIELD) {
                let mut identified = Document::new();
                identified.insert(ID_FIELD, ObjectId::new());
                identified.extend(document);
                document = identified;
            }
            seeded.push(document);
        }

        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore {
            state: Arc::new(RwLock::new(StoreState {
                collections: self.collections,
                indexes: HashMap::new(),
            })),
            counters: Arc::new(Counters::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmapper_core::query::{Filter, Sort, SortDirection};
    use futures::TryStreamExt;

    async fn seeded() -> InMemoryStore {
        InMemoryStore::builder()
            .seed("people", vec![
                doc! { "_id": 1, "name": "Carol", "age": 30 },
                doc! { "_id": 2, "name": "Alice", "age": 10 },
                doc! { "_id": 3, "name": "Bob", "age": 20 },
            ])
            .build()
            .await
            .unwrap()
    }

    fn criteria(filter: Option<Expr>, modifiers: Modifiers) -> Criteria {
        Criteria { filter, modifiers }
    }

    #[tokio::test]
    async fn save_assigns_object_id_first() {
        let store = InMemoryStore::new();
        let id = store.save("people", doc! { "name": "Dana" }).await.unwrap();

        assert!(matches!(id, Bson::ObjectId(_)));

        let documents = store.documents("people").await;
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].keys().next().map(String::as_str), Some("_id"));
        assert_eq!(documents[0].get("_id"), Some(&id));
    }

    #[tokio::test]
    async fn save_replaces_by_id() {
        let store = seeded().await;

        store.save("people", doc! { "_id": 2, "name": "Alicia" }).await.unwrap();

        let documents = store.documents("people").await;
        assert_eq!(documents.len(), 3);
        assert_eq!(documents[1], doc! { "_id": 2, "name": "Alicia" });
    }

    #[tokio::test]
    async fn find_sorts_skips_limits_and_projects() {
        let store = seeded().await;
        let modifiers = Modifiers {
            sort: vec![Sort::new("age", SortDirection::Desc)],
            offset: Some(1),
            limit: Some(1),
            fields: Some(vec!["name".to_string()]),
            ..Modifiers::default()
        };

        let documents: Vec<Document> = store
            .find("people", criteria(None, modifiers))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(documents, vec![doc! { "_id": 3, "name": "Bob" }]);
    }

    #[tokio::test]
    async fn find_one_takes_first_in_order() {
        let store = seeded().await;
        let modifiers = Modifiers { sort: vec![Sort::new("name", SortDirection::Asc)], ..Modifiers::default() };

        let document = store
            .find_one("people", criteria(Some(Filter::gt("age", 5)), modifiers))
            .await
            .unwrap();

        assert_eq!(document.and_then(|document| document.get_str("name").ok().map(str::to_string)), Some("Alice".to_string()));
    }

    #[tokio::test]
    async fn count_and_remove_use_filter() {
        let store = seeded().await;

        assert_eq!(store.count("people", Some(Filter::gte("age", 20))).await.unwrap(), 2);
        assert_eq!(store.count("nobody", None).await.unwrap(), 0);

        assert_eq!(store.remove("people", Some(Filter::any_of("_id", vec![1, 3]))).await.unwrap(), 2);
        assert_eq!(store.count("people", None).await.unwrap(), 1);

        let stats = store.stats();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.remove, 1);
        assert_eq!(stats.total(), 4);
    }

    #[tokio::test]
    async fn unique_index_rejects_duplicates() {
        let store = seeded().await;

        store
            .create_index("people", IndexSpec::ascending("name").unique(true))
            .await
            .unwrap();

        let err = store.save("people", doc! { "name": "Bob" }).await.unwrap_err();
        assert!(matches!(err, DocumentStoreError::Backend(_)));

        store.save("people", doc! { "_id": 3, "name": "Bob", "age": 21 }).await.unwrap();
        assert_eq!(store.indexes("people").await.len(), 1);
    }
}
