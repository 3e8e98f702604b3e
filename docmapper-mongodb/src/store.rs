use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    options::{ClientOptions, IndexOptions},
};
use tracing::{debug, trace};

use docmapper_core::{
    backend::{DocumentStream, StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Criteria, Expr, ID_FIELD, IndexSpec},
};

use crate::query::{MongoQueryTranslator, find_options, sort_document};

fn backend_error(error: mongodb::error::Error) -> DocumentStoreError {
    DocumentStoreError::Backend(error.to_string())
}

/// A backend storing each collection in a MongoDB collection of the same name.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self { client, database: database.into() }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find_one(&self, collection: &str, criteria: Criteria) -> DocumentStoreResult<Option<Document>> {
        let filter = MongoQueryTranslator::filter(criteria.filter.as_ref())?;
        let mut options = find_options(criteria.modifiers)?;
        options.limit = Some(1);

        trace!(target: "docmapper::mongodb", collection, %filter, "find_one");

        self.get_collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(backend_error)?
            .try_next()
            .await
            .map_err(backend_error)
    }

    async fn find(&self, collection: &str, criteria: Criteria) -> DocumentStoreResult<DocumentStream> {
        let filter = MongoQueryTranslator::filter(criteria.filter.as_ref())?;
        let options = find_options(criteria.modifiers)?;

        trace!(target: "docmapper::mongodb", collection, %filter, "find");

        Ok(self
            .get_collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(backend_error)?
            .map_err(backend_error)
            .boxed())
    }

    async fn count(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(MongoQueryTranslator::filter(filter.as_ref())?)
            .await
            .map_err(backend_error)
    }

    async fn remove(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        let result = self
            .get_collection(collection)
            .delete_many(MongoQueryTranslator::filter(filter.as_ref())?)
            .await
            .map_err(backend_error)?;

        debug!(target: "docmapper::mongodb", collection, removed = result.deleted_count, "removed documents");

        Ok(result.deleted_count)
    }

    async fn save(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        match document.get(ID_FIELD).cloned() {
            Some(id) => {
                self.get_collection(collection)
                    .replace_one(doc! { ID_FIELD: id.clone() }, document)
                    .upsert(true)
                    .await
                    .map_err(backend_error)?;

                Ok(id)
            }
            None => Ok(self
                .get_collection(collection)
                .insert_one(document)
                .await
                .map_err(backend_error)?
                .inserted_id),
        }
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> DocumentStoreResult<()> {
        let mut options = IndexOptions::default();
        options.unique = Some(index.unique);
        options.name = index.name;

        self.get_collection(collection)
            .create_index(
                IndexModel::builder()
                    .keys(sort_document(&index.keys))
                    .options(options)
                    .build(),
            )
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        self.client.clone().shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            )
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
