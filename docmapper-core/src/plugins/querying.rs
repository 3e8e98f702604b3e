//! The terminal finder layer.
//!
//! `querying` compiles query options, makes the store round trip and materializes the
//! returned documents as persisted records. Every finder layer installed after it wraps it.

use async_trait::async_trait;
use bson::Document;
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::trace;

use crate::{
    error::DocumentStoreResult,
    model::Model,
    plugin::{FinderLayer, Next, Plugin},
    query::FindOptions,
    record::Record,
    registry::Installer,
};

/// The `querying` behavior module.
#[derive(Debug, Clone, Copy, Default)]
pub struct Querying;

impl Plugin for Querying {
    fn name(&self) -> &'static str {
        "querying"
    }

    fn install(&self, installer: &mut Installer<'_>) -> DocumentStoreResult<()> {
        installer.finder_layer(Arc::new(StoreFinder));
        Ok(())
    }
}

#[derive(Debug)]
struct StoreFinder;

#[async_trait]
impl FinderLayer for StoreFinder {
    async fn find_one(&self, model: &Model, options: &FindOptions, _next: Next<'_>) -> DocumentStoreResult<Option<Record>> {
        let criteria = model.compile(options)?;
        trace!(target: "docmapper::query", model = model.name(), ?criteria, "find_one");

        let document = model
            .backend()
            .find_one(model.collection(), criteria)
            .await?;

        Ok(document.map(|document| Record::load(model.clone(), document)))
    }

    async fn find_many(&self, model: &Model, options: &FindOptions, _next: Next<'_>) -> DocumentStoreResult<Vec<Record>> {
        let criteria = model.compile(options)?;
        trace!(target: "docmapper::query", model = model.name(), ?criteria, "find_many");

        let documents: Vec<Document> = model
            .backend()
            .find(model.collection(), criteria)
            .await?
            .try_collect()
            .await?;

        Ok(documents
            .into_iter()
            .map(|document| Record::load(model.clone(), document))
            .collect())
    }

    async fn count(&self, model: &Model, options: &FindOptions, _next: Next<'_>) -> DocumentStoreResult<u64> {
        let criteria = model.compile(options)?;

        model
            .backend()
            .count(model.collection(), criteria.filter)
            .await
    }
}
