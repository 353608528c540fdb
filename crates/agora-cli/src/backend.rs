//! Backend wrapper for CLI use.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use agora_core::repo::{ChangeEvent, Filter, Query, Record, Subscription};
use agora_core::traits::Backend;
use agora_core::types::{Collection, RecordId};
use agora_core::Result;
use agora_file::FileBackend;
use agora_rest::RestBackend;

/// Change feed of either backend.
pub type CliFeed = Pin<Box<dyn Stream<Item = Result<ChangeEvent>> + Send>>;

/// The backend selected by the configured URL.
#[derive(Debug)]
pub enum CliBackend {
    File(FileBackend),
    Rest(RestBackend),
}

#[async_trait]
impl Backend for CliBackend {
    type Feed = CliFeed;

    async fn select(&self, collection: &Collection, query: &Query) -> Result<Vec<Record>> {
        match self {
            CliBackend::File(backend) => backend.select(collection, query).await,
            CliBackend::Rest(backend) => backend.select(collection, query).await,
        }
    }

    async fn fetch_one(
        &self,
        collection: &Collection,
        id: &RecordId,
        select: Option<&str>,
    ) -> Result<Record> {
        match self {
            CliBackend::File(backend) => backend.fetch_one(collection, id, select).await,
            CliBackend::Rest(backend) => backend.fetch_one(collection, id, select).await,
        }
    }

    async fn insert(&self, collection: &Collection, record: &Record) -> Result<Record> {
        match self {
            CliBackend::File(backend) => backend.insert(collection, record).await,
            CliBackend::Rest(backend) => backend.insert(collection, record).await,
        }
    }

    async fn update(&self, collection: &Collection, filter: &Filter, patch: &Record) -> Result<()> {
        match self {
            CliBackend::File(backend) => backend.update(collection, filter, patch).await,
            CliBackend::Rest(backend) => backend.update(collection, filter, patch).await,
        }
    }

    async fn delete(&self, collection: &Collection, filter: &Filter) -> Result<()> {
        match self {
            CliBackend::File(backend) => backend.delete(collection, filter).await,
            CliBackend::Rest(backend) => backend.delete(collection, filter).await,
        }
    }

    async fn subscribe(&self, subscription: Subscription) -> Result<Self::Feed> {
        let feed: CliFeed = match self {
            CliBackend::File(backend) => Box::pin(backend.subscribe(subscription).await?),
            CliBackend::Rest(backend) => Box::pin(backend.subscribe(subscription).await?),
        };
        Ok(feed)
    }
}
