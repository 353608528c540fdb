//! Hosted backend implementation.

use async_trait::async_trait;
use tracing::{debug, instrument};

use agora_core::error::ProtocolError;
use agora_core::repo::{Filter, Query, Record, Subscription};
use agora_core::traits::Backend;
use agora_core::types::{Collection, RecordId, ServiceUrl};
use agora_core::Result;

use crate::client::RestClient;
use crate::config::RestConfig;
use crate::realtime::RestFeed;

/// A network backend using the hosted project's REST and realtime APIs.
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: RestClient,
}

impl RestBackend {
    /// Create a backend for the given project settings.
    pub fn new(config: RestConfig) -> Result<Self> {
        Ok(Self {
            client: RestClient::new(config)?,
        })
    }

    /// Returns the project URL.
    pub fn url(&self) -> &ServiceUrl {
        &self.client.config().url
    }
}

#[async_trait]
impl Backend for RestBackend {
    type Feed = RestFeed;

    async fn select(&self, collection: &Collection, query: &Query) -> Result<Vec<Record>> {
        self.client.select(collection, query).await
    }

    #[instrument(skip(self), fields(%collection, %id))]
    async fn fetch_one(
        &self,
        collection: &Collection,
        id: &RecordId,
        select: Option<&str>,
    ) -> Result<Record> {
        debug!("Fetching row");

        let mut query = Query::new().filter(Filter::id(id)).limit(1);
        if let Some(select) = select {
            query = query.select(select);
        }

        self.client
            .select(collection, &query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProtocolError::not_found(format!("{} row {}", collection, id)).into())
    }

    async fn insert(&self, collection: &Collection, record: &Record) -> Result<Record> {
        self.client.insert(collection, record).await
    }

    async fn update(&self, collection: &Collection, filter: &Filter, patch: &Record) -> Result<()> {
        self.client.update(collection, filter, patch).await
    }

    async fn delete(&self, collection: &Collection, filter: &Filter) -> Result<()> {
        self.client.delete(collection, filter).await
    }

    async fn subscribe(&self, subscription: Subscription) -> Result<Self::Feed> {
        RestFeed::connect(self.client.config(), subscription).await
    }
}
