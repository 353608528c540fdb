//! HTTP client for the REST API.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, trace};

use agora_core::error::{
    AuthError, Error, InvalidInputError, ProtocolError, TransportError,
};
use agora_core::repo::{Filter, Query, Record};
use agora_core::types::Collection;

use crate::config::RestConfig;

const APIKEY: HeaderName = HeaderName::from_static("apikey");
const PREFER: HeaderName = HeaderName::from_static("prefer");

/// Error body returned by the REST API.
#[derive(Debug, Deserialize)]
struct RestErrorResponse {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

/// Map a reqwest error to a transport error.
pub(crate) fn transport_error(err: reqwest::Error) -> Error {
    let err = if err.is_timeout() {
        TransportError::Timeout { duration_ms: 0 }
    } else if err.is_connect() {
        TransportError::Connection {
            message: err.to_string(),
        }
    } else {
        TransportError::Http {
            message: err.to_string(),
        }
    };
    err.into()
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|_| {
        InvalidInputError::Other {
            message: format!("{} contains invalid header characters", what),
        }
        .into()
    })
}

/// HTTP client for one project's REST API.
#[derive(Debug, Clone)]
pub(crate) struct RestClient {
    client: reqwest::Client,
    config: RestConfig,
}

impl RestClient {
    /// Create a client with the project's auth headers preset.
    pub fn new(config: RestConfig) -> Result<Self, Error> {
        if config.api_key.is_empty() {
            return Err(AuthError::MissingApiKey.into());
        }

        let mut headers = HeaderMap::new();
        headers.insert(APIKEY, header_value(&config.api_key, "API key")?);
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", config.bearer()), "access token")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("agora/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(transport_error)?;

        Ok(Self { client, config })
    }

    /// Returns the connection settings.
    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    fn request(&self, method: Method, collection: &Collection) -> RequestBuilder {
        let url = self.config.url.rest_url(collection.as_str());
        self.client.request(method, url)
    }

    fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
        filters
            .iter()
            .map(|f| (f.column.clone(), f.rest_value()))
            .collect()
    }

    fn query_params(query: &Query) -> Vec<(String, String)> {
        let mut params = vec![(
            "select".to_string(),
            query.select.clone().unwrap_or_else(|| "*".to_string()),
        )];
        params.extend(Self::filter_params(&query.filters));
        if let Some(order) = &query.order {
            params.push(("order".to_string(), order.to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// GET rows matching a query.
    #[instrument(skip(self, query), fields(url = %self.config.url, %collection))]
    pub async fn select(&self, collection: &Collection, query: &Query) -> Result<Vec<Record>, Error> {
        let params = Self::query_params(query);
        debug!("REST select");
        trace!(?params, "query parameters");

        let response = self
            .request(Method::GET, collection)
            .query(&params)
            .send()
            .await
            .map_err(transport_error)?;

        let rows: Vec<Value> = self.handle_response(response).await?;
        rows.into_iter().map(Record::new).collect()
    }

    /// POST a row and return the stored representation.
    #[instrument(skip(self, record), fields(url = %self.config.url, %collection))]
    pub async fn insert(&self, collection: &Collection, record: &Record) -> Result<Record, Error> {
        debug!("REST insert");

        let response = self
            .request(Method::POST, collection)
            .header(PREFER, "return=representation")
            .json(record)
            .send()
            .await
            .map_err(transport_error)?;

        let rows: Vec<Value> = self.handle_response(response).await?;
        let row = rows.into_iter().next().ok_or_else(|| {
            ProtocolError::new(
                200,
                None,
                Some("insert returned no representation".to_string()),
            )
        })?;
        Record::new(row)
    }

    /// PATCH rows matching a filter.
    #[instrument(skip(self, patch), fields(url = %self.config.url, %collection, %filter))]
    pub async fn update(
        &self,
        collection: &Collection,
        filter: &Filter,
        patch: &Record,
    ) -> Result<(), Error> {
        debug!("REST update");

        let response = self
            .request(Method::PATCH, collection)
            .query(&Self::filter_params(std::slice::from_ref(filter)))
            .header(PREFER, "return=minimal")
            .json(patch)
            .send()
            .await
            .map_err(transport_error)?;

        self.handle_empty_response(response).await
    }

    /// DELETE rows matching a filter.
    #[instrument(skip(self), fields(url = %self.config.url, %collection, %filter))]
    pub async fn delete(&self, collection: &Collection, filter: &Filter) -> Result<(), Error> {
        debug!("REST delete");

        let response = self
            .request(Method::DELETE, collection)
            .query(&Self::filter_params(std::slice::from_ref(filter)))
            .send()
            .await
            .map_err(transport_error)?;

        self.handle_empty_response(response).await
    }

    async fn handle_response<R: serde::de::DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<R, Error> {
        let status = response.status();
        trace!(status = %status, "REST response");

        if status.is_success() {
            response.json::<R>().await.map_err(transport_error)
        } else {
            Err(self.parse_error_response(response).await)
        }
    }

    async fn handle_empty_response(&self, response: Response) -> Result<(), Error> {
        let status = response.status();
        trace!(status = %status, "REST response");

        if status.is_success() {
            Ok(())
        } else {
            Err(self.parse_error_response(response).await)
        }
    }

    async fn parse_error_response(&self, response: Response) -> Error {
        let status = response.status().as_u16();

        let body = response.json::<RestErrorResponse>().await.ok();
        let (code, message) = match body {
            Some(body) => {
                let mut message = body.message;
                if let Some(details) = body.details.or(body.hint) {
                    message = Some(match message {
                        Some(m) => format!("{} ({})", m, details),
                        None => details,
                    });
                }
                (body.code, message)
            }
            None => (None, None),
        };

        if status == 401 {
            return AuthError::Rejected(message.unwrap_or_else(|| "unauthorized".to_string()))
                .into();
        }

        ProtocolError::new(status, code, message).into()
    }
}
