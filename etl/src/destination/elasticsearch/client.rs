use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::{bail, etl_error};
use crate::error::{ErrorKind, EtlError, EtlResult};

/// Timeout applied to every request sent to the cluster.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error type reported when creating an index that already exists.
const INDEX_EXISTS_ERROR: &str = "resource_already_exists_exception";

/// Response of the `_bulk` endpoint.
#[derive(Debug, Deserialize)]
pub(super) struct BulkResponse {
    pub(super) errors: bool,
    #[serde(default)]
    pub(super) items: Vec<HashMap<String, BulkItem>>,
}

/// Outcome of a single action in a bulk request.
#[derive(Debug, Deserialize)]
pub(super) struct BulkItem {
    #[serde(rename = "_id")]
    pub(super) id: Option<String>,
    pub(super) status: u16,
    pub(super) error: Option<Value>,
}

impl BulkResponse {
    /// Returns the id and error of every failed action.
    pub(super) fn failures(&self) -> Vec<(String, String)> {
        self.items
            .iter()
            .flat_map(|item| item.values())
            .filter(|item| item.error.is_some() || item.status >= 300)
            .map(|item| {
                let id = item.id.clone().unwrap_or_else(|| "<unknown>".to_string());
                let reason = item
                    .error
                    .as_ref()
                    .map(|error| error.to_string())
                    .unwrap_or_else(|| format!("status {}", item.status));
                (id, reason)
            })
            .collect()
    }
}

/// Minimal client for the Elasticsearch REST API.
#[derive(Debug, Clone)]
pub(super) struct ElasticsearchClient {
    http: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<SecretString>,
}

impl ElasticsearchClient {
    pub(super) fn new(
        base_url: &str,
        username: Option<String>,
        password: Option<SecretString>,
    ) -> EtlResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}/{}", self.base_url, path));

        match &self.username {
            Some(username) => builder.basic_auth(
                username,
                self.password.as_ref().map(|password| password.expose_secret()),
            ),
            None => builder,
        }
    }

    /// Returns whether `index` exists.
    pub(super) async fn index_exists(&self, index: &str) -> EtlResult<bool> {
        let response = self.request(Method::HEAD, index).send().await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(response_error(response, "Failed to check whether the index exists").await),
        }
    }

    /// Creates `index` from `definition`.
    ///
    /// Returns `false` when another writer created the index in the meantime.
    pub(super) async fn create_index(&self, index: &str, definition: &Value) -> EtlResult<bool> {
        let response = self
            .request(Method::PUT, index)
            .json(definition)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(true);
        }

        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await?;
            if body.contains(INDEX_EXISTS_ERROR) {
                debug!(index, "index was created concurrently");
                return Ok(false);
            }

            bail!(
                ErrorKind::DestinationQueryFailed,
                "Failed to create the index",
                format!("Index '{index}' was rejected: {body}")
            );
        }

        Err(response_error(response, "Failed to create the index").await)
    }

    /// Sends a newline delimited bulk request.
    pub(super) async fn bulk(&self, body: String) -> EtlResult<BulkResponse> {
        let response = self
            .request(Method::POST, "_bulk")
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(response_error(response, "Bulk request failed").await);
        }

        let bulk_response: BulkResponse = response.json().await?;

        Ok(bulk_response)
    }
}

async fn response_error(response: Response, description: &'static str) -> EtlError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unable to read body>".to_string());

    error!(%status, %body, "{description}");

    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::AuthenticationError,
        _ => ErrorKind::DestinationQueryFailed,
    };

    etl_error!(kind, description, format!("Status {status}: {body}"))
}
