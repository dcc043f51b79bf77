//! Elasticsearch destination writing film documents through the REST API.

mod client;
mod encoding;
pub mod mapping;

use secrecy::SecretString;
use tracing::{debug, info};

use crate::bail;
use crate::destination::Destination;
use crate::destination::elasticsearch::client::ElasticsearchClient;
use crate::destination::elasticsearch::encoding::encode_bulk_body;
use crate::error::{ErrorKind, EtlResult};
use crate::types::MergedDocument;

/// Number of failing ids quoted in a bulk error.
const MAX_REPORTED_FAILURES: usize = 10;

/// Connection settings for [`ElasticsearchDestination`].
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub index: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

/// [`Destination`] storing documents in an Elasticsearch index.
#[derive(Debug, Clone)]
pub struct ElasticsearchDestination {
    client: ElasticsearchClient,
    index: String,
}

impl ElasticsearchDestination {
    pub fn new(config: ElasticsearchConfig) -> EtlResult<Self> {
        let client = ElasticsearchClient::new(&config.url, config.username, config.password)?;

        Ok(Self {
            client,
            index: config.index,
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }
}

impl Destination for ElasticsearchDestination {
    fn name() -> &'static str {
        "elasticsearch"
    }

    async fn ensure_schema(&self) -> EtlResult<()> {
        if self.client.index_exists(&self.index).await? {
            debug!(index = %self.index, "index already exists");
            return Ok(());
        }

        info!(index = %self.index, "index does not exist, creating it");
        if self
            .client
            .create_index(&self.index, &mapping::index_definition())
            .await?
        {
            info!(index = %self.index, "index created");
        }

        Ok(())
    }

    async fn upsert_batch(&self, documents: Vec<MergedDocument>) -> EtlResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let body = encode_bulk_body(&self.index, &documents)?;
        let response = self.client.bulk(body).await?;

        if response.errors {
            let failures = response.failures();
            let quoted = failures
                .iter()
                .take(MAX_REPORTED_FAILURES)
                .map(|(id, reason)| format!("{id}: {reason}"))
                .collect::<Vec<_>>()
                .join("; ");

            bail!(
                ErrorKind::DestinationQueryFailed,
                "Bulk upsert rejected some documents",
                format!(
                    "{} of {} documents failed in index '{}': {quoted}",
                    failures.len(),
                    documents.len(),
                    self.index
                )
            );
        }

        info!(index = %self.index, documents = documents.len(), "upserted documents");

        Ok(())
    }
}
