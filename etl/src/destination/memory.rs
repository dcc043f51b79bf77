use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::destination::Destination;
use crate::error::EtlResult;
use crate::types::{EntityId, MergedDocument};

#[derive(Debug, Default)]
struct Inner {
    schema_created: bool,
    ensure_schema_calls: usize,
    bulk_writes: usize,
    documents: HashMap<EntityId, MergedDocument>,
}

/// In-memory destination for testing and development purposes.
///
/// [`MemoryDestination`] keeps the latest version of each document keyed by its id, which
/// mirrors how an index overwrites documents on upsert. It also counts calls so tests can
/// assert that empty batches never reach the index.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every stored document.
    pub async fn documents(&self) -> HashMap<EntityId, MergedDocument> {
        let inner = self.inner.lock().await;
        inner.documents.clone()
    }

    /// Returns the stored document with `id`, if any.
    pub async fn document(&self, id: &EntityId) -> Option<MergedDocument> {
        let inner = self.inner.lock().await;
        inner.documents.get(id).cloned()
    }

    /// Number of bulk writes that reached the index.
    pub async fn bulk_writes(&self) -> usize {
        self.inner.lock().await.bulk_writes
    }

    /// Number of times the schema was ensured.
    pub async fn ensure_schema_calls(&self) -> usize {
        self.inner.lock().await.ensure_schema_calls
    }

    pub async fn schema_created(&self) -> bool {
        self.inner.lock().await.schema_created
    }

    /// Drops every stored document and resets the counters.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        *inner = Inner::default();
    }
}

impl Destination for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn ensure_schema(&self) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_schema_calls += 1;

        if !inner.schema_created {
            info!("creating in-memory index");
            inner.schema_created = true;
        }

        Ok(())
    }

    async fn upsert_batch(&self, documents: Vec<MergedDocument>) -> EtlResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock().await;
        inner.bulk_writes += 1;

        debug!("writing a batch of {} documents", documents.len());

        for document in documents {
            inner.documents.insert(document.id, document);
        }

        Ok(())
    }
}
