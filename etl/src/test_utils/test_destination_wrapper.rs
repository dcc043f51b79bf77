use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{Notify, RwLock};

use crate::destination::Destination;
use crate::error::EtlResult;
use crate::test_utils::notify::TimedNotify;
use crate::types::{EntityId, MergedDocument};

type DocumentsCondition = Box<dyn Fn(&HashMap<EntityId, MergedDocument>) -> bool + Send + Sync>;

struct Inner<D> {
    wrapped_destination: D,
    documents: HashMap<EntityId, MergedDocument>,
    batches: Vec<Vec<EntityId>>,
    ensure_schema_calls: u64,
    conditions: Vec<(DocumentsCondition, Arc<Notify>)>,
}

impl<D> Inner<D> {
    fn check_conditions(&mut self) {
        let documents = &self.documents;
        self.conditions.retain(|(condition, notify)| {
            let should_retain = !condition(documents);
            if !should_retain {
                notify.notify_one();
            }
            should_retain
        });
    }
}

/// Test wrapper for [`Destination`] implementations recording every successful write.
///
/// Tests can wait until the written documents satisfy a condition, which makes assertions on
/// a running pipeline deterministic.
#[derive(Clone)]
pub struct TestDestinationWrapper<D> {
    inner: Arc<RwLock<Inner<D>>>,
}

impl<D> fmt::Debug for TestDestinationWrapper<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDestinationWrapper").finish_non_exhaustive()
    }
}

impl<D> TestDestinationWrapper<D> {
    pub fn wrap(destination: D) -> Self {
        let inner = Inner {
            wrapped_destination: destination,
            documents: HashMap::new(),
            batches: Vec::new(),
            ensure_schema_calls: 0,
            conditions: Vec::new(),
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Returns the latest written version of every document.
    pub async fn documents(&self) -> HashMap<EntityId, MergedDocument> {
        self.inner.read().await.documents.clone()
    }

    /// Returns the ids of each successful batch, in write order.
    pub async fn batches(&self) -> Vec<Vec<EntityId>> {
        self.inner.read().await.batches.clone()
    }

    pub async fn ensure_schema_calls(&self) -> u64 {
        self.inner.read().await.ensure_schema_calls
    }

    /// Registers a notification fired once the written documents satisfy `condition`.
    pub async fn notify_on_documents<F>(&self, condition: F) -> TimedNotify
    where
        F: Fn(&HashMap<EntityId, MergedDocument>) -> bool + Send + Sync + 'static,
    {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.write().await;
        inner.conditions.push((Box::new(condition), notify.clone()));

        // The condition may already hold.
        inner.check_conditions();

        TimedNotify::new(notify)
    }

    /// Registers a notification fired once at least `count` distinct documents were written.
    pub async fn wait_for_documents_count(&self, count: usize) -> TimedNotify {
        self.notify_on_documents(move |documents| documents.len() >= count)
            .await
    }
}

impl<D> Destination for TestDestinationWrapper<D>
where
    D: Destination + Send + Sync,
{
    fn name() -> &'static str {
        D::name()
    }

    async fn ensure_schema(&self) -> EtlResult<()> {
        let mut inner = self.inner.write().await;
        inner.wrapped_destination.ensure_schema().await?;
        inner.ensure_schema_calls += 1;

        Ok(())
    }

    async fn upsert_batch(&self, documents: Vec<MergedDocument>) -> EtlResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .wrapped_destination
            .upsert_batch(documents.clone())
            .await?;

        if !documents.is_empty() {
            inner
                .batches
                .push(documents.iter().map(|document| document.id).collect());
        }
        for document in documents {
            inner.documents.insert(document.id, document);
        }
        inner.check_conditions();

        Ok(())
    }
}
