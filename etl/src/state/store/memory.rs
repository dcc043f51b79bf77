use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::EtlResult;
use crate::state::store::StateStore;

/// In-memory [`StateStore`].
///
/// All state is lost when the process exits. Intended for tests and local development, where
/// a full reindex on every start is acceptable.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every stored key and value.
    pub async fn snapshot(&self) -> BTreeMap<String, Value> {
        self.inner.lock().await.clone()
    }
}

impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> EtlResult<Option<Value>> {
        let inner = self.inner.lock().await;

        Ok(inner.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.insert(key.to_string(), value);

        Ok(())
    }
}
