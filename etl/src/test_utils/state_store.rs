use serde_json::Value;

use crate::error::{ErrorKind, EtlResult};
use crate::state::store::StateStore;
use crate::test_utils::faults::{ArmedFault, Fault};

/// Faults injected by [`FaultInjectingStateStore`], per operation.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    pub get: Option<Fault>,
    pub set: Option<Fault>,
}

/// [`StateStore`] wrapper failing calls according to a [`FaultConfig`].
///
/// Failed calls never reach the wrapped store.
#[derive(Debug, Clone)]
pub struct FaultInjectingStateStore<S> {
    inner: S,
    get: ArmedFault,
    set: ArmedFault,
}

impl<S> FaultInjectingStateStore<S> {
    pub fn wrap(inner: S, config: FaultConfig) -> Self {
        Self {
            inner,
            get: ArmedFault::new(config.get),
            set: ArmedFault::new(config.set),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of `get` calls failed so far.
    pub fn failed_gets(&self) -> usize {
        self.get.fired()
    }

    /// Number of `set` calls failed so far.
    pub fn failed_sets(&self) -> usize {
        self.set.fired()
    }
}

impl<S> StateStore for FaultInjectingStateStore<S>
where
    S: StateStore + Send + Sync,
{
    async fn get(&self, key: &str) -> EtlResult<Option<Value>> {
        self.get
            .fire("state_store.get", ErrorKind::StateStoreConnectionFailed)?;

        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> EtlResult<()> {
        self.set
            .fire("state_store.set", ErrorKind::StateStoreConnectionFailed)?;

        self.inner.set(key, value).await
    }
}
