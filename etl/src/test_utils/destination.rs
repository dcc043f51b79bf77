use crate::destination::Destination;
use crate::error::{ErrorKind, EtlResult};
use crate::test_utils::faults::{ArmedFault, Fault};
use crate::types::MergedDocument;

/// Faults injected by [`FaultInjectingDestination`], per operation.
#[derive(Debug, Clone, Default)]
pub struct DestinationFaultConfig {
    pub ensure_schema: Option<Fault>,
    pub upsert_batch: Option<Fault>,
}

/// [`Destination`] wrapper failing calls according to a [`DestinationFaultConfig`].
///
/// Failed calls never reach the wrapped destination.
#[derive(Debug, Clone)]
pub struct FaultInjectingDestination<D> {
    inner: D,
    ensure_schema: ArmedFault,
    upsert_batch: ArmedFault,
}

impl<D> FaultInjectingDestination<D> {
    pub fn wrap(inner: D, config: DestinationFaultConfig) -> Self {
        Self {
            inner,
            ensure_schema: ArmedFault::new(config.ensure_schema),
            upsert_batch: ArmedFault::new(config.upsert_batch),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Number of `upsert_batch` calls failed so far.
    pub fn failed_upserts(&self) -> usize {
        self.upsert_batch.fired()
    }
}

impl<D> Destination for FaultInjectingDestination<D>
where
    D: Destination + Send + Sync,
{
    fn name() -> &'static str {
        D::name()
    }

    async fn ensure_schema(&self) -> EtlResult<()> {
        self.ensure_schema.fire(
            "destination.ensure_schema",
            ErrorKind::DestinationConnectionFailed,
        )?;

        self.inner.ensure_schema().await
    }

    async fn upsert_batch(&self, documents: Vec<MergedDocument>) -> EtlResult<()> {
        self.upsert_batch.fire(
            "destination.upsert_batch",
            ErrorKind::DestinationConnectionFailed,
        )?;

        self.inner.upsert_batch(documents).await
    }
}
