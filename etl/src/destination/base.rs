use std::future::Future;

use crate::error::EtlResult;
use crate::types::MergedDocument;

/// Trait for search indexes that can receive merged film documents.
///
/// [`Destination`] implementations define how documents are stored in the target system. Both
/// operations may be retried by the pipeline after a failure, so they must be idempotent:
/// replaying a batch leaves the index exactly as applying it once would.
pub trait Destination {
    /// Returns the name of the destination.
    fn name() -> &'static str;

    /// Creates the index with its settings and mapping when it does not exist yet.
    ///
    /// Calling this on an existing index is a no-op.
    fn ensure_schema(&self) -> impl Future<Output = EtlResult<()>> + Send;

    /// Writes `documents` in a single bulk request, replacing any stored document with the
    /// same id.
    ///
    /// An empty batch must not reach the index.
    fn upsert_batch(
        &self,
        documents: Vec<MergedDocument>,
    ) -> impl Future<Output = EtlResult<()>> + Send;
}
