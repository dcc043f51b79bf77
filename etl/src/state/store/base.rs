use std::future::Future;

use crate::error::EtlResult;

/// Trait for persisting pipeline progress as a flat map of JSON values.
///
/// [`StateStore`] implementations hold no business logic. Every call reads or writes the
/// persistent backend directly, so values written by [`StateStore::set`] are visible to later
/// [`StateStore::get`] calls, including across process restarts for durable backends.
///
/// Implementations must be safe to share between tasks.
pub trait StateStore {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> impl Future<Output = EtlResult<Option<serde_json::Value>>> + Send;

    /// Stores `value` under `key`, leaving every other key untouched.
    fn set(&self, key: &str, value: serde_json::Value)
    -> impl Future<Output = EtlResult<()>> + Send;
}
