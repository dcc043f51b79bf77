use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::EtlResult;
use crate::types::{EntityId, EntityKind, FilmRow};

/// Query capabilities the pipeline needs from the system of record.
///
/// Implementations must not write to the store. Every method takes the ids to exclude so
/// callers can page through results without a server side cursor.
pub trait Source {
    /// Returns ids of `kind` rows modified strictly after `since`, oldest first.
    ///
    /// Rows sharing a modification instant come back in the store's natural order.
    fn modified_ids(
        &self,
        kind: EntityKind,
        since: DateTime<Utc>,
        excepted: &[EntityId],
        limit: usize,
    ) -> impl Future<Output = EtlResult<Vec<EntityId>>> + Send;

    /// Returns ids of every `kind` row, including rows never modified, oldest first.
    ///
    /// Rows without a modification instant come last.
    fn all_ids(
        &self,
        kind: EntityKind,
        excepted: &[EntityId],
        limit: usize,
    ) -> impl Future<Output = EtlResult<Vec<EntityId>>> + Send;

    /// Returns ids of films referencing any of `ids` through the relation of `kind`.
    ///
    /// `kind` must not be [`EntityKind::Film`].
    fn referencing_film_ids(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
        excepted: &[EntityId],
        limit: usize,
    ) -> impl Future<Output = EtlResult<Vec<EntityId>>> + Send;

    /// Returns every flattened row of the given films.
    fn film_rows(
        &self,
        film_ids: &[EntityId],
    ) -> impl Future<Output = EtlResult<Vec<FilmRow>>> + Send;
}
