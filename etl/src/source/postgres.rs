use chrono::{DateTime, Utc};
use config::shared::PgConnectionConfig;
use postgres::content::{
    get_all_ids, get_film_rows, get_modified_ids, get_referencing_film_ids,
};
use postgres::db::connect_to_source_database;
use sqlx::PgPool;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::source::Source;
use crate::types::{EntityId, EntityKind, FilmRow};

/// [`Source`] reading the `content` schema through a sqlx pool.
#[derive(Debug, Clone)]
pub struct PostgresSource {
    pool: PgPool,
}

impl PostgresSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a source for the database described by `config`.
    ///
    /// No connection is opened until the first query.
    pub fn connect(config: &PgConnectionConfig) -> Self {
        Self::new(connect_to_source_database(config))
    }
}

fn page_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl Source for PostgresSource {
    async fn modified_ids(
        &self,
        kind: EntityKind,
        since: DateTime<Utc>,
        excepted: &[EntityId],
        limit: usize,
    ) -> EtlResult<Vec<EntityId>> {
        let rows = get_modified_ids(&self.pool, kind, since, excepted, page_limit(limit)).await?;
        debug!(%kind, %since, count = rows.len(), "fetched modified ids");

        Ok(rows.into_iter().map(|row| row.id).collect())
    }

    async fn all_ids(
        &self,
        kind: EntityKind,
        excepted: &[EntityId],
        limit: usize,
    ) -> EtlResult<Vec<EntityId>> {
        let rows = get_all_ids(&self.pool, kind, excepted, page_limit(limit)).await?;
        debug!(%kind, count = rows.len(), "fetched ids");

        Ok(rows.into_iter().map(|row| row.id).collect())
    }

    async fn referencing_film_ids(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
        excepted: &[EntityId],
        limit: usize,
    ) -> EtlResult<Vec<EntityId>> {
        let Some(relation) = kind.film_relation() else {
            bail!(
                ErrorKind::InvalidState,
                "Films have no referencing films",
                format!("Cannot resolve referencing films for kind '{kind}'")
            );
        };

        let rows =
            get_referencing_film_ids(&self.pool, relation, ids, excepted, page_limit(limit))
                .await?;

        Ok(rows.into_iter().map(|row| row.id).collect())
    }

    async fn film_rows(&self, film_ids: &[EntityId]) -> EtlResult<Vec<FilmRow>> {
        let rows = get_film_rows(&self.pool, film_ids).await?;
        debug!(films = film_ids.len(), rows = rows.len(), "fetched film rows");

        Ok(rows)
    }
}
