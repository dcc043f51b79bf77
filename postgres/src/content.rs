use chrono::{DateTime, Utc};
use sqlx::{PgPool, prelude::FromRow};
use uuid::Uuid;

use crate::schema::{EntityKind, FilmRelation};

/// Id and modification instant of a changed row.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ModifiedRow {
    pub id: Uuid,
    pub modified: Option<DateTime<Utc>>,
}

/// One flattened row of the film projection.
///
/// A film linked to several persons and genres yields one row per (person role, genre)
/// combination. A film without any links yields a single row with the relation columns null.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FilmRow {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub rating: Option<f64>,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub person_role: Option<String>,
    pub person_id: Option<Uuid>,
    pub person_name: Option<String>,
    pub genre_name: Option<String>,
}

/// Fetches ids of `kind` rows modified strictly after `since`.
///
/// Rows whose id is in `excepted` are skipped. Rows are ordered by modification instant;
/// ties keep the order the database returns them in, which is not guaranteed to be stable.
pub async fn get_modified_ids(
    pool: &PgPool,
    kind: EntityKind,
    since: DateTime<Utc>,
    excepted: &[Uuid],
    limit: i64,
) -> sqlx::Result<Vec<ModifiedRow>> {
    let query = format!(
        r#"
        select id, modified
        from {}
        where modified > $1 and not (id = any($2))
        order by modified
        limit $3
        "#,
        kind.table()
    );

    sqlx::query_as::<_, ModifiedRow>(&query)
        .bind(since)
        .bind(excepted)
        .bind(limit)
        .fetch_all(pool)
        .await
}

/// Fetches ids of every `kind` row whatever its modification instant.
///
/// Rows whose id is in `excepted` are skipped. Rows never modified come after every
/// modified row.
pub async fn get_all_ids(
    pool: &PgPool,
    kind: EntityKind,
    excepted: &[Uuid],
    limit: i64,
) -> sqlx::Result<Vec<ModifiedRow>> {
    let query = format!(
        r#"
        select id, modified
        from {}
        where not (id = any($1))
        order by modified nulls last
        limit $2
        "#,
        kind.table()
    );

    sqlx::query_as::<_, ModifiedRow>(&query)
        .bind(excepted)
        .bind(limit)
        .fetch_all(pool)
        .await
}

/// Fetches ids of films referencing any of `entity_ids` through `relation`.
///
/// Films in `excepted` are skipped so callers can page through large fan-outs.
pub async fn get_referencing_film_ids(
    pool: &PgPool,
    relation: FilmRelation,
    entity_ids: &[Uuid],
    excepted: &[Uuid],
    limit: i64,
) -> sqlx::Result<Vec<ModifiedRow>> {
    let query = format!(
        r#"
        select distinct fw.id, fw.modified
        from content.film_work fw
        join {} r on r.film_work_id = fw.id
        where r.{} = any($1) and not (fw.id = any($2))
        order by fw.modified
        limit $3
        "#,
        relation.table, relation.foreign_key
    );

    sqlx::query_as::<_, ModifiedRow>(&query)
        .bind(entity_ids)
        .bind(excepted)
        .bind(limit)
        .fetch_all(pool)
        .await
}

/// Fetches the full flattened projection for the given films.
pub async fn get_film_rows(pool: &PgPool, film_ids: &[Uuid]) -> sqlx::Result<Vec<FilmRow>> {
    sqlx::query_as::<_, FilmRow>(
        r#"
        select
            fw.id,
            fw.title,
            fw.description,
            fw.rating,
            fw.type,
            fw.created,
            fw.modified,
            pfw.role as person_role,
            p.id as person_id,
            p.full_name as person_name,
            g.name as genre_name
        from content.film_work fw
        left join content.person_film_work pfw on pfw.film_work_id = fw.id
        left join content.person p on p.id = pfw.person_id
        left join content.genre_film_work gfw on gfw.film_work_id = fw.id
        left join content.genre g on g.id = gfw.genre_id
        where fw.id = any($1)
        "#,
    )
    .bind(film_ids)
    .fetch_all(pool)
    .await
}
