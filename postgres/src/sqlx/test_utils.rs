use chrono::{DateTime, Utc};
use config::shared::{IntoConnectOptions, PgConnectionConfig, TlsConfig};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;


/// Builds a connection config for a uniquely named throwaway database.
///
/// Configuration is read from environment variables:
/// - `TESTS_DATABASE_HOST`: Postgres server hostname (required)
/// - `TESTS_DATABASE_PORT`: Postgres server port (required)
/// - `TESTS_DATABASE_USERNAME`: Database user (required)
/// - `TESTS_DATABASE_PASSWORD`: Database password (optional)
pub fn local_pg_connection_config() -> PgConnectionConfig {
    PgConnectionConfig {
        host: std::env::var("TESTS_DATABASE_HOST").expect("TESTS_DATABASE_HOST must be set"),
        port: std::env::var("TESTS_DATABASE_PORT")
            .expect("TESTS_DATABASE_PORT must be set")
            .parse()
            .expect("TESTS_DATABASE_PORT must be a valid port number"),
        name: Uuid::new_v4().to_string(),
        username: std::env::var("TESTS_DATABASE_USERNAME")
            .expect("TESTS_DATABASE_USERNAME must be set"),
        password: std::env::var("TESTS_DATABASE_PASSWORD")
            .ok()
            .map(Into::into),
        tls: TlsConfig {
            trusted_root_certs: String::new(),
            enabled: false,
        },
    }
}

/// Creates a new Postgres database and returns a connection pool.
///
/// # Panics
/// Panics if connection or database creation fails.
pub async fn create_pg_database(config: &PgConnectionConfig) -> PgPool {
    // Create the database via a single connection.
    let mut connection = PgConnection::connect_with(&config.without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"create database "{}";"#, config.name))
        .await
        .expect("Failed to create database");

    PgPool::connect_with(config.with_db())
        .await
        .expect("Failed to connect to Postgres")
}

/// Drops a Postgres database and terminates all connections.
///
/// This function will not panic on errors, it logs them and continues so that cleanup
/// doesn't fail when the database is already gone.
pub async fn drop_pg_database(config: &PgConnectionConfig) {
    let mut connection = match PgConnection::connect_with(&config.without_db()).await {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("warning: failed to connect to Postgres for cleanup: {e}");
            return;
        }
    };

    if let Err(e) = connection
        .execute(&*format!(
            r#"
            select pg_terminate_backend(pg_stat_activity.pid)
            from pg_stat_activity
            where pg_stat_activity.datname = '{}'
            and pid <> pg_backend_pid();"#,
            config.name
        ))
        .await
    {
        eprintln!(
            "warning: failed to terminate connections for database {}: {}",
            config.name, e
        );
    }

    if let Err(e) = connection
        .execute(&*format!(r#"drop database if exists "{}";"#, config.name))
        .await
    {
        eprintln!("warning: failed to drop database {}: {}", config.name, e);
    }
}

/// Creates the `content` schema tables read by the indexer.
///
/// # Panics
/// Panics if any statement fails.
pub async fn create_content_schema(pool: &PgPool) {
    let statements = [
        "create schema if not exists content;".to_string(),
        r#"
        create table content.film_work (
            id uuid primary key,
            title text not null,
            description text,
            creation_date date,
            rating float,
            type text not null,
            created timestamp with time zone,
            modified timestamp with time zone
        );"#
        .to_string(),
        r#"
        create table content.person (
            id uuid primary key,
            full_name text not null,
            created timestamp with time zone,
            modified timestamp with time zone
        );"#
        .to_string(),
        r#"
        create table content.genre (
            id uuid primary key,
            name text not null,
            description text,
            created timestamp with time zone,
            modified timestamp with time zone
        );"#
        .to_string(),
        r#"
        create table content.person_film_work (
            id uuid primary key,
            film_work_id uuid not null references content.film_work (id) on delete cascade,
            person_id uuid not null references content.person (id) on delete cascade,
            role text not null,
            created timestamp with time zone
        );"#
        .to_string(),
        r#"
        create table content.genre_film_work (
            id uuid primary key,
            film_work_id uuid not null references content.film_work (id) on delete cascade,
            genre_id uuid not null references content.genre (id) on delete cascade,
            created timestamp with time zone
        );"#
        .to_string(),
    ];

    for statement in statements {
        pool.execute(statement.as_str())
            .await
            .expect("Failed to create content schema");
    }
}

/// Inserts a film and returns its id.
pub async fn insert_film(
    pool: &PgPool,
    title: &str,
    rating: Option<f64>,
    modified: DateTime<Utc>,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into content.film_work (id, title, description, rating, type, created, modified)
        values ($1, $2, $3, $4, 'movie', $5, $5)
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(format!("{title} description"))
    .bind(rating)
    .bind(modified)
    .execute(pool)
    .await
    .expect("Failed to insert film");

    id
}

/// Sets a film's `modified` column to null.
pub async fn clear_film_modified(pool: &PgPool, film_id: Uuid) {
    sqlx::query("update content.film_work set modified = null where id = $1")
        .bind(film_id)
        .execute(pool)
        .await
        .expect("Failed to clear film modification instant");
}

/// Inserts a person and returns its id.
pub async fn insert_person(pool: &PgPool, full_name: &str, modified: DateTime<Utc>) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into content.person (id, full_name, created, modified)
        values ($1, $2, $3, $3)
        "#,
    )
    .bind(id)
    .bind(full_name)
    .bind(modified)
    .execute(pool)
    .await
    .expect("Failed to insert person");

    id
}

/// Inserts a genre and returns its id.
pub async fn insert_genre(pool: &PgPool, name: &str, modified: DateTime<Utc>) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into content.genre (id, name, created, modified)
        values ($1, $2, $3, $3)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(modified)
    .execute(pool)
    .await
    .expect("Failed to insert genre");

    id
}

/// Links a person to a film with the given role.
pub async fn link_person(pool: &PgPool, film_id: Uuid, person_id: Uuid, role: &str) {
    sqlx::query(
        r#"
        insert into content.person_film_work (id, film_work_id, person_id, role, created)
        values ($1, $2, $3, $4, now())
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(film_id)
    .bind(person_id)
    .bind(role)
    .execute(pool)
    .await
    .expect("Failed to link person");
}

/// Links a genre to a film.
pub async fn link_genre(pool: &PgPool, film_id: Uuid, genre_id: Uuid) {
    sqlx::query(
        r#"
        insert into content.genre_film_work (id, film_work_id, genre_id, created)
        values ($1, $2, $3, now())
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(film_id)
    .bind(genre_id)
    .execute(pool)
    .await
    .expect("Failed to link genre");
}
