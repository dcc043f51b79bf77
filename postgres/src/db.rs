use std::time::Duration;

use config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use tracing::info;

/// Maximum number of pooled connections to the source database.
///
/// The indexer issues one query at a time, the extra connection covers pool health checks.
const MAX_SOURCE_CONNECTIONS: u32 = 2;

/// How long a query waits for a pooled connection before failing.
const SOURCE_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds a pool for the source database without opening any connection.
///
/// Connections are established on first use, so an unreachable database surfaces as a
/// failed query the caller can retry rather than as a startup error.
pub fn connect_to_source_database(source_config: &PgConnectionConfig) -> PgPool {
    let options: PgConnectOptions = source_config.with_db();

    let pool = PgPoolOptions::new()
        .max_connections(MAX_SOURCE_CONNECTIONS)
        .acquire_timeout(SOURCE_ACQUIRE_TIMEOUT)
        .connect_lazy_with(options);

    info!(
        host = %source_config.host,
        database = %source_config.name,
        "created source database pool"
    );

    pool
}
