use std::sync::Arc;
use std::time::Duration;

use fred::prelude::{
    ClientLike, EventInterface, KeysInterface, Pool, ReconnectPolicy, Server, ServerConfig,
    TcpConfig,
};
use fred::types::Builder;
use fred::types::config::UnresponsiveConfig;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::state::store::StateStore;

/// Number of connections kept open to Redis.
const POOL_SIZE: usize = 2;

/// Timeout of each command, internal ones included.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// How long an unacknowledged TCP write may stay pending before the socket is dropped.
#[cfg(target_os = "linux")]
const TCP_USER_TIMEOUT: Duration = Duration::from_secs(5);

/// A connection silent for this long is considered dead and reconnected.
const UNRESPONSIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between checks for unresponsive connections.
const UNRESPONSIVE_CHECK_INTERVAL: Duration = Duration::from_secs(3);

/// Reconnect delays grow from 1ms, doubling, up to this cap.
const MAX_RECONNECT_DELAY_MS: u32 = 2000;

/// Zero keeps reconnecting forever.
const RECONNECT_ATTEMPTS: u32 = 0;

/// Connection settings for [`RedisStateStore`].
#[derive(Debug, Clone)]
pub struct RedisStateStoreConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Key holding the serialized state object.
    pub key: String,
}

/// [`StateStore`] persisting the whole state as one JSON object under a single Redis key.
///
/// Each [`StateStore::set`] re-reads the object, replaces one entry and writes it back.
/// Writes from the same process are serialized. Concurrent writers from other processes are
/// not coordinated, so only one indexer may use a given key at a time.
#[derive(Clone)]
pub struct RedisStateStore {
    client: Pool,
    key: String,
    write_lock: Arc<Mutex<()>>,
}

impl RedisStateStore {
    /// Connects to Redis and waits until the pool is usable.
    pub async fn connect(config: RedisStateStoreConfig) -> EtlResult<Self> {
        let pool = Builder::default_centralized()
            .with_config(|redis_config| {
                redis_config.password = config.password;
                redis_config.username = config.username;
                redis_config.server = ServerConfig::Centralized {
                    server: Server::new(config.host.clone(), config.port),
                };
            })
            .with_connection_config(|config| {
                config.internal_command_timeout = COMMAND_TIMEOUT;
                config.reconnect_on_auth_error = true;
                config.tcp = TcpConfig {
                    #[cfg(target_os = "linux")]
                    user_timeout: Some(TCP_USER_TIMEOUT),
                    ..Default::default()
                };
                config.unresponsive = UnresponsiveConfig {
                    max_timeout: Some(UNRESPONSIVE_TIMEOUT),
                    interval: UNRESPONSIVE_CHECK_INTERVAL,
                };
            })
            .with_performance_config(|config| {
                config.default_command_timeout = COMMAND_TIMEOUT;
            })
            .set_policy(ReconnectPolicy::new_exponential(
                RECONNECT_ATTEMPTS,
                1,
                MAX_RECONNECT_DELAY_MS,
                2,
            ))
            .build_pool(POOL_SIZE)?;

        for client in pool.clients() {
            let mut error_rx = client.error_rx();
            let mut reconnect_rx = client.reconnect_rx();

            tokio::spawn(async move {
                loop {
                    match error_rx.recv().await {
                        Ok((error, Some(server))) => {
                            error!("Redis state store ({server:?}) error: {error:?}");
                        }
                        Ok((error, None)) => {
                            error!("Redis state store error: {error:?}");
                        }
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            tokio::spawn(async move {
                loop {
                    match reconnect_rx.recv().await {
                        Ok(server) => debug!("Redis state store connected to {server:?}"),
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            });
        }

        let connection_handles = pool.connect_pool();
        pool.wait_for_connect().await?;
        tokio::spawn(async move {
            for handle in connection_handles {
                let _ = handle.await;
            }
        });

        info!(
            host = %config.host,
            port = config.port,
            key = %config.key,
            "connected to redis state store"
        );

        Ok(Self {
            client: pool,
            key: config.key,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    async fn load_state(&self) -> EtlResult<Map<String, Value>> {
        let raw: Option<String> = self.client.get(self.key.as_str()).await?;
        let Some(raw) = raw else {
            return Ok(Map::new());
        };

        let state: Value = serde_json::from_str(&raw)?;
        match state {
            Value::Object(state) => Ok(state),
            other => bail!(
                ErrorKind::InvalidData,
                "Persisted state is not a JSON object",
                format!("Key '{}' holds {other}", self.key)
            ),
        }
    }
}

impl StateStore for RedisStateStore {
    async fn get(&self, key: &str) -> EtlResult<Option<Value>> {
        let mut state = self.load_state().await?;

        Ok(state.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> EtlResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut state = self.load_state().await?;
        state.insert(key.to_string(), value);
        let serialized = serde_json::to_string(&state)?;

        self.client
            .set::<(), _, _>(self.key.as_str(), serialized, None, None, false)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    /// Reads the Redis server from `TESTS_REDIS_HOST` and `TESTS_REDIS_PORT` and picks a fresh
    /// key so tests never share state.
    fn local_redis_config() -> RedisStateStoreConfig {
        let host = std::env::var("TESTS_REDIS_HOST").expect("TESTS_REDIS_HOST must be set");
        let port = std::env::var("TESTS_REDIS_PORT")
            .expect("TESTS_REDIS_PORT must be set")
            .parse()
            .expect("TESTS_REDIS_PORT must be a valid port number");

        RedisStateStoreConfig {
            host,
            port,
            username: std::env::var("TESTS_REDIS_USERNAME").ok(),
            password: std::env::var("TESTS_REDIS_PASSWORD").ok(),
            key: format!("indexer_state_{}", Uuid::new_v4().simple()),
        }
    }

    async fn drop_key(store: &RedisStateStore) {
        store
            .client
            .del::<(), _>(store.key.as_str())
            .await
            .expect("Failed to delete test key");
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires a Redis server configured through TESTS_REDIS_*"]
    async fn test_set_merges_into_the_stored_object() {
        let store = RedisStateStore::connect(local_redis_config()).await.unwrap();

        assert_eq!(store.get("time_of_run").await.unwrap(), None);

        store
            .set("time_of_run", json!("2021-06-15T12:00:00+00:00"))
            .await
            .unwrap();
        store.set("is_first_run", json!(false)).await.unwrap();
        store
            .set("time_of_run", json!("2021-06-15T12:05:00+00:00"))
            .await
            .unwrap();

        assert_eq!(
            store.get("time_of_run").await.unwrap(),
            Some(json!("2021-06-15T12:05:00+00:00"))
        );
        assert_eq!(store.get("is_first_run").await.unwrap(), Some(json!(false)));

        let raw: String = store.client.get(store.key.as_str()).await.unwrap();
        let state: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            state,
            json!({
                "time_of_run": "2021-06-15T12:05:00+00:00",
                "is_first_run": false,
            })
        );

        drop_key(&store).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires a Redis server configured through TESTS_REDIS_*"]
    async fn test_state_survives_reconnection() {
        let config = local_redis_config();
        let store = RedisStateStore::connect(config.clone()).await.unwrap();
        store.set("genre_excepted_ids", json!([])).await.unwrap();

        let reconnected = RedisStateStore::connect(config).await.unwrap();
        assert_eq!(
            reconnected.get("genre_excepted_ids").await.unwrap(),
            Some(json!([]))
        );

        drop_key(&store).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires a Redis server configured through TESTS_REDIS_*"]
    async fn test_non_object_state_is_rejected() {
        let store = RedisStateStore::connect(local_redis_config()).await.unwrap();
        store
            .client
            .set::<(), _, _>(store.key.as_str(), "[1, 2]", None, None, false)
            .await
            .unwrap();

        let err = store.get("time_of_run").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        let err = store.set("time_of_run", json!(null)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        drop_key(&store).await;
    }
}
