use config::shared::{DestinationConfig, IndexerConfig, StateStoreConfig};
use etl::destination::Destination;
use etl::destination::elasticsearch::{ElasticsearchConfig, ElasticsearchDestination};
use etl::destination::memory::MemoryDestination;
use etl::pipeline::Pipeline;
use etl::source::postgres::PostgresSource;
use etl::state::store::StateStore;
use etl::state::store::memory::MemoryStateStore;
use etl::state::store::redis::{RedisStateStore, RedisStateStoreConfig};
use secrecy::ExposeSecret;
use tracing::{error, info, warn};

use crate::error::IndexerResult;

// Statically dispatches pipeline creation and start over the configured components.
macro_rules! start_pipeline_dispatch {
    ($pipeline_config:expr, $source:expr, $state_store:expr, $destination:expr) => {{
        let pipeline = Pipeline::new($pipeline_config, $source, $state_store, $destination);
        start_pipeline(pipeline).await
    }};
}

/// Connects to every configured service and runs the pipeline until Ctrl+C.
pub async fn start_indexer(config: IndexerConfig) -> IndexerResult<()> {
    let source = PostgresSource::connect(&config.source);

    match &config.state_store {
        StateStoreConfig::Memory => {
            warn!("using the in-memory state store, progress is lost on restart");

            start_with_state_store(&config, source, MemoryStateStore::new()).await
        }
        StateStoreConfig::Redis {
            host,
            port,
            username,
            password,
            key,
        } => {
            let state_store = RedisStateStore::connect(RedisStateStoreConfig {
                host: host.clone(),
                port: *port,
                username: username.clone(),
                password: password
                    .as_ref()
                    .map(|password| password.expose_secret().to_owned()),
                key: key.clone(),
            })
            .await?;

            start_with_state_store(&config, source, state_store).await
        }
    }
}

async fn start_with_state_store<S>(
    config: &IndexerConfig,
    source: PostgresSource,
    state_store: S,
) -> IndexerResult<()>
where
    S: StateStore + Send + Sync + 'static,
{
    let pipeline_config = config.pipeline.clone();

    match &config.destination {
        DestinationConfig::Memory => {
            let destination = MemoryDestination::new();

            start_pipeline_dispatch!(pipeline_config, source, state_store, destination)
        }
        DestinationConfig::Elasticsearch {
            url,
            index,
            username,
            password,
        } => {
            let destination = ElasticsearchDestination::new(ElasticsearchConfig {
                url: url.clone(),
                index: index.clone(),
                username: username.clone(),
                password: password.clone(),
            })?;

            start_pipeline_dispatch!(pipeline_config, source, state_store, destination)
        }
    }
}

async fn start_pipeline<S, D>(pipeline: Pipeline<PostgresSource, S, D>) -> IndexerResult<()>
where
    S: StateStore + Send + Sync + 'static,
    D: Destination + Send + Sync + 'static,
{
    // Spawn a task to listen for Ctrl+C and trigger shutdown.
    let shutdown_tx = pipeline.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl+c: {err:?}");
            return;
        }

        info!("ctrl+c received, shutting down indexer");
        if let Err(err) = shutdown_tx.shutdown() {
            warn!("failed to send shutdown signal: {err:?}");
        }
    });

    let result = pipeline.run().await;

    // The pipeline may stop on its own, in which case the listener is no longer needed.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    result?;

    Ok(())
}
