use config::load_config;
use config::shared::IndexerConfig;

use crate::error::{IndexerError, IndexerResult};

/// Loads and validates the indexer configuration.
pub fn load_indexer_config() -> IndexerResult<IndexerConfig> {
    let config = load_config::<IndexerConfig>().map_err(IndexerError::config)?;
    config.validate().map_err(IndexerError::config)?;

    Ok(config)
}
