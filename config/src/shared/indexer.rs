use serde::Deserialize;

use crate::Config;
use crate::shared::{
    DestinationConfig, LogConfig, PgConnectionConfig, PipelineConfig, StateStoreConfig,
    ValidationError,
};

/// Complete configuration for the indexer service.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid accidentally
/// leaking secrets in the config into serialized forms.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    /// Connection to the source database.
    pub source: PgConnectionConfig,
    /// Search index receiving merged documents.
    pub destination: DestinationConfig,
    /// Store persisting the sync cursor.
    #[serde(default)]
    pub state_store: StateStoreConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl IndexerConfig {
    /// Validates the complete indexer configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.destination.validate()?;
        self.state_store.validate()?;
        self.pipeline.validate()
    }
}

impl Config for IndexerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
