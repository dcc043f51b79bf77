use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::ValidationError;

fn default_key() -> String {
    StateStoreConfig::DEFAULT_KEY.to_string()
}

/// Configuration options for the store persisting the sync cursor.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid accidentally
/// leaking secrets in the config into serialized forms.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// The in-memory state store. State is lost on restart.
    #[default]
    Memory,
    /// Redis backed state store. The whole state lives under a single key.
    Redis {
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<SecretString>,
        /// Key holding the serialized state blob.
        #[serde(default = "default_key")]
        key: String,
    },
}

impl StateStoreConfig {
    pub const DEFAULT_KEY: &'static str = "etl_state";

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            StateStoreConfig::Memory => Ok(()),
            StateStoreConfig::Redis { host, key, .. } => {
                if host.trim().is_empty() {
                    return Err(ValidationError::EmptyField(
                        "state_store.redis.host".to_string(),
                    ));
                }
                if key.is_empty() {
                    return Err(ValidationError::EmptyField(
                        "state_store.redis.key".to_string(),
                    ));
                }

                Ok(())
            }
        }
    }
}
