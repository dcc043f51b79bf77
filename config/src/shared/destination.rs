use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::ValidationError;

fn default_index() -> String {
    DestinationConfig::DEFAULT_INDEX.to_string()
}

/// Configuration for the search index receiving merged film documents.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid accidentally
/// leaking secrets in the config into serialized forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationConfig {
    /// Keeps documents in process memory. Only useful for local runs and tests.
    Memory,
    /// Elasticsearch destination reached over its HTTP API.
    Elasticsearch {
        /// Base url of the cluster, e.g. `http://localhost:9200`.
        url: String,
        /// Name of the index documents are written to.
        #[serde(default = "default_index")]
        index: String,
        /// Username for basic authentication.
        username: Option<String>,
        /// Password for basic authentication.
        password: Option<SecretString>,
    },
}

impl DestinationConfig {
    /// Index used when none is configured.
    pub const DEFAULT_INDEX: &'static str = "movies";

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            DestinationConfig::Memory => Ok(()),
            DestinationConfig::Elasticsearch { url, index, .. } => {
                if url.trim().is_empty() {
                    return Err(ValidationError::EmptyField(
                        "destination.elasticsearch.url".to_string(),
                    ));
                }
                if index.trim().is_empty() {
                    return Err(ValidationError::EmptyField(
                        "destination.elasticsearch.index".to_string(),
                    ));
                }

                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elasticsearch_index_defaults_to_movies() {
        let config: DestinationConfig = serde_json::from_str(
            r#"{"elasticsearch": {"url": "http://localhost:9200"}}"#,
        )
        .unwrap();

        match config {
            DestinationConfig::Elasticsearch { index, .. } => assert_eq!(index, "movies"),
            DestinationConfig::Memory => panic!("expected elasticsearch destination"),
        }
    }

    #[test]
    fn test_empty_url_is_rejected() {
        let config = DestinationConfig::Elasticsearch {
            url: " ".to_string(),
            index: "movies".to_string(),
            username: None,
            password: None,
        };

        assert!(matches!(
            config.validate(),
            Err(ValidationError::EmptyField(_))
        ));
    }
}
