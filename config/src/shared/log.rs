use serde::{Deserialize, Serialize};

/// Where the rolling log file is written.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LogConfig {
    #[serde(default = "default_directory")]
    pub directory: String,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            file_prefix: default_file_prefix(),
        }
    }
}

fn default_directory() -> String {
    "logs".to_string()
}

fn default_file_prefix() -> String {
    "indexer.log".to_string()
}
