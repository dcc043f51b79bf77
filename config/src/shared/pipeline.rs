use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Paging configuration for change detection and root resolution.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Maximum number of ids fetched per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl BatchConfig {
    pub const DEFAULT_PAGE_SIZE: usize = 100;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.page_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.batch.page_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    BatchConfig::DEFAULT_PAGE_SIZE
}

/// Exponential backoff applied to every source, cursor and sink call.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Multiplier applied to the delay after each failed retry. Must be >= 1.0.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Upper bound for the delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl RetryConfig {
    pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

    pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

    pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.backoff_factor.is_nan() || self.backoff_factor < 1.0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.retry.backoff_factor".to_string(),
                constraint: "must be greater than or equal to 1.0".to_string(),
            });
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.retry.initial_delay_ms".to_string(),
                constraint: "must not exceed `max_delay_ms`".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    RetryConfig::DEFAULT_INITIAL_DELAY_MS
}

fn default_backoff_factor() -> f64 {
    RetryConfig::DEFAULT_BACKOFF_FACTOR
}

fn default_max_delay_ms() -> u64 {
    RetryConfig::DEFAULT_MAX_DELAY_MS
}

/// Configuration of the indexing loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    #[serde(default)]
    pub batch: BatchConfig,
    /// Idle time between two steady-state cycles, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl PipelineConfig {
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.batch.validate()?;
        self.retry.validate()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            poll_interval_ms: default_poll_interval_ms(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    PipelineConfig::DEFAULT_POLL_INTERVAL_MS
}
