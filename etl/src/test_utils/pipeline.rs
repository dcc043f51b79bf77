use config::shared::{BatchConfig, PipelineConfig, RetryConfig};

use crate::destination::Destination;
use crate::pipeline::Pipeline;
use crate::source::Source;
use crate::state::store::StateStore;

/// Returns a pipeline configuration with millisecond polling and retries.
pub fn test_pipeline_config(page_size: usize) -> PipelineConfig {
    PipelineConfig {
        batch: BatchConfig { page_size },
        poll_interval_ms: 10,
        retry: RetryConfig {
            initial_delay_ms: 1,
            backoff_factor: 2.0,
            max_delay_ms: 4,
        },
    }
}

/// Creates a pipeline over the given collaborators using [`test_pipeline_config`].
pub fn create_pipeline<Src, S, D>(
    source: Src,
    state_store: S,
    destination: D,
    page_size: usize,
) -> Pipeline<Src, S, D>
where
    Src: Source + Clone + Send + Sync + 'static,
    S: StateStore + Send + Sync + 'static,
    D: Destination + Send + Sync + 'static,
{
    Pipeline::new(
        test_pipeline_config(page_size),
        source,
        state_store,
        destination,
    )
}
