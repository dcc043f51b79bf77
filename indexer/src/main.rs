//! Movies search indexer service binary.
//!
//! Loads the configuration, initializes logging, then keeps the search index in sync with
//! the movies database until interrupted.

use std::process::ExitCode;

use telemetry::tracing::init_tracing;
use tracing::{error, info};

use crate::config::load_indexer_config;
use crate::core::start_indexer;
use crate::error::{IndexerError, IndexerResult};

mod config;
mod core;
mod error;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run() -> IndexerResult<()> {
    let indexer_config = load_indexer_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"), &indexer_config.log)
        .map_err(IndexerError::config)?;

    info!(
        page_size = indexer_config.pipeline.batch.page_size,
        poll_interval_ms = indexer_config.pipeline.poll_interval_ms,
        "starting indexer"
    );

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_indexer(indexer_config));

    if let Err(err) = &result {
        error!("{err}");
    }

    result
}
