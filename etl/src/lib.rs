//! Incremental indexing of the `content` film catalog into a search index.
//!
//! The [`pipeline::Pipeline`] polls a [`source::Source`] for rows modified after a persisted
//! watermark, maps them to the films they belong to, folds the flattened film rows into one
//! document per film and upserts the documents into a [`destination::Destination`]. Progress
//! lives in a [`state::cursor::Cursor`] so restarts resume where the last confirmed write
//! left off.

pub mod concurrency;
pub mod destination;
pub mod error;
#[cfg(feature = "failpoints")]
pub mod failpoints;
mod macros;
pub mod pipeline;
pub mod retry;
pub mod source;
pub mod state;
pub mod sync;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
