//! Utilities for testing the indexing pipeline without external services.
//!
//! - [`fixtures`] - builders for films, persons and genres stored in a
//!   [`crate::source::memory::MemorySource`]
//! - [`pipeline`] - pipeline construction with fast polling and retries
//! - [`test_destination_wrapper`] - destination wrapper recording writes and notifying waiters
//! - [`destination`] and [`state_store`] - wrappers injecting failures into collaborators
//! - [`notify`] - notifications with a timeout so tests fail instead of hanging

pub mod destination;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod faults;
pub mod fixtures;
pub mod notify;
pub mod pipeline;
pub mod state_store;
pub mod test_destination_wrapper;
