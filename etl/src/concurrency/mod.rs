//! Concurrency utilities for coordinating the indexing pipeline.
//!
//! The [`shutdown`] module implements a watch-based shutdown pattern: a single signal reaches
//! every holder of a receiver, and the pipeline checks it only at page and cycle boundaries
//! so a write is never interrupted halfway.

pub mod shutdown;
