//! Search index destinations receiving merged film documents.
//!
//! This module provides the core [`Destination`] trait together with an in-memory
//! implementation for tests and an Elasticsearch implementation for production.

mod base;
pub mod elasticsearch;
pub mod memory;

pub use base::Destination;
