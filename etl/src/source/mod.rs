//! Read-only access to the relational system of record.

mod base;
pub mod memory;
pub mod postgres;

pub use base::Source;
