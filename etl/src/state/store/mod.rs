mod base;
pub mod memory;
pub mod redis;

pub use base::StateStore;
