//! Configuration types and hierarchical loading for the movies indexer.
//!
//! Configuration is read from `configuration/base.yaml`, then from the file matching the
//! current [`Environment`], and finally from `APP_`-prefixed environment variables.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
