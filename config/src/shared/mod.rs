mod base;
mod connection;
mod destination;
mod indexer;
mod log;
mod pipeline;
mod state_store;

pub use base::*;
pub use connection::*;
pub use destination::*;
pub use indexer::*;
pub use log::*;
pub use pipeline::*;
pub use state_store::*;
