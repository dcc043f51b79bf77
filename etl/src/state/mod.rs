//! Persisted progress of the indexing pipeline.
//!
//! Raw key/value persistence lives in [`store`]; [`cursor::Cursor`] layers the typed
//! watermark, excepted ids and first-run flag on top of it.

pub mod cursor;
pub mod store;
