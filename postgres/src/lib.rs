//! Read-only access to the `content` schema of the movies database.
//!
//! Every query is parameterized; ids are bound as `uuid[]` arrays and never interpolated
//! into the statement text.

pub mod content;
pub mod db;
pub mod schema;
#[cfg(feature = "test-utils")]
pub mod sqlx;
