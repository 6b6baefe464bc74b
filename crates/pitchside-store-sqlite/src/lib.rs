//! SQLite backend for the Pitchside ingest store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. The single writer connection
//! also serializes all row mutation, which is what gives resolution and
//! merge their per-entity ordering guarantees.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
