//! Core types and trait definitions for the Pitchside ingestion core.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod audit;
pub mod entity;
pub mod error;
pub mod importance;
pub mod matches;
pub mod record;
pub mod rule;
pub mod store;
pub mod verdict;

pub use error::{Error, Result};
