//! Error types for `pitchside-core`.
//!
//! These are the domain-level rejections of the ingestion core. Gate
//! verdicts are not errors (a blocked record is a normal, audited outcome);
//! everything here is a refusal that a caller can observe and react to.

use thiserror::Error;

use crate::matches::MatchStatus;

#[derive(Debug, Error)]
pub enum Error {
  /// No active schema is registered for an entity type. Ingestion for that
  /// type is refused, not silently skipped.
  #[error("no active schema for entity type {0:?}")]
  SchemaNotFound(String),

  /// Fuzzy resolution produced two or more candidates within the ambiguity
  /// margin. The record is held for review instead of auto-resolved.
  #[error("ambiguous match: {candidates:?}")]
  AmbiguousMatch { candidates: Vec<(String, f64)> },

  #[error("invalid merge: {0}")]
  InvalidMerge(String),

  #[error("invalid match status transition: {from:?} -> {to:?}")]
  InvalidStateTransition { from: MatchStatus, to: MatchStatus },

  /// A quality-rule definition failed write-time validation.
  #[error("invalid rule {rule_name:?}: {reason}")]
  InvalidRule { rule_name: String, reason: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
