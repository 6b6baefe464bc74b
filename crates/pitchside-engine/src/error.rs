//! Error type for `pitchside-engine`.
//!
//! The engine distinguishes domain rejections (ambiguous matches, merge
//! precondition failures, illegal match transitions) from infrastructure
//! failures in the backing store. Only the latter are retried; the former
//! are final and become blocked, audited outcomes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Domain(#[from] pitchside_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl EngineError {
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }

  /// Whether a bounded retry at the write boundary makes sense.
  pub fn is_retryable(&self) -> bool { matches!(self, Self::Store(_)) }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
