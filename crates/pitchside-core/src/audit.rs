//! Ingestion audit records — the append-only trail of every decision.
//!
//! Rows are never mutated after insert. Within a run, a repeated identical
//! signature is recorded once and re-flagged as a duplicate rather than
//! appended again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{record::EntityKind, verdict::VerdictStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
  Ingest,
  Duplicate,
  Merge,
}

impl AuditAction {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Ingest => "ingest",
      Self::Duplicate => "duplicate",
      Self::Merge => "merge",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "ingest" => Some(Self::Ingest),
      "duplicate" => Some(Self::Duplicate),
      "merge" => Some(Self::Merge),
      _ => None,
    }
  }
}

/// Input to [`crate::store::IngestStore::append_audit`].
/// `created_at` is always set by the store; it is not accepted from callers.
#[derive(Debug, Clone)]
pub struct NewAuditRecord {
  pub run_id:      String,
  pub source_id:   String,
  pub entity_type: EntityKind,
  pub entity_id:   String,
  pub action:      AuditAction,
  pub confidence:  Option<f64>,
  pub signature:   Option<String>,
  pub status:      VerdictStatus,
  pub message:     Option<String>,
}

/// A persisted audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
  pub id:          i64,
  pub run_id:      String,
  pub source_id:   String,
  pub entity_type: EntityKind,
  pub entity_id:   String,
  pub action:      AuditAction,
  pub confidence:  Option<f64>,
  pub signature:   Option<String>,
  pub status:      VerdictStatus,
  pub message:     Option<String>,
  pub created_at:  DateTime<Utc>,
}

/// Result of an audit append: the stored row, and whether the append was
/// collapsed into an existing `(run_id, signature)` row.
#[derive(Debug, Clone)]
pub struct AuditAppend {
  pub record:       AuditRecord,
  pub deduplicated: bool,
}
