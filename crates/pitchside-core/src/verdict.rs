//! Quality-gate verdicts.

use serde::{Deserialize, Serialize};

use crate::rule::Severity;

/// Outcome of rule evaluation on an incoming record. Doubles as the status
/// column of the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
  Accepted,
  Warn,
  Blocked,
}

impl VerdictStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Accepted => "accepted",
      Self::Warn => "warn",
      Self::Blocked => "blocked",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "accepted" => Some(Self::Accepted),
      "warn" => Some(Self::Warn),
      "blocked" => Some(Self::Blocked),
      _ => None,
    }
  }
}

/// One rule that fired during evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggeredRule {
  pub rule_name: String,
  pub severity:  Severity,
  pub detail:    String,
}

/// The gate's decision for one record. All triggered rules are reported,
/// not just the first; any block-severity trigger decides the status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
  pub status:    VerdictStatus,
  pub triggered: Vec<TriggeredRule>,
}

impl Verdict {
  pub fn accepted() -> Self {
    Self { status: VerdictStatus::Accepted, triggered: Vec::new() }
  }

  /// Derive the status from the triggered set: any block ⇒ Blocked, any
  /// warn ⇒ Warn, none ⇒ Accepted.
  pub fn from_triggered(triggered: Vec<TriggeredRule>) -> Self {
    let status = if triggered.iter().any(|t| t.severity == Severity::Block) {
      VerdictStatus::Blocked
    } else if triggered.is_empty() {
      VerdictStatus::Accepted
    } else {
      VerdictStatus::Warn
    };
    Self { status, triggered }
  }

  pub fn is_blocked(&self) -> bool { self.status == VerdictStatus::Blocked }

  /// Human-readable summary for the audit trail.
  pub fn message(&self) -> Option<String> {
    if self.triggered.is_empty() {
      return None;
    }
    Some(
      self
        .triggered
        .iter()
        .map(|t| format!("{}:{} ({})", t.severity.as_str(), t.rule_name, t.detail))
        .collect::<Vec<_>>()
        .join(" | "),
    )
  }
}
