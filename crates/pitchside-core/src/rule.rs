//! Quality-rule and schema-registry definitions.
//!
//! Rule parameters are a tagged variant per rule kind, each carrying a
//! strongly-typed parameter record. They are validated when written to the
//! registry, not at evaluation time.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, record::EntityKind};

// ─── Severity ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Warn,
  Block,
}

impl Severity {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Warn => "warn",
      Self::Block => "block",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "warn" => Some(Self::Warn),
      "block" => Some(Self::Block),
      _ => None,
    }
  }
}

// ─── Rule parameters ─────────────────────────────────────────────────────────

/// The typed parameter payload of a quality rule. The variant name serves as
/// the `rule_kind` discriminant stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleParams {
  /// Null fraction over `fields` must stay at or below `max_ratio`.
  /// The window aggregate is maintained outside a single evaluation and
  /// supplied through the gate context.
  NullRatio { fields: Vec<String>, max_ratio: f64 },

  /// A numeric `field` must lie within `[min, max]`.
  Bounds { field: String, min: f64, max: f64 },

  /// Deviation of `field` from the entity's last known value must stay at
  /// or below `max_delta` (dates compared in years).
  Jump { field: String, max_delta: f64 },

  /// Population stability index of the windowed sample distribution of
  /// `field` against `baseline` proportions over `bin_edges` must stay at
  /// or below `threshold`.
  Psi {
    field:     String,
    bin_edges: Vec<f64>,
    baseline:  Vec<f64>,
    threshold: f64,
  },

  /// The record's fingerprint collides with one already accepted in the
  /// current run.
  Duplicate,
}

impl RuleParams {
  /// The discriminant string stored in the `rule_kind` column.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::NullRatio { .. } => "null_ratio",
      Self::Bounds { .. } => "bounds",
      Self::Jump { .. } => "jump",
      Self::Psi { .. } => "psi",
      Self::Duplicate => "duplicate",
    }
  }
}

// ─── QualityRule ─────────────────────────────────────────────────────────────

/// A quality rule, uniquely keyed by `(rule_name, entity)`. Versionless:
/// the latest registry row wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityRule {
  pub rule_name: String,
  pub entity:    EntityKind,
  pub params:    RuleParams,
  pub severity:  Severity,
}

impl QualityRule {
  /// Write-time validation; evaluation assumes these hold.
  pub fn validate(&self) -> Result<()> {
    let fail = |reason: String| {
      Err(Error::InvalidRule { rule_name: self.rule_name.clone(), reason })
    };

    if self.rule_name.trim().is_empty() {
      return fail("rule_name must not be empty".into());
    }

    match &self.params {
      RuleParams::NullRatio { fields, max_ratio } => {
        if fields.is_empty() {
          return fail("null_ratio needs at least one field".into());
        }
        if !(0.0..=1.0).contains(max_ratio) {
          return fail(format!("max_ratio {max_ratio} outside [0,1]"));
        }
      }
      RuleParams::Bounds { field, min, max } => {
        if field.trim().is_empty() {
          return fail("bounds needs a field".into());
        }
        if min > max {
          return fail(format!("empty bounds interval [{min},{max}]"));
        }
      }
      RuleParams::Jump { field, max_delta } => {
        if field.trim().is_empty() {
          return fail("jump needs a field".into());
        }
        if *max_delta < 0.0 {
          return fail(format!("negative max_delta {max_delta}"));
        }
      }
      RuleParams::Psi { field, bin_edges, baseline, threshold } => {
        if field.trim().is_empty() {
          return fail("psi needs a field".into());
        }
        if bin_edges.len() != baseline.len() + 1 || baseline.is_empty() {
          return fail(format!(
            "psi needs n+1 bin edges for n baseline bins, got {} edges / {} bins",
            bin_edges.len(),
            baseline.len()
          ));
        }
        if !bin_edges.windows(2).all(|w| w[0] < w[1]) {
          return fail("psi bin edges must be strictly ascending".into());
        }
        let sum: f64 = baseline.iter().sum();
        if (sum - 1.0).abs() > 0.01 {
          return fail(format!("psi baseline proportions sum to {sum}, expected 1"));
        }
        if *threshold <= 0.0 {
          return fail(format!("psi threshold {threshold} must be positive"));
        }
      }
      RuleParams::Duplicate => {}
    }
    Ok(())
  }
}

// ─── Schema registry ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaStatus {
  Active,
  Deprecated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
  Text,
  Number,
  Date,
  Boolean,
  Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
  pub name:     String,
  pub kind:     FieldKind,
  #[serde(default)]
  pub required: bool,
}

/// A versioned field-set definition for an entity type. Append-only: new
/// versions are added and old ones deprecated, never deleted, so historical
/// validation behavior stays replayable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
  pub schema_name:    String,
  pub schema_version: String,
  pub fields:         Vec<FieldDef>,
  pub status:         SchemaStatus,
}

impl SchemaDefinition {
  /// Names of fields the schema marks as required.
  pub fn required_fields(&self) -> impl Iterator<Item = &str> {
    self.fields.iter().filter(|f| f.required).map(|f| f.name.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn rule(params: RuleParams) -> QualityRule {
    QualityRule {
      rule_name: "r".into(),
      entity:    EntityKind::Player,
      params,
      severity:  Severity::Warn,
    }
  }

  #[test]
  fn bounds_rejects_empty_interval() {
    let r = rule(RuleParams::Bounds { field: "age".into(), min: 50.0, max: 10.0 });
    assert!(matches!(r.validate(), Err(Error::InvalidRule { .. })));
  }

  #[test]
  fn psi_requires_matching_bins() {
    let r = rule(RuleParams::Psi {
      field:     "market_value_m".into(),
      bin_edges: vec![0.0, 10.0, 50.0],
      baseline:  vec![0.5, 0.3, 0.2],
      threshold: 0.2,
    });
    assert!(r.validate().is_err());

    let ok = rule(RuleParams::Psi {
      field:     "market_value_m".into(),
      bin_edges: vec![0.0, 10.0, 50.0, 200.0],
      baseline:  vec![0.5, 0.3, 0.2],
      threshold: 0.2,
    });
    assert!(ok.validate().is_ok());
  }

  #[test]
  fn discriminants_are_stable() {
    assert_eq!(RuleParams::Duplicate.discriminant(), "duplicate");
    assert_eq!(
      RuleParams::NullRatio { fields: vec![], max_ratio: 0.0 }.discriminant(),
      "null_ratio"
    );
  }
}
