//! The quality gate — rule evaluation over one incoming record.
//!
//! Evaluation is pure: everything it needs beyond the record itself (the
//! last known profile, window aggregates, signatures already seen in the
//! run) arrives through [`GateContext`]. Built-in payload checks run before
//! registry rules; all triggered rules are reported, not just the first.

use std::collections::{HashMap, HashSet};

use pitchside_core::{
  record::{RawRecord, field_date, field_f64},
  rule::{QualityRule, RuleParams, SchemaDefinition, Severity},
  verdict::{TriggeredRule, Verdict},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serialized payloads above this size are blocked outright.
const MAX_PAYLOAD_CHARS: usize = 200_000;

/// Probability floor for PSI terms, so empty bins stay finite.
const PSI_EPSILON: f64 = 1e-6;

const DAYS_PER_YEAR: f64 = 365.25;

// ─── Context ─────────────────────────────────────────────────────────────────

/// Windowed aggregates maintained outside a single evaluation — typically
/// by the scheduler that owns the ingestion window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateAggregates {
  /// Per-field null ratio observed over the current window.
  #[serde(default)]
  pub null_ratios: HashMap<String, f64>,
  /// Per-field numeric samples observed over the current window (PSI).
  #[serde(default)]
  pub samples:     HashMap<String, Vec<f64>>,
}

/// Everything the gate knows beyond the record itself.
#[derive(Debug, Clone, Default)]
pub struct GateContext {
  /// Last known values for the entity this record resolves to, if any.
  /// Jump rules are skipped when absent.
  pub prior:           Option<Value>,
  pub aggregates:      GateAggregates,
  /// Signatures already audited in this run.
  pub seen_signatures: HashSet<String>,
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

/// Evaluate one record against the built-in checks, the schema's required
/// fields, and the registered rules for its entity type.
pub fn evaluate(
  record: &RawRecord,
  schema: &SchemaDefinition,
  rules: &[QualityRule],
  ctx: &GateContext,
) -> Verdict {
  let mut triggered = Vec::new();

  builtin_checks(record, schema, &mut triggered);
  for rule in rules {
    if let Some(detail) = rule_detail(rule, record, ctx) {
      triggered.push(TriggeredRule {
        rule_name: rule.rule_name.clone(),
        severity:  rule.severity,
        detail,
      });
    }
  }

  Verdict::from_triggered(triggered)
}

fn builtin_checks(
  record: &RawRecord,
  schema: &SchemaDefinition,
  triggered: &mut Vec<TriggeredRule>,
) {
  let empty = match &record.payload {
    Value::Object(map) => map.is_empty(),
    Value::Null => true,
    _ => false,
  };
  if empty {
    triggered.push(TriggeredRule {
      rule_name: "payload_empty".into(),
      severity:  Severity::Block,
      detail:    "payload carries no fields".into(),
    });
    return;
  }

  let serialized_len = record.payload.to_string().len();
  if serialized_len > MAX_PAYLOAD_CHARS {
    triggered.push(TriggeredRule {
      rule_name: "payload_oversize".into(),
      severity:  Severity::Block,
      detail:    format!("{serialized_len} chars exceeds {MAX_PAYLOAD_CHARS}"),
    });
  }

  if record.confidence.is_none() {
    triggered.push(TriggeredRule {
      rule_name: "missing_confidence".into(),
      severity:  Severity::Warn,
      detail:    "record carries no source confidence".into(),
    });
  }

  let missing: Vec<&str> = schema
    .required_fields()
    .filter(|f| is_null(&record.payload, f))
    .collect();
  if !missing.is_empty() {
    triggered.push(TriggeredRule {
      rule_name: "schema_required".into(),
      severity:  Severity::Block,
      detail:    format!("missing required fields: {}", missing.join(", ")),
    });
  }
}

/// `Some(detail)` when the rule fires, `None` otherwise.
fn rule_detail(rule: &QualityRule, record: &RawRecord, ctx: &GateContext) -> Option<String> {
  match &rule.params {
    RuleParams::NullRatio { fields, max_ratio } => {
      let nulls = fields.iter().filter(|f| is_null(&record.payload, f)).count();
      let record_ratio = nulls as f64 / fields.len().max(1) as f64;
      // The record's own null fraction combined with the worst windowed
      // ratio over the same fields.
      let window_ratio = fields
        .iter()
        .filter_map(|f| ctx.aggregates.null_ratios.get(f.as_str()).copied())
        .fold(0.0_f64, f64::max);
      let ratio = record_ratio.max(window_ratio);
      (ratio > *max_ratio).then(|| format!("null ratio {ratio:.3} > {max_ratio}"))
    }

    RuleParams::Bounds { field, min, max } => {
      let value = field_f64(&record.payload, field)?;
      (value < *min || value > *max)
        .then(|| format!("{field}={value} outside [{min}, {max}]"))
    }

    RuleParams::Jump { field, max_delta } => {
      let prior = ctx.prior.as_ref()?;
      let delta = match (
        field_date(&record.payload, field),
        field_date(prior, field),
      ) {
        (Some(new), Some(old)) => {
          (new - old).num_days().abs() as f64 / DAYS_PER_YEAR
        }
        _ => {
          let new = field_f64(&record.payload, field)?;
          let old = field_f64(prior, field)?;
          (new - old).abs()
        }
      };
      (delta > *max_delta).then(|| format!("{field} moved by {delta:.2} > {max_delta}"))
    }

    RuleParams::Psi { field, bin_edges, baseline, threshold } => {
      let samples = ctx.aggregates.samples.get(field.as_str())?;
      if samples.is_empty() {
        return None;
      }
      let mut window: Vec<f64> = samples.clone();
      if let Some(v) = field_f64(&record.payload, field) {
        window.push(v);
      }
      let psi = population_stability(&window, bin_edges, baseline);
      (psi > *threshold).then(|| format!("{field} psi {psi:.3} > {threshold}"))
    }

    RuleParams::Duplicate => {
      let sig = record.signature();
      ctx
        .seen_signatures
        .contains(&sig)
        .then(|| format!("signature {} already seen in run", &sig[..12.min(sig.len())]))
    }
  }
}

fn is_null(payload: &Value, field: &str) -> bool {
  match payload.get(field) {
    None | Some(Value::Null) => true,
    Some(Value::String(s)) => s.trim().is_empty(),
    _ => false,
  }
}

/// PSI of `window` bucketed over `bin_edges` against `baseline` proportions.
/// Out-of-range values count into the nearest end bin.
fn population_stability(window: &[f64], bin_edges: &[f64], baseline: &[f64]) -> f64 {
  let bins = baseline.len();
  let mut counts = vec![0usize; bins];
  for &v in window {
    let idx = bin_edges[1..bin_edges.len() - 1]
      .iter()
      .position(|edge| v < *edge)
      .unwrap_or(bins - 1);
    counts[idx] += 1;
  }

  let total = window.len() as f64;
  counts
    .iter()
    .zip(baseline)
    .map(|(&count, &expected)| {
      let p = (count as f64 / total).max(PSI_EPSILON);
      let q = expected.max(PSI_EPSILON);
      (p - q) * (p / q).ln()
    })
    .sum()
}

#[cfg(test)]
mod tests {
  use super::*;
  use pitchside_core::{
    record::EntityKind,
    rule::{FieldDef, FieldKind, SchemaStatus},
    verdict::VerdictStatus,
  };
  use serde_json::json;

  fn schema(required: &[&str]) -> SchemaDefinition {
    SchemaDefinition {
      schema_name:    "player".into(),
      schema_version: "1".into(),
      fields:         required
        .iter()
        .map(|f| FieldDef { name: (*f).to_owned(), kind: FieldKind::Text, required: true })
        .collect(),
      status:         SchemaStatus::Active,
    }
  }

  fn record(payload: Value, confidence: Option<f64>) -> RawRecord {
    RawRecord {
      entity_type: EntityKind::Player,
      provider: "sofa".into(),
      provider_local_id: "p1".into(),
      source_id: "sofa".into(),
      payload,
      confidence,
      snapshot_ts: None,
    }
  }

  fn rule(name: &str, params: RuleParams, severity: Severity) -> QualityRule {
    QualityRule {
      rule_name: name.into(),
      entity: EntityKind::Player,
      params,
      severity,
    }
  }

  #[test]
  fn empty_payload_blocks() {
    let v = evaluate(&record(json!({}), Some(0.9)), &schema(&[]), &[], &Default::default());
    assert_eq!(v.status, VerdictStatus::Blocked);
    assert_eq!(v.triggered[0].rule_name, "payload_empty");
  }

  #[test]
  fn missing_confidence_warns() {
    let v = evaluate(
      &record(json!({ "name": "J. Smith" }), None),
      &schema(&[]),
      &[],
      &Default::default(),
    );
    assert_eq!(v.status, VerdictStatus::Warn);
    assert!(v.message().unwrap().contains("missing_confidence"));
  }

  #[test]
  fn missing_required_field_blocks() {
    let v = evaluate(
      &record(json!({ "name": "  " }), Some(0.9)),
      &schema(&["name"]),
      &[],
      &Default::default(),
    );
    assert_eq!(v.status, VerdictStatus::Blocked);
    assert!(v.message().unwrap().contains("schema_required"));
  }

  #[test]
  fn bounds_rule_fires_on_out_of_range() {
    let rules = [rule(
      "age_bounds",
      RuleParams::Bounds { field: "age".into(), min: 15.0, max: 50.0 },
      Severity::Warn,
    )];
    let v = evaluate(
      &record(json!({ "name": "X", "age": 61 }), Some(0.9)),
      &schema(&[]),
      &rules,
      &Default::default(),
    );
    assert_eq!(v.status, VerdictStatus::Warn);

    let ok = evaluate(
      &record(json!({ "name": "X", "age": 27 }), Some(0.9)),
      &schema(&[]),
      &rules,
      &Default::default(),
    );
    assert_eq!(ok.status, VerdictStatus::Accepted);
  }

  #[test]
  fn jump_rule_compares_dates_in_years() {
    let rules = [rule(
      "birth_date_jump",
      RuleParams::Jump { field: "birth_date".into(), max_delta: 2.0 },
      Severity::Block,
    )];
    let ctx = GateContext {
      prior: Some(json!({ "birth_date": "1995-01-01" })),
      ..Default::default()
    };
    // Fifty years off the stored value: blocked.
    let v = evaluate(
      &record(json!({ "name": "X", "birth_date": "1945-01-01" }), Some(0.9)),
      &schema(&[]),
      &rules,
      &ctx,
    );
    assert_eq!(v.status, VerdictStatus::Blocked);

    // No prior entity: the rule is skipped entirely.
    let fresh = evaluate(
      &record(json!({ "name": "X", "birth_date": "1945-01-01" }), Some(0.9)),
      &schema(&[]),
      &rules,
      &Default::default(),
    );
    assert_eq!(fresh.status, VerdictStatus::Accepted);
  }

  #[test]
  fn null_ratio_combines_record_and_window() {
    let rules = [rule(
      "sparse_profile",
      RuleParams::NullRatio {
        fields:    vec!["country".into(), "birth_date".into()],
        max_ratio: 0.4,
      },
      Severity::Warn,
    )];
    let v = evaluate(
      &record(json!({ "name": "X", "country": "DE" }), Some(0.9)),
      &schema(&[]),
      &rules,
      &Default::default(),
    );
    // One of two fields null: 0.5 > 0.4.
    assert_eq!(v.status, VerdictStatus::Warn);

    let mut ctx = GateContext::default();
    ctx.aggregates.null_ratios.insert("country".into(), 0.9);
    let windowed = evaluate(
      &record(
        json!({ "name": "X", "country": "DE", "birth_date": "1995-01-01" }),
        Some(0.9),
      ),
      &schema(&[]),
      &rules,
      &ctx,
    );
    assert_eq!(windowed.status, VerdictStatus::Warn);
  }

  #[test]
  fn psi_detects_shifted_distribution() {
    let rules = [rule(
      "value_drift",
      RuleParams::Psi {
        field:     "market_value_m".into(),
        bin_edges: vec![0.0, 10.0, 50.0, 200.0],
        baseline:  vec![0.6, 0.3, 0.1],
        threshold: 0.25,
      },
      Severity::Warn,
    )];

    let mut ctx = GateContext::default();
    ctx
      .aggregates
      .samples
      .insert("market_value_m".into(), vec![80.0, 95.0, 120.0, 150.0, 60.0]);
    let v = evaluate(
      &record(json!({ "name": "X", "market_value_m": 110 }), Some(0.9)),
      &schema(&[]),
      &rules,
      &ctx,
    );
    assert_eq!(v.status, VerdictStatus::Warn);

    // Empty window: skipped.
    let skipped = evaluate(
      &record(json!({ "name": "X", "market_value_m": 110 }), Some(0.9)),
      &schema(&[]),
      &rules,
      &Default::default(),
    );
    assert_eq!(skipped.status, VerdictStatus::Accepted);
  }

  #[test]
  fn duplicate_rule_flags_repeated_signature() {
    let rules = [rule("dedup", RuleParams::Duplicate, Severity::Warn)];
    let rec = record(json!({ "name": "X" }), Some(0.9));

    let mut ctx = GateContext::default();
    ctx.seen_signatures.insert(rec.signature());
    let v = evaluate(&rec, &schema(&[]), &rules, &ctx);
    assert_eq!(v.status, VerdictStatus::Warn);
  }

  #[test]
  fn block_outranks_warn_and_reports_all_triggers() {
    let rules = [
      rule(
        "age_bounds",
        RuleParams::Bounds { field: "age".into(), min: 15.0, max: 50.0 },
        Severity::Block,
      ),
      rule("dedup", RuleParams::Duplicate, Severity::Warn),
    ];
    let rec = record(json!({ "name": "X", "age": 99 }), None);
    let mut ctx = GateContext::default();
    ctx.seen_signatures.insert(rec.signature());

    let v = evaluate(&rec, &schema(&[]), &rules, &ctx);
    assert_eq!(v.status, VerdictStatus::Blocked);
    assert_eq!(v.triggered.len(), 3);
  }
}
