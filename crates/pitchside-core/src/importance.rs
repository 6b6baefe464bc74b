//! Importance scoring — payload-only heuristics, no store access.
//!
//! Scores land in [0,1] and map to a tier (A–D) and a fetch priority (1–5,
//! 1 highest). The weights are deliberately concentrated here so they can be
//! iterated on without touching the resolver.

use serde_json::Value;
use serde::{Deserialize, Serialize};

use crate::record::{EntityKind, field_f64, field_str};

// ─── Tier & priority ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportanceTier {
  A,
  B,
  C,
  D,
}

impl ImportanceTier {
  pub fn from_score(s: f64) -> Self {
    if s >= 0.80 {
      Self::A
    } else if s >= 0.60 {
      Self::B
    } else if s >= 0.40 {
      Self::C
    } else {
      Self::D
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::A => "A",
      Self::B => "B",
      Self::C => "C",
      Self::D => "D",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "A" => Some(Self::A),
      "B" => Some(Self::B),
      "C" => Some(Self::C),
      "D" => Some(Self::D),
      _ => None,
    }
  }
}

/// Higher score, smaller number (1 = fetch first).
pub fn priority_from_score(s: f64) -> u8 {
  if s >= 0.80 {
    1
  } else if s >= 0.60 {
    2
  } else if s >= 0.40 {
    3
  } else if s >= 0.20 {
    4
  } else {
    5
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Importance {
  pub score:    f64,
  pub tier:     ImportanceTier,
  pub priority: u8,
}

impl Importance {
  pub fn from_score(score: f64) -> Self {
    let score = score.clamp(0.0, 1.0);
    Self { score, tier: ImportanceTier::from_score(score), priority: priority_from_score(score) }
  }
}

impl Default for Importance {
  fn default() -> Self { Self::from_score(0.30) }
}

// ─── Scoring ─────────────────────────────────────────────────────────────────

/// Score a payload for its entity kind.
pub fn score(entity: EntityKind, payload: &Value) -> Importance {
  let s = match entity {
    EntityKind::Player => score_player(payload),
    EntityKind::Coach => score_coach(payload),
    EntityKind::Referee => score_referee(payload),
    _ => 0.30,
  };
  Importance::from_score(s)
}

fn clamp01(x: f64) -> f64 { x.clamp(0.0, 1.0) }

fn score_player(p: &Value) -> f64 {
  let mut s = match field_str(p, "position").map(str::to_ascii_uppercase).as_deref() {
    Some("F") => 0.70,
    Some("M") => 0.60,
    Some("D") => 0.55,
    Some("GK") => 0.50,
    _ => 0.50,
  };

  if let Some(prob) = field_f64(p, "starter_prob") {
    s += 0.30 * clamp01(prob);
  } else if let Some(starter) = p.get("starter").and_then(Value::as_bool) {
    if starter {
      s += 0.20;
    }
  }

  // Market value in millions, stepped.
  if let Some(mv) = field_f64(p, "market_value_m") {
    s += if mv >= 80.0 {
      0.20
    } else if mv >= 40.0 {
      0.12
    } else if mv >= 20.0 {
      0.07
    } else if mv >= 5.0 {
      0.03
    } else {
      0.0
    };
  }

  if let Some(minutes) = field_f64(p, "minutes_rolling") {
    s += 0.15 * clamp01(minutes);
  }

  // Core squad numbers get a nudge.
  match field_f64(p, "jersey_no").map(|n| n as u32) {
    Some(10) | Some(7) | Some(9) => s += 0.06,
    Some(8) | Some(11) => s += 0.04,
    Some(1) => s += 0.03,
    _ => {}
  }

  if p.get("key_flag").and_then(Value::as_bool) == Some(true) {
    s += 0.10;
  }

  clamp01(s)
}

fn score_coach(p: &Value) -> f64 {
  let mut s = 0.55;
  for (field, weight) in [("stability", 0.25), ("style_impact", 0.25), ("reputation", 0.20)] {
    if let Some(v) = field_f64(p, field) {
      s += weight * clamp01(v);
    }
  }
  clamp01(s)
}

fn score_referee(p: &Value) -> f64 {
  let mut s = 0.45;
  if let Some(rr) = field_f64(p, "red_rate") {
    s += 0.20 * clamp01(rr);
  }
  if let Some(pr) = field_f64(p, "penalty_rate") {
    s += 0.15 * clamp01(pr);
  }
  if p.get("fifa_badge").and_then(Value::as_bool) == Some(true) {
    s += 0.10;
  }
  clamp01(s)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn starter_forward_outranks_bench_keeper() {
    let star = score(
      EntityKind::Player,
      &json!({ "position": "F", "starter_prob": 0.95, "market_value_m": 90, "jersey_no": 9 }),
    );
    let bench = score(EntityKind::Player, &json!({ "position": "GK", "starter": false }));
    assert!(star.score > bench.score);
    assert_eq!(star.tier, ImportanceTier::A);
    assert_eq!(star.priority, 1);
  }

  #[test]
  fn unknown_entity_gets_base_score() {
    let imp = score(EntityKind::Team, &json!({}));
    assert_eq!(imp.tier, ImportanceTier::D);
    assert_eq!(imp.priority, 4);
  }

  #[test]
  fn referee_badge_and_rates_add_up() {
    let imp = score(
      EntityKind::Referee,
      &json!({ "red_rate": 1.0, "penalty_rate": 1.0, "fifa_badge": true }),
    );
    assert_eq!(imp.tier, ImportanceTier::A);
  }
}
