//! Canonical entities and their identity side-tables.
//!
//! A canonical player is the single authoritative record for a real-world
//! player, identified by a stable uid. Provider-local identifiers map to it
//! through xrefs; name variants live in aliases; consolidations are recorded
//! as write-once merge events.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
  importance::Importance,
  record::{field_date, field_f64, field_str, normalize_name},
};

// ─── Lifecycle ───────────────────────────────────────────────────────────────

/// Where a canonical entity is in its life.
///
/// Invariant: `Merged` entities always carry a `merged_into` uid pointing at
/// a non-merged entity. Merge targets are resolved to their final canonical
/// uid at merge time, so no chains or cycles can form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
  Active,
  Retired,
  Merged,
}

// ─── Position ────────────────────────────────────────────────────────────────

/// On-pitch position, as the providers report it (`F`/`M`/`D`/`GK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
  #[serde(rename = "F")]
  Forward,
  #[serde(rename = "M")]
  Midfielder,
  #[serde(rename = "D")]
  Defender,
  #[serde(rename = "GK")]
  Goalkeeper,
}

impl Position {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Forward => "F",
      Self::Midfielder => "M",
      Self::Defender => "D",
      Self::Goalkeeper => "GK",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_uppercase().as_str() {
      "F" => Some(Self::Forward),
      "M" => Some(Self::Midfielder),
      "D" => Some(Self::Defender),
      "GK" => Some(Self::Goalkeeper),
      _ => None,
    }
  }
}

// ─── CanonicalPlayer ─────────────────────────────────────────────────────────

/// The single authoritative record for a player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalPlayer {
  pub uid:         String,
  pub full_name:   String,
  /// Slug form of `full_name`; the store prefilters fuzzy candidates on it.
  pub norm_name:   String,
  pub birth_date:  Option<NaiveDate>,
  pub country:     Option<String>,
  pub team_uid:    Option<String>,
  pub position:    Option<Position>,
  pub jersey_no:   Option<u8>,
  pub importance:  Importance,
  /// Current profile reliability in [0,1].
  pub confidence:  f64,
  pub lifecycle:   LifecycleStatus,
  pub merged_into: Option<String>,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

impl CanonicalPlayer {
  /// Build a fresh canonical player from a normalized provider payload.
  pub fn from_payload(
    uid: String,
    payload: &serde_json::Value,
    confidence: f64,
    now: DateTime<Utc>,
  ) -> Self {
    let full_name = field_str(payload, "name").unwrap_or_default().to_owned();
    let norm_name = normalize_name(&full_name);
    Self {
      uid,
      full_name,
      norm_name,
      birth_date: field_date(payload, "birth_date"),
      country: field_str(payload, "country").map(str::to_owned),
      team_uid: field_str(payload, "team_uid").map(str::to_owned),
      position: field_str(payload, "position").and_then(Position::parse),
      jersey_no: field_f64(payload, "jersey_no").map(|n| n as u8),
      importance: Importance::default(),
      confidence: confidence.clamp(0.0, 1.0),
      lifecycle: LifecycleStatus::Active,
      merged_into: None,
      created_at: now,
      updated_at: now,
    }
  }

  /// Merge payload fields into this profile, taking a field only when the
  /// incoming source confidence beats the stored profile confidence or the
  /// stored field is empty. Never overwrites blindly.
  ///
  /// Returns `true` if anything changed.
  pub fn merge_from_payload(
    &mut self,
    payload: &serde_json::Value,
    source_confidence: f64,
  ) -> bool {
    let stronger = source_confidence > self.confidence;
    let mut changed = false;

    if let Some(name) = field_str(payload, "name") {
      if !name.is_empty() && stronger && name != self.full_name {
        self.full_name = name.to_owned();
        self.norm_name = normalize_name(name);
        changed = true;
      }
    }
    if let Some(bd) = field_date(payload, "birth_date") {
      if self.birth_date.is_none() || (stronger && self.birth_date != Some(bd)) {
        self.birth_date = Some(bd);
        changed = true;
      }
    }
    if let Some(c) = field_str(payload, "country") {
      if self.country.is_none() || (stronger && self.country.as_deref() != Some(c)) {
        self.country = Some(c.to_owned());
        changed = true;
      }
    }
    if let Some(t) = field_str(payload, "team_uid") {
      if self.team_uid.is_none() || (stronger && self.team_uid.as_deref() != Some(t)) {
        self.team_uid = Some(t.to_owned());
        changed = true;
      }
    }
    if let Some(p) = field_str(payload, "position").and_then(Position::parse) {
      if self.position.is_none() || (stronger && self.position != Some(p)) {
        self.position = Some(p);
        changed = true;
      }
    }
    if let Some(j) = field_f64(payload, "jersey_no").map(|n| n as u8) {
      if self.jersey_no.is_none() || (stronger && self.jersey_no != Some(j)) {
        self.jersey_no = Some(j);
        changed = true;
      }
    }
    if stronger {
      self.confidence = source_confidence.clamp(0.0, 1.0);
      changed = true;
    }
    changed
  }

  /// The profile as a flat payload — the gate's view of "last known values"
  /// for jump detection.
  pub fn payload_view(&self) -> serde_json::Value {
    json!({
      "name":       self.full_name,
      "birth_date": self.birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
      "country":    self.country,
      "team_uid":   self.team_uid,
      "position":   self.position.map(Position::as_str),
      "jersey_no":  self.jersey_no,
    })
  }
}

// ─── Alias ───────────────────────────────────────────────────────────────────

/// A name variant for an entity. Many per entity; not unique by name — two
/// entities may legitimately share a historical name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alias {
  pub entity_uid:   String,
  pub display_name: String,
  pub norm_name:    String,
  pub lang:         Option<String>,
  pub source:       Option<String>,
  pub confidence:   f64,
}

impl Alias {
  pub fn new(entity_uid: &str, display_name: &str, source: Option<&str>, confidence: f64) -> Self {
    Self {
      entity_uid:   entity_uid.to_owned(),
      display_name: display_name.to_owned(),
      norm_name:    normalize_name(display_name),
      lang:         None,
      source:       source.map(str::to_owned),
      confidence:   confidence.clamp(0.0, 1.0),
    }
  }
}

// ─── Xref ────────────────────────────────────────────────────────────────────

/// Mapping from a provider's local identifier to a canonical uid.
/// One `(provider, provider_player_id)` pair maps to exactly one uid at any
/// time; the seen timestamps track the mapping's validity window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Xref {
  pub entity_uid:         String,
  pub provider:           String,
  pub provider_player_id: String,
  pub first_seen_at:      DateTime<Utc>,
  pub last_seen_at:       DateTime<Utc>,
}

// ─── MergeEvent ──────────────────────────────────────────────────────────────

/// Write-once log entry for a consolidation of two canonical entities.
/// Never updated or deleted; the authoritative history of all merges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeEvent {
  pub event_id:   Uuid,
  pub from_uid:   String,
  pub to_uid:     String,
  pub reason:     String,
  pub decided_by: String,
  pub decided_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_payload_fills_profile() {
    let p = CanonicalPlayer::from_payload(
      "plr_sofa_p1".into(),
      &json!({
        "name": "J. Smith", "birth_date": "1995-01-01",
        "position": "F", "jersey_no": 9,
      }),
      0.6,
      Utc::now(),
    );
    assert_eq!(p.full_name, "J. Smith");
    assert_eq!(p.norm_name, "j_smith");
    assert_eq!(p.position, Some(Position::Forward));
    assert_eq!(p.jersey_no, Some(9));
    assert_eq!(p.lifecycle, LifecycleStatus::Active);
  }

  #[test]
  fn weaker_source_only_fills_gaps() {
    let now = Utc::now();
    let mut p = CanonicalPlayer::from_payload(
      "plr_x".into(),
      &json!({ "name": "J. Smith", "birth_date": "1995-01-01" }),
      0.8,
      now,
    );

    // Weaker source: must not overwrite the birth date, may fill the team.
    let changed = p.merge_from_payload(
      &json!({ "birth_date": "1990-01-01", "team_uid": "team_arsenal" }),
      0.4,
    );
    assert!(changed);
    assert_eq!(p.birth_date.unwrap().to_string(), "1995-01-01");
    assert_eq!(p.team_uid.as_deref(), Some("team_arsenal"));
    assert_eq!(p.confidence, 0.8);
  }

  #[test]
  fn stronger_source_overwrites() {
    let now = Utc::now();
    let mut p = CanonicalPlayer::from_payload(
      "plr_x".into(),
      &json!({ "name": "J. Smith", "jersey_no": 7 }),
      0.5,
      now,
    );
    p.merge_from_payload(&json!({ "jersey_no": 10 }), 0.9);
    assert_eq!(p.jersey_no, Some(10));
    assert_eq!(p.confidence, 0.9);
  }
}
