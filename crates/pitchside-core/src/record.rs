//! Incoming provider records, name normalization, deterministic uids, and
//! content signatures.
//!
//! Providers describe the same real-world entity differently; everything in
//! this module exists to make those descriptions comparable: slugged names
//! for candidate search, stable uids for first sightings, and a canonical
//! fingerprint for byte-identical re-ingestion detection.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

// ─── Entity kinds ────────────────────────────────────────────────────────────

/// The kind of real-world subject a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
  Player,
  Team,
  Match,
  Referee,
  Coach,
}

impl EntityKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Player => "player",
      Self::Team => "team",
      Self::Match => "match",
      Self::Referee => "referee",
      Self::Coach => "coach",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "player" => Some(Self::Player),
      "team" => Some(Self::Team),
      "match" => Some(Self::Match),
      "referee" => Some(Self::Referee),
      "coach" => Some(Self::Coach),
      _ => None,
    }
  }
}

// ─── RawRecord ───────────────────────────────────────────────────────────────

/// A normalized record as delivered by a provider-fetch adapter.
///
/// The core never parses provider-specific formats; adapters hand over an
/// entity-typed payload tagged with its provider-scoped identity and the
/// fetch batch it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
  pub entity_type:       EntityKind,
  pub provider:          String,
  pub provider_local_id: String,
  /// Source identifier for the audit trail (supplier / crawler name / URL).
  pub source_id:         String,
  pub payload:           Value,
  /// Source-reported confidence in [0,1]; absence is a warn-level finding.
  pub confidence:        Option<f64>,
  pub snapshot_ts:       Option<DateTime<Utc>>,
}

impl RawRecord {
  /// Deduplication fingerprint over the normalized payload.
  pub fn signature(&self) -> String { signature(&self.payload) }
}

// ─── Normalization ───────────────────────────────────────────────────────────

/// Slug a display name: lowercase, whitespace runs to `_`, everything
/// outside `[a-z0-9_]` stripped.
pub fn normalize_name(name: &str) -> String {
  let mut out = String::with_capacity(name.len());
  let mut last_sep = true;
  for ch in name.trim().chars() {
    if ch.is_whitespace() {
      if !last_sep {
        out.push('_');
        last_sep = true;
      }
    } else {
      for low in ch.to_lowercase() {
        if low.is_ascii_alphanumeric() || low == '_' {
          out.push(low);
          last_sep = false;
        }
      }
    }
  }
  out.trim_end_matches('_').to_owned()
}

/// Short stable digest over `parts`, joined with `||`.
pub fn hash_short(parts: &[&str], len: usize) -> String {
  let mut hasher = Sha256::new();
  for (i, part) in parts.iter().enumerate() {
    if i > 0 {
      hasher.update(b"||");
    }
    hasher.update(part.as_bytes());
  }
  let hex = hex::encode(hasher.finalize());
  hex[..len.min(hex.len())].to_owned()
}

/// Deterministic canonical uid for a player.
///
/// Preferred form is `plr_{provider}_{provider_id}`; when the provider-local
/// identity is missing, fall back to an irreversible, immutable hash of
/// name + birth date.
pub fn make_player_uid(
  provider: Option<&str>,
  provider_player_id: Option<&str>,
  name: Option<&str>,
  birth_date: Option<NaiveDate>,
) -> String {
  match (provider, provider_player_id) {
    (Some(p), Some(id)) if !p.trim().is_empty() && !id.trim().is_empty() => {
      format!("plr_{}_{}", normalize_name(p), normalize_name(id))
    }
    _ => {
      let name_norm = name.map(normalize_name).unwrap_or_default();
      let bd = birth_date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
      let basis = format!("{name_norm}|{bd}");
      format!("plr_global_{}", hash_short(&[&basis], 10))
    }
  }
}

// ─── Signatures ──────────────────────────────────────────────────────────────

/// Deterministic SHA-256 fingerprint of a payload.
///
/// Object keys are serialized in sorted order at every nesting level so the
/// fingerprint is independent of provider field ordering.
pub fn signature(payload: &Value) -> String {
  let mut hasher = Sha256::new();
  hash_value(payload, &mut hasher);
  hex::encode(hasher.finalize())
}

fn hash_value(value: &Value, hasher: &mut Sha256) {
  match value {
    Value::Null => hasher.update(b"n"),
    Value::Bool(b) => hasher.update(if *b { b"t" } else { b"f" }),
    Value::Number(n) => {
      hasher.update(b"#");
      hasher.update(n.to_string().as_bytes());
    }
    Value::String(s) => {
      hasher.update(b"\"");
      hasher.update(s.as_bytes());
    }
    Value::Array(items) => {
      hasher.update(b"[");
      for item in items {
        hash_value(item, hasher);
        hasher.update(b",");
      }
      hasher.update(b"]");
    }
    Value::Object(map) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      hasher.update(b"{");
      for key in keys {
        hasher.update(key.as_bytes());
        hasher.update(b":");
        hash_value(&map[key], hasher);
        hasher.update(b",");
      }
      hasher.update(b"}");
    }
  }
}

// ─── Payload accessors ───────────────────────────────────────────────────────

pub fn field_str<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
  payload.get(field).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

pub fn field_f64(payload: &Value, field: &str) -> Option<f64> {
  let v = payload.get(field)?;
  v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

pub fn field_date(payload: &Value, field: &str) -> Option<NaiveDate> {
  NaiveDate::parse_from_str(field_str(payload, field)?, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn normalize_strips_and_slugs() {
    assert_eq!(normalize_name("  J.  Smith "), "j_smith");
    assert_eq!(normalize_name("Érik ten Hag"), "rik_ten_hag");
    assert_eq!(normalize_name(""), "");
  }

  #[test]
  fn player_uid_prefers_provider_identity() {
    let uid = make_player_uid(Some("sofa"), Some("P-1"), Some("J. Smith"), None);
    assert_eq!(uid, "plr_sofa_p1");
  }

  #[test]
  fn player_uid_falls_back_to_stable_hash() {
    let bd = NaiveDate::from_ymd_opt(1995, 1, 1);
    let a = make_player_uid(None, None, Some("J. Smith"), bd);
    let b = make_player_uid(Some(""), Some(""), Some("j  smith"), bd);
    assert!(a.starts_with("plr_global_"));
    assert_eq!(a, b, "fallback uid must be stable under normalization");
  }

  #[test]
  fn signature_is_order_independent() {
    let a = json!({ "name": "J. Smith", "birth_date": "1995-01-01" });
    let b = json!({ "birth_date": "1995-01-01", "name": "J. Smith" });
    assert_eq!(signature(&a), signature(&b));
    let c = json!({ "name": "J. Smith", "birth_date": "1995-01-02" });
    assert_ne!(signature(&a), signature(&c));
  }

  #[test]
  fn field_accessors_coerce() {
    let p = json!({ "jersey_no": "10", "age": 27.5, "name": "  " });
    assert_eq!(field_f64(&p, "jersey_no"), Some(10.0));
    assert_eq!(field_f64(&p, "age"), Some(27.5));
    assert_eq!(field_str(&p, "name"), None);
  }
}
