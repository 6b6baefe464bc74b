//! Match facts and the fixture status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{field_f64, field_str};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Fixture status. Transitions move monotonically forward except Postponed,
/// which may return to Scheduled or jump to Live. Finished is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
  Scheduled,
  Live,
  Finished,
  Postponed,
}

impl MatchStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Scheduled => "scheduled",
      Self::Live => "live",
      Self::Finished => "finished",
      Self::Postponed => "postponed",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "scheduled" => Some(Self::Scheduled),
      "live" => Some(Self::Live),
      "finished" => Some(Self::Finished),
      "postponed" => Some(Self::Postponed),
      _ => None,
    }
  }

  /// The transition table. Same-status re-ingest is allowed (idempotent
  /// refresh); everything not listed here is rejected.
  pub fn can_transition_to(self, to: Self) -> bool {
    if self == to {
      return true;
    }
    matches!(
      (self, to),
      (Self::Scheduled, Self::Live)
        | (Self::Scheduled, Self::Postponed)
        | (Self::Live, Self::Finished)
        | (Self::Postponed, Self::Scheduled)
        | (Self::Postponed, Self::Live)
    )
  }
}

// ─── Score & odds ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchScore {
  pub home: u32,
  pub away: u32,
}

impl MatchScore {
  /// `H`/`D`/`A` result code.
  pub fn result(self) -> &'static str {
    if self.home > self.away {
      "H"
    } else if self.home < self.away {
      "A"
    } else {
      "D"
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchOdds {
  pub home: f64,
  pub draw: f64,
  pub away: f64,
}

// ─── MatchRecord / MatchFact ─────────────────────────────────────────────────

/// An incoming fixture snapshot, parsed from a provider payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
  pub match_id:      String,
  pub league:        Option<String>,
  pub season:        Option<String>,
  pub round:         Option<String>,
  pub home_team_uid: String,
  pub away_team_uid: String,
  pub kickoff_at:    Option<DateTime<Utc>>,
  pub kickoff_tz:    Option<String>,
  pub venue:         Option<String>,
  pub referee_uid:   Option<String>,
  pub status:        MatchStatus,
  pub odds:          Option<MatchOdds>,
  pub score:         Option<MatchScore>,
  /// Last-writer-wins key: an older snapshot never overwrites a newer row.
  pub snapshot_ts:   DateTime<Utc>,
}

impl MatchRecord {
  /// Parse a fixture record from a normalized payload. Returns `None` when
  /// the structural minimum (match id + both team refs) is missing.
  pub fn from_payload(payload: &Value, snapshot_ts: DateTime<Utc>) -> Option<Self> {
    let match_id = field_str(payload, "match_id")?.to_owned();
    let home_team_uid = field_str(payload, "home_team_uid")?.to_owned();
    let away_team_uid = field_str(payload, "away_team_uid")?.to_owned();
    let status = field_str(payload, "status")
      .and_then(MatchStatus::parse)
      .unwrap_or(MatchStatus::Scheduled);

    let score = match (field_f64(payload, "home_score"), field_f64(payload, "away_score")) {
      (Some(h), Some(a)) if h >= 0.0 && a >= 0.0 => {
        Some(MatchScore { home: h as u32, away: a as u32 })
      }
      _ => None,
    };

    let odds = match (
      field_f64(payload, "odds_home"),
      field_f64(payload, "odds_draw"),
      field_f64(payload, "odds_away"),
    ) {
      (Some(home), Some(draw), Some(away)) => Some(MatchOdds { home, draw, away }),
      _ => None,
    };

    Some(Self {
      match_id,
      league: field_str(payload, "league").map(str::to_owned),
      season: field_str(payload, "season").map(str::to_owned),
      round: field_str(payload, "round").map(str::to_owned),
      home_team_uid,
      away_team_uid,
      kickoff_at: field_str(payload, "kickoff_at")
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)),
      kickoff_tz: field_str(payload, "kickoff_tz").map(str::to_owned),
      venue: field_str(payload, "venue").map(str::to_owned),
      referee_uid: field_str(payload, "referee_uid").map(str::to_owned),
      status,
      odds,
      score,
      snapshot_ts,
    })
  }
}

/// The canonical fixture row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFact {
  pub match_id:      String,
  pub league:        Option<String>,
  pub season:        Option<String>,
  pub round:         Option<String>,
  pub home_team_uid: String,
  pub away_team_uid: String,
  pub kickoff_at:    Option<DateTime<Utc>>,
  pub kickoff_tz:    Option<String>,
  pub venue:         Option<String>,
  pub referee_uid:   Option<String>,
  pub status:        MatchStatus,
  pub odds:          Option<MatchOdds>,
  pub score:         Option<MatchScore>,
  /// `H`/`D`/`A`; populated only at/after Finished.
  pub result:        Option<String>,
  pub snapshot_ts:   DateTime<Utc>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}
