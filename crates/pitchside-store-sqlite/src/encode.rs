//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, dates as ISO `YYYY-MM-DD`.
//! Rule parameters and schema field lists are stored as compact JSON.

use chrono::{DateTime, NaiveDate, Utc};
use pitchside_core::{
  audit::{AuditAction, AuditRecord},
  entity::{Alias, CanonicalPlayer, LifecycleStatus, MergeEvent, Position},
  importance::{Importance, ImportanceTier, priority_from_score},
  matches::{MatchFact, MatchOdds, MatchScore, MatchStatus},
  record::EntityKind,
  rule::{FieldDef, QualityRule, RuleParams, SchemaDefinition, SchemaStatus, Severity},
  verdict::VerdictStatus,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

fn unknown(column: &'static str, value: &str) -> Error {
  Error::UnknownDiscriminant { column, value: value.to_owned() }
}

pub fn decode_lifecycle(s: &str) -> Result<LifecycleStatus> {
  match s {
    "active" => Ok(LifecycleStatus::Active),
    "retired" => Ok(LifecycleStatus::Retired),
    "merged" => Ok(LifecycleStatus::Merged),
    other => Err(unknown("lifecycle", other)),
  }
}

pub fn encode_lifecycle(l: LifecycleStatus) -> &'static str {
  match l {
    LifecycleStatus::Active => "active",
    LifecycleStatus::Retired => "retired",
    LifecycleStatus::Merged => "merged",
  }
}

pub fn decode_entity_kind(s: &str) -> Result<EntityKind> {
  EntityKind::parse(s).ok_or_else(|| unknown("entity_type", s))
}

pub fn decode_status(s: &str) -> Result<VerdictStatus> {
  VerdictStatus::parse(s).ok_or_else(|| unknown("status", s))
}

pub fn decode_action(s: &str) -> Result<AuditAction> {
  AuditAction::parse(s).ok_or_else(|| unknown("action", s))
}

pub fn decode_severity(s: &str) -> Result<Severity> {
  Severity::parse(s).ok_or_else(|| unknown("severity", s))
}

pub fn decode_match_status(s: &str) -> Result<MatchStatus> {
  MatchStatus::parse(s).ok_or_else(|| unknown("status", s))
}

pub fn decode_schema_status(s: &str) -> Result<SchemaStatus> {
  match s {
    "active" => Ok(SchemaStatus::Active),
    "deprecated" => Ok(SchemaStatus::Deprecated),
    other => Err(unknown("status", other)),
  }
}

pub fn encode_schema_status(s: SchemaStatus) -> &'static str {
  match s {
    SchemaStatus::Active => "active",
    SchemaStatus::Deprecated => "deprecated",
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `dim_player` row.
pub struct RawPlayer {
  pub uid:              String,
  pub full_name:        String,
  pub norm_name:        String,
  pub birth_date:       Option<String>,
  pub country:          Option<String>,
  pub team_uid:         Option<String>,
  pub position:         Option<String>,
  pub jersey_no:        Option<i64>,
  pub importance_score: f64,
  pub confidence:       f64,
  pub lifecycle:        String,
  pub merged_into:      Option<String>,
  pub created_at:       String,
  pub updated_at:       String,
}

impl RawPlayer {
  pub const COLUMNS: &'static str = "uid, full_name, norm_name, birth_date, country, \
     team_uid, position, jersey_no, importance_score, confidence, lifecycle, \
     merged_into, created_at, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      uid:              row.get(0)?,
      full_name:        row.get(1)?,
      norm_name:        row.get(2)?,
      birth_date:       row.get(3)?,
      country:          row.get(4)?,
      team_uid:         row.get(5)?,
      position:         row.get(6)?,
      jersey_no:        row.get(7)?,
      importance_score: row.get(8)?,
      confidence:       row.get(9)?,
      lifecycle:        row.get(10)?,
      merged_into:      row.get(11)?,
      created_at:       row.get(12)?,
      updated_at:       row.get(13)?,
    })
  }

  pub fn into_player(self) -> Result<CanonicalPlayer> {
    let score = self.importance_score;
    Ok(CanonicalPlayer {
      uid:         self.uid,
      full_name:   self.full_name,
      norm_name:   self.norm_name,
      birth_date:  self.birth_date.as_deref().map(decode_date).transpose()?,
      country:     self.country,
      team_uid:    self.team_uid,
      position:    self.position.as_deref().and_then(Position::parse),
      jersey_no:   self.jersey_no.map(|n| n as u8),
      importance:  Importance {
        score,
        tier: ImportanceTier::from_score(score),
        priority: priority_from_score(score),
      },
      confidence:  self.confidence,
      lifecycle:   decode_lifecycle(&self.lifecycle)?,
      merged_into: self.merged_into,
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from an `f_match` row.
pub struct RawMatch {
  pub match_id:      String,
  pub league:        Option<String>,
  pub season:        Option<String>,
  pub round:         Option<String>,
  pub home_team_uid: String,
  pub away_team_uid: String,
  pub kickoff_at:    Option<String>,
  pub kickoff_tz:    Option<String>,
  pub venue:         Option<String>,
  pub referee_uid:   Option<String>,
  pub status:        String,
  pub odds_home:     Option<f64>,
  pub odds_draw:     Option<f64>,
  pub odds_away:     Option<f64>,
  pub home_score:    Option<i64>,
  pub away_score:    Option<i64>,
  pub result:        Option<String>,
  pub snapshot_ts:   String,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawMatch {
  pub const COLUMNS: &'static str = "match_id, league, season, round, home_team_uid, \
     away_team_uid, kickoff_at, kickoff_tz, venue, referee_uid, status, \
     odds_home, odds_draw, odds_away, home_score, away_score, result, \
     snapshot_ts, created_at, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      match_id:      row.get(0)?,
      league:        row.get(1)?,
      season:        row.get(2)?,
      round:         row.get(3)?,
      home_team_uid: row.get(4)?,
      away_team_uid: row.get(5)?,
      kickoff_at:    row.get(6)?,
      kickoff_tz:    row.get(7)?,
      venue:         row.get(8)?,
      referee_uid:   row.get(9)?,
      status:        row.get(10)?,
      odds_home:     row.get(11)?,
      odds_draw:     row.get(12)?,
      odds_away:     row.get(13)?,
      home_score:    row.get(14)?,
      away_score:    row.get(15)?,
      result:        row.get(16)?,
      snapshot_ts:   row.get(17)?,
      created_at:    row.get(18)?,
      updated_at:    row.get(19)?,
    })
  }

  pub fn into_fact(self) -> Result<MatchFact> {
    let odds = match (self.odds_home, self.odds_draw, self.odds_away) {
      (Some(home), Some(draw), Some(away)) => Some(MatchOdds { home, draw, away }),
      _ => None,
    };
    let score = match (self.home_score, self.away_score) {
      (Some(h), Some(a)) => Some(MatchScore { home: h as u32, away: a as u32 }),
      _ => None,
    };
    Ok(MatchFact {
      match_id:      self.match_id,
      league:        self.league,
      season:        self.season,
      round:         self.round,
      home_team_uid: self.home_team_uid,
      away_team_uid: self.away_team_uid,
      kickoff_at:    self.kickoff_at.as_deref().map(decode_dt).transpose()?,
      kickoff_tz:    self.kickoff_tz,
      venue:         self.venue,
      referee_uid:   self.referee_uid,
      status:        decode_match_status(&self.status)?,
      odds,
      score,
      result:        self.result,
      snapshot_ts:   decode_dt(&self.snapshot_ts)?,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `dpc_ingest_audit` row.
pub struct RawAudit {
  pub id:          i64,
  pub run_id:      String,
  pub source_id:   String,
  pub entity_type: String,
  pub entity_id:   String,
  pub action:      String,
  pub confidence:  Option<f64>,
  pub signature:   Option<String>,
  pub status:      String,
  pub message:     Option<String>,
  pub created_at:  String,
}

impl RawAudit {
  pub const COLUMNS: &'static str = "id, run_id, source_id, entity_type, entity_id, \
     action, confidence, signature, status, message, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      run_id:      row.get(1)?,
      source_id:   row.get(2)?,
      entity_type: row.get(3)?,
      entity_id:   row.get(4)?,
      action:      row.get(5)?,
      confidence:  row.get(6)?,
      signature:   row.get(7)?,
      status:      row.get(8)?,
      message:     row.get(9)?,
      created_at:  row.get(10)?,
    })
  }

  pub fn into_record(self) -> Result<AuditRecord> {
    Ok(AuditRecord {
      id:          self.id,
      run_id:      self.run_id,
      source_id:   self.source_id,
      entity_type: decode_entity_kind(&self.entity_type)?,
      entity_id:   self.entity_id,
      action:      decode_action(&self.action)?,
      confidence:  self.confidence,
      signature:   self.signature,
      status:      decode_status(&self.status)?,
      message:     self.message,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `player_alias` row.
pub struct RawAlias {
  pub entity_uid:   String,
  pub display_name: String,
  pub norm_name:    String,
  pub lang:         Option<String>,
  pub source:       Option<String>,
  pub confidence:   f64,
}

impl RawAlias {
  pub fn into_alias(self) -> Alias {
    Alias {
      entity_uid:   self.entity_uid,
      display_name: self.display_name,
      norm_name:    self.norm_name,
      lang:         self.lang,
      source:       self.source,
      confidence:   self.confidence,
    }
  }
}

/// Raw strings read directly from a `player_merge_event` row.
pub struct RawMergeEvent {
  pub event_id:   String,
  pub from_uid:   String,
  pub to_uid:     String,
  pub reason:     String,
  pub decided_by: String,
  pub decided_at: String,
}

impl RawMergeEvent {
  pub fn into_event(self) -> Result<MergeEvent> {
    Ok(MergeEvent {
      event_id:   Uuid::parse_str(&self.event_id)?,
      from_uid:   self.from_uid,
      to_uid:     self.to_uid,
      reason:     self.reason,
      decided_by: self.decided_by,
      decided_at: decode_dt(&self.decided_at)?,
    })
  }
}

/// Raw strings read directly from a `dpc_quality_rule` row.
pub struct RawRule {
  pub rule_name:   String,
  pub entity:      String,
  pub params_json: String,
  pub severity:    String,
}

impl RawRule {
  pub fn into_rule(self) -> Result<QualityRule> {
    let params: RuleParams = serde_json::from_str(&self.params_json)?;
    Ok(QualityRule {
      rule_name: self.rule_name,
      entity:    decode_entity_kind(&self.entity)?,
      params,
      severity:  decode_severity(&self.severity)?,
    })
  }
}

/// Raw strings read directly from a `dpc_schema_registry` row.
pub struct RawSchema {
  pub schema_name:    String,
  pub schema_version: String,
  pub fields_json:    String,
  pub status:         String,
}

impl RawSchema {
  pub fn into_schema(self) -> Result<SchemaDefinition> {
    let fields: Vec<FieldDef> = serde_json::from_str(&self.fields_json)?;
    Ok(SchemaDefinition {
      schema_name:    self.schema_name,
      schema_version: self.schema_version,
      fields,
      status:         decode_schema_status(&self.status)?,
    })
  }
}
