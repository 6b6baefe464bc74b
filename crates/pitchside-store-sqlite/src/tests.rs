//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use pitchside_core::{
  audit::{AuditAction, NewAuditRecord},
  entity::{Alias, CanonicalPlayer, LifecycleStatus, MergeEvent},
  matches::{MatchRecord, MatchScore, MatchStatus},
  record::EntityKind,
  rule::{FieldDef, FieldKind, QualityRule, RuleParams, SchemaDefinition, SchemaStatus, Severity},
  store::IngestStore,
  verdict::VerdictStatus,
};
use serde_json::json;
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn player(uid: &str, name: &str) -> CanonicalPlayer {
  CanonicalPlayer::from_payload(
    uid.to_owned(),
    &json!({ "name": name, "birth_date": "1995-01-01", "position": "F" }),
    0.6,
    Utc::now(),
  )
}

fn fixture(match_id: &str, status: MatchStatus) -> MatchRecord {
  MatchRecord {
    match_id:      match_id.to_owned(),
    league:        Some("premier_league".into()),
    season:        Some("2025-26".into()),
    round:         None,
    home_team_uid: "team_h".into(),
    away_team_uid: "team_a".into(),
    kickoff_at:    None,
    kickoff_tz:    None,
    venue:         None,
    referee_uid:   None,
    status,
    odds:          None,
    score:         None,
    snapshot_ts:   Utc::now(),
  }
}

// ─── Identity ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_find_by_xref() {
  let s = store().await;

  let p = player("plr_sofa_p1", "J. Smith");
  let created = s.create_player_with_xref(&p, "sofa", "p1").await.unwrap();
  assert_eq!(created.uid, "plr_sofa_p1");

  let found = s.find_player_by_xref("sofa", "p1").await.unwrap().unwrap();
  assert_eq!(found.uid, "plr_sofa_p1");
  assert_eq!(found.full_name, "J. Smith");
  assert_eq!(found.lifecycle, LifecycleStatus::Active);

  assert!(s.find_player_by_xref("sofa", "nope").await.unwrap().is_none());
  assert!(s.find_player_by_xref("apifootball", "p1").await.unwrap().is_none());
}

#[tokio::test]
async fn create_race_returns_first_winner() {
  let s = store().await;

  let first = player("plr_sofa_p1", "J. Smith");
  s.create_player_with_xref(&first, "sofa", "p1").await.unwrap();

  // A second create for the same provider pair must discard its insert and
  // come back holding the winner's row.
  let loser = player("plr_global_deadbeef00", "J Smith");
  let resolved = s.create_player_with_xref(&loser, "sofa", "p1").await.unwrap();
  assert_eq!(resolved.uid, "plr_sofa_p1");

  assert!(s.get_player("plr_global_deadbeef00").await.unwrap().is_none());
  assert_eq!(s.count_xrefs("plr_sofa_p1").await.unwrap(), 1);
}

#[tokio::test]
async fn register_xref_existing_mapping_wins() {
  let s = store().await;

  let p = player("plr_sofa_p1", "J. Smith");
  s.create_player_with_xref(&p, "sofa", "p1").await.unwrap();

  let q = player("plr_api_q9", "John Smith");
  s.create_player_with_xref(&q, "apifootball", "q9").await.unwrap();

  // New pair onto an existing entity.
  let mapped = s.register_xref("plr_sofa_p1", "statsprovider", "s77").await.unwrap();
  assert_eq!(mapped, "plr_sofa_p1");
  assert_eq!(s.count_xrefs("plr_sofa_p1").await.unwrap(), 2);

  // Conflicting pair: the existing mapping is kept and returned.
  let mapped = s.register_xref("plr_sofa_p1", "apifootball", "q9").await.unwrap();
  assert_eq!(mapped, "plr_api_q9");
}

#[tokio::test]
async fn touch_xref_bumps_last_seen() {
  let s = store().await;
  let p = player("plr_sofa_p1", "J. Smith");
  s.create_player_with_xref(&p, "sofa", "p1").await.unwrap();

  let later = Utc::now() + Duration::hours(1);
  s.touch_xref("sofa", "p1", later).await.unwrap();
  // No read API for xref timestamps; enough that the update path runs.
}

#[tokio::test]
async fn update_player_is_optimistic() {
  let s = store().await;

  let p = player("plr_sofa_p1", "J. Smith");
  s.create_player_with_xref(&p, "sofa", "p1").await.unwrap();
  let mut stored = s.get_player("plr_sofa_p1").await.unwrap().unwrap();

  let expected = stored.updated_at;
  stored.jersey_no = Some(10);
  assert!(s.update_player(&stored, expected).await.unwrap());

  // The first write moved updated_at, so the stale timestamp loses.
  stored.jersey_no = Some(7);
  assert!(!s.update_player(&stored, expected).await.unwrap());

  let fresh = s.get_player("plr_sofa_p1").await.unwrap().unwrap();
  assert_eq!(fresh.jersey_no, Some(10));
}

#[tokio::test]
async fn candidate_players_searches_names_and_aliases() {
  let s = store().await;

  let p = player("plr_sofa_p1", "John Smith");
  s.create_player_with_xref(&p, "sofa", "p1").await.unwrap();
  s.add_alias(&Alias::new("plr_sofa_p1", "Johnny Smith", Some("sofa"), 0.6))
    .await
    .unwrap();

  let by_name = s.candidate_players("john_smith").await.unwrap();
  assert_eq!(by_name.len(), 1);

  let by_alias = s.candidate_players("johnny").await.unwrap();
  assert_eq!(by_alias.len(), 1);
  assert_eq!(by_alias[0].uid, "plr_sofa_p1");

  assert!(s.candidate_players("garcia").await.unwrap().is_empty());

  let aliases = s.aliases_for("plr_sofa_p1").await.unwrap();
  assert_eq!(aliases.len(), 1);
  assert_eq!(aliases[0].norm_name, "johnny_smith");
}

// ─── Merge ───────────────────────────────────────────────────────────────────

fn merge_event(from: &str, to: &str) -> MergeEvent {
  MergeEvent {
    event_id:   Uuid::new_v4(),
    from_uid:   from.to_owned(),
    to_uid:     to.to_owned(),
    reason:     "same person across providers".into(),
    decided_by: "resolver".into(),
    decided_at: Utc::now(),
  }
}

#[tokio::test]
async fn apply_merge_repoints_everything() {
  let s = store().await;

  let a = player("plr_sofa_p1", "J. Smith");
  s.create_player_with_xref(&a, "sofa", "p1").await.unwrap();
  let b = player("plr_api_q9", "John Smith");
  s.create_player_with_xref(&b, "apifootball", "q9").await.unwrap();
  s.add_alias(&Alias::new("plr_api_q9", "John Smith", Some("apifootball"), 0.7))
    .await
    .unwrap();

  let outcome = s.apply_merge(&merge_event("plr_api_q9", "plr_sofa_p1"), 0.82).await.unwrap();
  assert!(outcome.is_ok());

  let merged = s.get_player("plr_api_q9").await.unwrap().unwrap();
  assert_eq!(merged.lifecycle, LifecycleStatus::Merged);
  assert_eq!(merged.merged_into.as_deref(), Some("plr_sofa_p1"));

  let target = s.get_player("plr_sofa_p1").await.unwrap().unwrap();
  assert_eq!(target.lifecycle, LifecycleStatus::Active);
  assert_eq!(target.confidence, 0.82);

  // The provider pair now resolves to the merge target.
  let via_xref = s.find_player_by_xref("apifootball", "q9").await.unwrap().unwrap();
  assert_eq!(via_xref.uid, "plr_sofa_p1");
  assert_eq!(s.count_xrefs("plr_sofa_p1").await.unwrap(), 2);

  let aliases = s.aliases_for("plr_sofa_p1").await.unwrap();
  assert_eq!(aliases.len(), 1);

  let events = s.merge_events_for("plr_api_q9").await.unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].to_uid, "plr_sofa_p1");
}

#[tokio::test]
async fn merge_into_merged_target_is_rejected() {
  let s = store().await;

  for (uid, provider, id) in
    [("plr_a", "sofa", "1"), ("plr_b", "sofa", "2"), ("plr_c", "sofa", "3")]
  {
    let p = player(uid, "J. Smith");
    s.create_player_with_xref(&p, provider, id).await.unwrap();
  }

  s.apply_merge(&merge_event("plr_a", "plr_b"), 0.8).await.unwrap().unwrap();

  // plr_a is merged now; it can be neither source nor target again.
  let as_target = s.apply_merge(&merge_event("plr_c", "plr_a"), 0.8).await.unwrap();
  assert!(matches!(as_target, Err(pitchside_core::Error::InvalidMerge(_))));

  let as_source = s.apply_merge(&merge_event("plr_a", "plr_c"), 0.8).await.unwrap();
  assert!(matches!(as_source, Err(pitchside_core::Error::InvalidMerge(_))));

  // The rejected merges left no partial state.
  let c = s.get_player("plr_c").await.unwrap().unwrap();
  assert_eq!(c.lifecycle, LifecycleStatus::Active);
  assert!(s.merge_events_for("plr_c").await.unwrap().is_empty());
}

#[tokio::test]
async fn merge_unknown_uid_is_rejected() {
  let s = store().await;
  let p = player("plr_a", "J. Smith");
  s.create_player_with_xref(&p, "sofa", "1").await.unwrap();

  let outcome = s.apply_merge(&merge_event("plr_ghost", "plr_a"), 0.8).await.unwrap();
  assert!(matches!(outcome, Err(pitchside_core::Error::InvalidMerge(_))));
}

// ─── Match facts ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_match_inserts_then_updates() {
  let s = store().await;

  let rec = fixture("m1", MatchStatus::Scheduled);
  let fact = s.upsert_match(&rec).await.unwrap().unwrap();
  assert_eq!(fact.status, MatchStatus::Scheduled);
  assert!(fact.score.is_none());

  let mut live = fixture("m1", MatchStatus::Live);
  live.snapshot_ts = rec.snapshot_ts + Duration::minutes(5);
  let fact = s.upsert_match(&live).await.unwrap().unwrap();
  assert_eq!(fact.status, MatchStatus::Live);

  let mut finished = fixture("m1", MatchStatus::Finished);
  finished.snapshot_ts = rec.snapshot_ts + Duration::minutes(120);
  finished.score = Some(MatchScore { home: 2, away: 1 });
  let fact = s.upsert_match(&finished).await.unwrap().unwrap();
  assert_eq!(fact.status, MatchStatus::Finished);
  assert_eq!(fact.score, Some(MatchScore { home: 2, away: 1 }));
  assert_eq!(fact.result.as_deref(), Some("H"));
}

#[tokio::test]
async fn upsert_match_rejects_illegal_transition() {
  let s = store().await;

  let mut finished = fixture("m1", MatchStatus::Finished);
  finished.score = Some(MatchScore { home: 0, away: 0 });
  s.upsert_match(&finished).await.unwrap().unwrap();

  let mut back = fixture("m1", MatchStatus::Scheduled);
  back.snapshot_ts = finished.snapshot_ts + Duration::minutes(1);
  let outcome = s.upsert_match(&back).await.unwrap();
  assert!(matches!(
    outcome,
    Err(pitchside_core::Error::InvalidStateTransition {
      from: MatchStatus::Finished,
      to:   MatchStatus::Scheduled,
    })
  ));

  // Row untouched.
  let fact = s.get_match("m1").await.unwrap().unwrap();
  assert_eq!(fact.status, MatchStatus::Finished);
  assert_eq!(fact.result.as_deref(), Some("D"));
}

#[tokio::test]
async fn upsert_match_ignores_stale_snapshot() {
  let s = store().await;

  let live = fixture("m1", MatchStatus::Live);
  s.upsert_match(&live).await.unwrap().unwrap();

  let mut stale = fixture("m1", MatchStatus::Finished);
  stale.score = Some(MatchScore { home: 3, away: 0 });
  stale.snapshot_ts = live.snapshot_ts - Duration::minutes(10);
  let fact = s.upsert_match(&stale).await.unwrap().unwrap();

  // Last writer wins; the older snapshot changed nothing.
  assert_eq!(fact.status, MatchStatus::Live);
  assert!(fact.score.is_none());
}

#[tokio::test]
async fn score_persists_only_when_finished() {
  let s = store().await;

  let mut live = fixture("m1", MatchStatus::Live);
  live.score = Some(MatchScore { home: 1, away: 0 });
  let fact = s.upsert_match(&live).await.unwrap().unwrap();
  assert!(fact.score.is_none());
  assert!(fact.result.is_none());
}

// ─── Audit ───────────────────────────────────────────────────────────────────

fn audit(run_id: &str, signature: Option<&str>) -> NewAuditRecord {
  NewAuditRecord {
    run_id:      run_id.to_owned(),
    source_id:   "sofa".into(),
    entity_type: EntityKind::Player,
    entity_id:   "plr_sofa_p1".into(),
    action:      AuditAction::Ingest,
    confidence:  Some(0.6),
    signature:   signature.map(str::to_owned),
    status:      VerdictStatus::Accepted,
    message:     None,
  }
}

#[tokio::test]
async fn audit_append_and_read_back() {
  let s = store().await;

  let appended = s.append_audit(audit("run1", Some("sig_a"))).await.unwrap();
  assert!(!appended.deduplicated);
  assert_eq!(appended.record.action, AuditAction::Ingest);

  s.append_audit(audit("run1", Some("sig_b"))).await.unwrap();

  let rows = s.audit_for_run("run1").await.unwrap();
  assert_eq!(rows.len(), 2);
  assert!(s.audit_for_run("run2").await.unwrap().is_empty());

  let sigs = s.run_signatures("run1").await.unwrap();
  assert!(sigs.contains("sig_a") && sigs.contains("sig_b"));
}

#[tokio::test]
async fn audit_repeat_signature_collapses_to_duplicate() {
  let s = store().await;

  s.append_audit(audit("run1", Some("sig_a"))).await.unwrap();
  let repeat = s.append_audit(audit("run1", Some("sig_a"))).await.unwrap();
  assert!(repeat.deduplicated);
  assert_eq!(repeat.record.action, AuditAction::Duplicate);

  let rows = s.audit_for_run("run1").await.unwrap();
  assert_eq!(rows.len(), 1);

  // Same signature in another run is a fresh row.
  let other = s.append_audit(audit("run2", Some("sig_a"))).await.unwrap();
  assert!(!other.deduplicated);
}

#[tokio::test]
async fn audit_without_signature_always_appends() {
  let s = store().await;

  s.append_audit(audit("run1", None)).await.unwrap();
  let second = s.append_audit(audit("run1", None)).await.unwrap();
  assert!(!second.deduplicated);
  assert_eq!(s.audit_for_run("run1").await.unwrap().len(), 2);
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_rule_upserts_by_name_and_entity() {
  let s = store().await;

  let mut rule = QualityRule {
    rule_name: "age_bounds".into(),
    entity:    EntityKind::Player,
    params:    RuleParams::Bounds { field: "age".into(), min: 15.0, max: 50.0 },
    severity:  Severity::Warn,
  };
  s.put_rule(&rule).await.unwrap();

  rule.severity = Severity::Block;
  s.put_rule(&rule).await.unwrap();

  let rules = s.rules_for(EntityKind::Player).await.unwrap();
  assert_eq!(rules.len(), 1);
  assert_eq!(rules[0].severity, Severity::Block);
  assert!(matches!(rules[0].params, RuleParams::Bounds { .. }));

  assert!(s.rules_for(EntityKind::Referee).await.unwrap().is_empty());
}

#[tokio::test]
async fn put_schema_deprecates_prior_active() {
  let s = store().await;

  let v1 = SchemaDefinition {
    schema_name:    "player".into(),
    schema_version: "1".into(),
    fields:         vec![FieldDef {
      name:     "name".into(),
      kind:     FieldKind::Text,
      required: true,
    }],
    status:         SchemaStatus::Active,
  };
  s.put_schema(&v1).await.unwrap();

  let mut v2 = v1.clone();
  v2.schema_version = "2".into();
  v2.fields.push(FieldDef {
    name:     "birth_date".into(),
    kind:     FieldKind::Date,
    required: false,
  });
  s.put_schema(&v2).await.unwrap();

  let active = s.active_schema("player").await.unwrap().unwrap();
  assert_eq!(active.schema_version, "2");
  assert_eq!(active.fields.len(), 2);

  assert!(s.active_schema("referee").await.unwrap().is_none());
}

#[tokio::test]
async fn admin_log_appends() {
  let s = store().await;
  s.append_admin_log("ops", "rule_upsert", Some("age_bounds/player"))
    .await
    .unwrap();
  s.append_admin_log("resolver", "merge", None).await.unwrap();
}
