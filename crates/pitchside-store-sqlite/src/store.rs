//! [`SqliteStore`] — the SQLite implementation of [`IngestStore`].

use std::{collections::HashSet, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;

use pitchside_core::{
  audit::{AuditAction, AuditAppend, NewAuditRecord},
  entity::{Alias, CanonicalPlayer, LifecycleStatus, MergeEvent},
  matches::{MatchFact, MatchRecord, MatchStatus},
  record::EntityKind,
  rule::{QualityRule, SchemaDefinition, SchemaStatus},
  store::IngestStore,
};

use crate::{
  Error, Result,
  encode::{
    RawAlias, RawAudit, RawMatch, RawMergeEvent, RawPlayer, RawRule, RawSchema,
    decode_match_status, encode_date, encode_dt, encode_lifecycle, encode_schema_status,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Pitchside ingest store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All writes
/// funnel through the one connection's thread, which serializes mutation of
/// any given row without extra locking.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_player(&self, uid: String) -> Result<Option<CanonicalPlayer>> {
    let raw: Option<RawPlayer> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM dim_player WHERE uid = ?1", RawPlayer::COLUMNS),
              rusqlite::params![uid],
              RawPlayer::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawPlayer::into_player).transpose()
  }
}

fn player_insert_params(p: &CanonicalPlayer) -> [String; 3] {
  [
    encode_lifecycle(p.lifecycle).to_owned(),
    encode_dt(p.created_at),
    encode_dt(p.updated_at),
  ]
}

/// Outcome of the create-with-xref transaction.
enum CreateOutcome {
  Created,
  Existing(RawPlayer),
}

/// Outcome of the match upsert transaction.
enum UpsertOutcome {
  Stored(RawMatch),
  Rejected(pitchside_core::Error),
  CorruptStatus(String),
}

// ─── IngestStore impl ────────────────────────────────────────────────────────

impl IngestStore for SqliteStore {
  type Error = Error;

  // ── Identity ──────────────────────────────────────────────────────────────

  async fn find_player_by_xref(
    &self,
    provider: &str,
    provider_local_id: &str,
  ) -> Result<Option<CanonicalPlayer>> {
    let provider = provider.to_owned();
    let local_id = provider_local_id.to_owned();

    let raw: Option<RawPlayer> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM dim_player p
           JOIN player_xref x ON x.entity_uid = p.uid
           WHERE x.provider = ?1 AND x.provider_player_id = ?2",
          RawPlayer::COLUMNS
            .split(", ")
            .map(|c| format!("p.{c}"))
            .collect::<Vec<_>>()
            .join(", ")
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![provider, local_id], RawPlayer::from_row)
            .optional()?,
        )
      })
      .await?;

    let player = match raw.map(RawPlayer::into_player).transpose()? {
      Some(p) => p,
      None => return Ok(None),
    };

    // Xrefs are repointed at merge time, so a merged hit means the mapping
    // raced a merge; follow the single-hop redirect.
    if player.lifecycle == LifecycleStatus::Merged {
      if let Some(target) = player.merged_into.clone() {
        return self.query_player(target).await;
      }
    }
    Ok(Some(player))
  }

  async fn touch_xref(
    &self,
    provider: &str,
    provider_local_id: &str,
    at: DateTime<Utc>,
  ) -> Result<()> {
    let provider = provider.to_owned();
    let local_id = provider_local_id.to_owned();
    let at_str = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE player_xref SET last_seen_at = ?1
           WHERE provider = ?2 AND provider_player_id = ?3",
          rusqlite::params![at_str, provider, local_id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_player(&self, uid: &str) -> Result<Option<CanonicalPlayer>> {
    self.query_player(uid.to_owned()).await
  }

  async fn candidate_players(&self, norm_fragment: &str) -> Result<Vec<CanonicalPlayer>> {
    let pattern = format!("%{norm_fragment}%");

    let raws: Vec<RawPlayer> = self
      .conn
      .call(move |conn| {
        let cols = RawPlayer::COLUMNS
          .split(", ")
          .map(|c| format!("p.{c}"))
          .collect::<Vec<_>>()
          .join(", ");
        let sql = format!(
          "SELECT DISTINCT {cols} FROM dim_player p
           LEFT JOIN player_alias a ON a.entity_uid = p.uid
           WHERE p.lifecycle != 'merged'
             AND (p.norm_name LIKE ?1 OR a.norm_name LIKE ?1)"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![pattern], RawPlayer::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPlayer::into_player).collect()
  }

  async fn create_player_with_xref(
    &self,
    player: &CanonicalPlayer,
    provider: &str,
    provider_local_id: &str,
  ) -> Result<CanonicalPlayer> {
    let p = player.clone();
    let provider = provider.to_owned();
    let local_id = provider_local_id.to_owned();
    let [lifecycle_str, created_str, updated_str] = player_insert_params(&p);
    let birth_str = p.birth_date.map(encode_date);
    let now_str = encode_dt(Utc::now());

    let outcome: CreateOutcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Loser path: another worker mapped this pair first. Discard the
        // insert and hand back the winner's row.
        let existing: Option<String> = tx
          .query_row(
            "SELECT entity_uid FROM player_xref
             WHERE provider = ?1 AND provider_player_id = ?2",
            rusqlite::params![provider, local_id],
            |r| r.get(0),
          )
          .optional()?;

        if let Some(uid) = existing {
          let raw = tx.query_row(
            &format!("SELECT {} FROM dim_player WHERE uid = ?1", RawPlayer::COLUMNS),
            rusqlite::params![uid],
            RawPlayer::from_row,
          )?;
          tx.commit()?;
          return Ok(CreateOutcome::Existing(raw));
        }

        tx.execute(
          "INSERT INTO dim_player (
             uid, full_name, norm_name, birth_date, country, team_uid,
             position, jersey_no, importance_score, importance_tier,
             confidence, lifecycle, merged_into, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
          rusqlite::params![
            p.uid,
            p.full_name,
            p.norm_name,
            birth_str,
            p.country,
            p.team_uid,
            p.position.map(|pos| pos.as_str()),
            p.jersey_no,
            p.importance.score,
            p.importance.tier.as_str(),
            p.confidence,
            lifecycle_str,
            p.merged_into,
            created_str,
            updated_str,
          ],
        )?;

        tx.execute(
          "INSERT INTO player_xref (entity_uid, provider, provider_player_id,
             first_seen_at, last_seen_at)
           VALUES (?1, ?2, ?3, ?4, ?4)",
          rusqlite::params![p.uid, provider, local_id, now_str],
        )?;

        tx.commit()?;
        Ok(CreateOutcome::Created)
      })
      .await?;

    match outcome {
      CreateOutcome::Created => Ok(player.clone()),
      CreateOutcome::Existing(raw) => raw.into_player(),
    }
  }

  async fn register_xref(
    &self,
    entity_uid: &str,
    provider: &str,
    provider_local_id: &str,
  ) -> Result<String> {
    let uid = entity_uid.to_owned();
    let provider = provider.to_owned();
    let local_id = provider_local_id.to_owned();
    let now_str = encode_dt(Utc::now());

    let mapped: String = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT OR IGNORE INTO player_xref
             (entity_uid, provider, provider_player_id, first_seen_at, last_seen_at)
           VALUES (?1, ?2, ?3, ?4, ?4)",
          rusqlite::params![uid, provider, local_id, now_str],
        )?;
        let mapped: String = tx.query_row(
          "SELECT entity_uid FROM player_xref
           WHERE provider = ?1 AND provider_player_id = ?2",
          rusqlite::params![provider, local_id],
          |r| r.get(0),
        )?;
        tx.commit()?;
        Ok(mapped)
      })
      .await?;
    Ok(mapped)
  }

  async fn update_player(
    &self,
    player: &CanonicalPlayer,
    expected_updated_at: DateTime<Utc>,
  ) -> Result<bool> {
    let p = player.clone();
    let birth_str = p.birth_date.map(encode_date);
    let expected_str = encode_dt(expected_updated_at);
    let updated_str = encode_dt(Utc::now());

    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE dim_player SET
             full_name = ?1, norm_name = ?2, birth_date = ?3, country = ?4,
             team_uid = ?5, position = ?6, jersey_no = ?7,
             importance_score = ?8, importance_tier = ?9, confidence = ?10,
             lifecycle = ?11, updated_at = ?12
           WHERE uid = ?13 AND updated_at = ?14",
          rusqlite::params![
            p.full_name,
            p.norm_name,
            birth_str,
            p.country,
            p.team_uid,
            p.position.map(|pos| pos.as_str()),
            p.jersey_no,
            p.importance.score,
            p.importance.tier.as_str(),
            p.confidence,
            encode_lifecycle(p.lifecycle),
            updated_str,
            p.uid,
            expected_str,
          ],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn add_alias(&self, alias: &Alias) -> Result<()> {
    let a = alias.clone();
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO player_alias
             (entity_uid, display_name, norm_name, lang, source, confidence, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            a.entity_uid,
            a.display_name,
            a.norm_name,
            a.lang,
            a.source,
            a.confidence,
            now_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn aliases_for(&self, uid: &str) -> Result<Vec<Alias>> {
    let uid = uid.to_owned();

    let raws: Vec<RawAlias> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT entity_uid, display_name, norm_name, lang, source, confidence
           FROM player_alias WHERE entity_uid = ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![uid], |row| {
            Ok(RawAlias {
              entity_uid:   row.get(0)?,
              display_name: row.get(1)?,
              norm_name:    row.get(2)?,
              lang:         row.get(3)?,
              source:       row.get(4)?,
              confidence:   row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(raws.into_iter().map(RawAlias::into_alias).collect())
  }

  async fn count_xrefs(&self, uid: &str) -> Result<u32> {
    let uid = uid.to_owned();
    let n: u32 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM player_xref WHERE entity_uid = ?1",
          rusqlite::params![uid],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(n)
  }

  // ── Merge ─────────────────────────────────────────────────────────────────

  async fn apply_merge(
    &self,
    event: &MergeEvent,
    merged_confidence: f64,
  ) -> Result<Result<(), pitchside_core::Error>> {
    let ev = event.clone();
    let event_id = ev.event_id.hyphenated().to_string();
    let decided_str = encode_dt(ev.decided_at);
    let now_str = encode_dt(Utc::now());

    let domain: Result<(), pitchside_core::Error> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let status_of = |tx: &rusqlite::Transaction<'_>, uid: &str| {
          tx.query_row(
            "SELECT lifecycle FROM dim_player WHERE uid = ?1",
            rusqlite::params![uid],
            |r| r.get::<_, String>(0),
          )
          .optional()
        };

        // Re-validate preconditions inside the transaction: the engine's
        // earlier reads may have raced another merge.
        let from_status = match status_of(&tx, &ev.from_uid)? {
          Some(s) => s,
          None => {
            return Ok(Err(pitchside_core::Error::InvalidMerge(format!(
              "unknown source uid {}",
              ev.from_uid
            ))));
          }
        };
        let to_status = match status_of(&tx, &ev.to_uid)? {
          Some(s) => s,
          None => {
            return Ok(Err(pitchside_core::Error::InvalidMerge(format!(
              "unknown target uid {}",
              ev.to_uid
            ))));
          }
        };
        if from_status == "merged" {
          return Ok(Err(pitchside_core::Error::InvalidMerge(format!(
            "{} is already merged",
            ev.from_uid
          ))));
        }
        if to_status == "merged" {
          return Ok(Err(pitchside_core::Error::InvalidMerge(format!(
            "cannot merge into merged entity {}; resolve to its final target first",
            ev.to_uid
          ))));
        }

        tx.execute(
          "UPDATE player_alias SET entity_uid = ?1 WHERE entity_uid = ?2",
          rusqlite::params![ev.to_uid, ev.from_uid],
        )?;
        tx.execute(
          "UPDATE player_xref SET entity_uid = ?1 WHERE entity_uid = ?2",
          rusqlite::params![ev.to_uid, ev.from_uid],
        )?;
        tx.execute(
          "UPDATE dim_player SET lifecycle = 'merged', merged_into = ?1, updated_at = ?2
           WHERE uid = ?3",
          rusqlite::params![ev.to_uid, now_str, ev.from_uid],
        )?;
        tx.execute(
          "UPDATE dim_player SET confidence = ?1, updated_at = ?2 WHERE uid = ?3",
          rusqlite::params![merged_confidence, now_str, ev.to_uid],
        )?;
        tx.execute(
          "INSERT INTO player_merge_event
             (event_id, from_uid, to_uid, reason, decided_by, decided_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![event_id, ev.from_uid, ev.to_uid, ev.reason, ev.decided_by, decided_str],
        )?;

        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;
    Ok(domain)
  }

  async fn merge_events_for(&self, uid: &str) -> Result<Vec<MergeEvent>> {
    let uid = uid.to_owned();

    let raws: Vec<RawMergeEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT event_id, from_uid, to_uid, reason, decided_by, decided_at
           FROM player_merge_event
           WHERE from_uid = ?1 OR to_uid = ?1
           ORDER BY decided_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![uid], |row| {
            Ok(RawMergeEvent {
              event_id:   row.get(0)?,
              from_uid:   row.get(1)?,
              to_uid:     row.get(2)?,
              reason:     row.get(3)?,
              decided_by: row.get(4)?,
              decided_at: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMergeEvent::into_event).collect()
  }

  // ── Match facts ───────────────────────────────────────────────────────────

  async fn get_match(&self, match_id: &str) -> Result<Option<MatchFact>> {
    let match_id = match_id.to_owned();

    let raw: Option<RawMatch> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM f_match WHERE match_id = ?1", RawMatch::COLUMNS),
              rusqlite::params![match_id],
              RawMatch::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawMatch::into_fact).transpose()
  }

  async fn upsert_match(
    &self,
    record: &MatchRecord,
  ) -> Result<Result<MatchFact, pitchside_core::Error>> {
    let rec = record.clone();
    let snapshot_str = encode_dt(rec.snapshot_ts);
    let kickoff_str = rec.kickoff_at.map(encode_dt);
    let now_str = encode_dt(Utc::now());

    // Score and result persist only for finished fixtures; the engine has
    // already stripped premature scores, this is the second line.
    let (home_score, away_score, result) = match (rec.status, rec.score) {
      (MatchStatus::Finished, Some(score)) => {
        (Some(score.home), Some(score.away), Some(score.result().to_owned()))
      }
      _ => (None, None, None),
    };

    let outcome: UpsertOutcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let select = format!("SELECT {} FROM f_match WHERE match_id = ?1", RawMatch::COLUMNS);
        let existing: Option<RawMatch> = tx
          .query_row(&select, rusqlite::params![rec.match_id], RawMatch::from_row)
          .optional()?;

        if let Some(current) = existing {
          // Stale snapshot: last writer wins, and this one lost.
          if current.snapshot_ts.as_str() >= snapshot_str.as_str() {
            tx.commit()?;
            return Ok(UpsertOutcome::Stored(current));
          }

          let from = match decode_match_status(&current.status) {
            Ok(s) => s,
            Err(_) => return Ok(UpsertOutcome::CorruptStatus(current.status)),
          };
          if !from.can_transition_to(rec.status) {
            return Ok(UpsertOutcome::Rejected(
              pitchside_core::Error::InvalidStateTransition { from, to: rec.status },
            ));
          }

          tx.execute(
            "UPDATE f_match SET
               league = COALESCE(?1, league), season = COALESCE(?2, season),
               round = COALESCE(?3, round),
               home_team_uid = ?4, away_team_uid = ?5,
               kickoff_at = COALESCE(?6, kickoff_at),
               kickoff_tz = COALESCE(?7, kickoff_tz),
               venue = COALESCE(?8, venue),
               referee_uid = COALESCE(?9, referee_uid),
               status = ?10,
               odds_home = COALESCE(?11, odds_home),
               odds_draw = COALESCE(?12, odds_draw),
               odds_away = COALESCE(?13, odds_away),
               home_score = COALESCE(?14, home_score),
               away_score = COALESCE(?15, away_score),
               result = COALESCE(?16, result),
               snapshot_ts = ?17, updated_at = ?18
             WHERE match_id = ?19",
            rusqlite::params![
              rec.league,
              rec.season,
              rec.round,
              rec.home_team_uid,
              rec.away_team_uid,
              kickoff_str,
              rec.kickoff_tz,
              rec.venue,
              rec.referee_uid,
              rec.status.as_str(),
              rec.odds.map(|o| o.home),
              rec.odds.map(|o| o.draw),
              rec.odds.map(|o| o.away),
              home_score,
              away_score,
              result,
              snapshot_str,
              now_str,
              rec.match_id,
            ],
          )?;
        } else {
          tx.execute(
            "INSERT INTO f_match (
               match_id, league, season, round, home_team_uid, away_team_uid,
               kickoff_at, kickoff_tz, venue, referee_uid, status,
               odds_home, odds_draw, odds_away, home_score, away_score, result,
               snapshot_ts, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                       ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?19)",
            rusqlite::params![
              rec.match_id,
              rec.league,
              rec.season,
              rec.round,
              rec.home_team_uid,
              rec.away_team_uid,
              kickoff_str,
              rec.kickoff_tz,
              rec.venue,
              rec.referee_uid,
              rec.status.as_str(),
              rec.odds.map(|o| o.home),
              rec.odds.map(|o| o.draw),
              rec.odds.map(|o| o.away),
              home_score,
              away_score,
              result,
              snapshot_str,
              now_str,
            ],
          )?;
        }

        let stored =
          tx.query_row(&select, rusqlite::params![rec.match_id], RawMatch::from_row)?;
        tx.commit()?;
        Ok(UpsertOutcome::Stored(stored))
      })
      .await?;

    match outcome {
      UpsertOutcome::Stored(raw) => Ok(Ok(raw.into_fact()?)),
      UpsertOutcome::Rejected(domain) => Ok(Err(domain)),
      UpsertOutcome::CorruptStatus(value) => {
        Err(Error::UnknownDiscriminant { column: "status", value })
      }
    }
  }

  // ── Audit ─────────────────────────────────────────────────────────────────

  async fn append_audit(&self, rec: NewAuditRecord) -> Result<AuditAppend> {
    let now_str = encode_dt(Utc::now());

    let (raw, deduplicated): (RawAudit, bool) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // The partial unique index on (run_id, signature) makes the append
        // idempotent; a collapsed repeat is re-flagged as a duplicate.
        let inserted = tx.execute(
          "INSERT OR IGNORE INTO dpc_ingest_audit
             (run_id, source_id, entity_type, entity_id, action, confidence,
              signature, status, message, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            rec.run_id,
            rec.source_id,
            rec.entity_type.as_str(),
            rec.entity_id,
            rec.action.as_str(),
            rec.confidence,
            rec.signature,
            rec.status.as_str(),
            rec.message,
            now_str,
          ],
        )?;

        let deduplicated = inserted == 0;
        if deduplicated {
          tx.execute(
            "UPDATE dpc_ingest_audit SET action = ?1
             WHERE run_id = ?2 AND signature = ?3",
            rusqlite::params![AuditAction::Duplicate.as_str(), rec.run_id, rec.signature],
          )?;
        }

        let raw = if let Some(sig) = &rec.signature {
          tx.query_row(
            &format!(
              "SELECT {} FROM dpc_ingest_audit WHERE run_id = ?1 AND signature = ?2",
              RawAudit::COLUMNS
            ),
            rusqlite::params![rec.run_id, sig],
            RawAudit::from_row,
          )?
        } else {
          tx.query_row(
            &format!(
              "SELECT {} FROM dpc_ingest_audit WHERE rowid = last_insert_rowid()",
              RawAudit::COLUMNS
            ),
            [],
            RawAudit::from_row,
          )?
        };

        tx.commit()?;
        Ok((raw, deduplicated))
      })
      .await?;

    Ok(AuditAppend { record: raw.into_record()?, deduplicated })
  }

  async fn audit_for_run(&self, run_id: &str) -> Result<Vec<pitchside_core::audit::AuditRecord>> {
    let run_id = run_id.to_owned();

    let raws: Vec<RawAudit> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM dpc_ingest_audit WHERE run_id = ?1 ORDER BY id",
          RawAudit::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![run_id], RawAudit::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAudit::into_record).collect()
  }

  async fn run_signatures(&self, run_id: &str) -> Result<HashSet<String>> {
    let run_id = run_id.to_owned();

    let sigs: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT signature FROM dpc_ingest_audit
           WHERE run_id = ?1 AND signature IS NOT NULL",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![run_id], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(sigs.into_iter().collect())
  }

  // ── Registry ──────────────────────────────────────────────────────────────

  async fn rules_for(&self, entity: EntityKind) -> Result<Vec<QualityRule>> {
    let entity_str = entity.as_str().to_owned();

    let raws: Vec<RawRule> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT rule_name, entity, params_json, severity
           FROM dpc_quality_rule WHERE entity = ?1 ORDER BY rule_name",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![entity_str], |row| {
            Ok(RawRule {
              rule_name:   row.get(0)?,
              entity:      row.get(1)?,
              params_json: row.get(2)?,
              severity:    row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRule::into_rule).collect()
  }

  async fn put_rule(&self, rule: &QualityRule) -> Result<()> {
    let params_json = serde_json::to_string(&rule.params)?;
    let rule_name = rule.rule_name.clone();
    let entity_str = rule.entity.as_str().to_owned();
    let kind = rule.params.discriminant().to_owned();
    let severity = rule.severity.as_str().to_owned();
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO dpc_quality_rule
             (rule_name, entity, rule_kind, params_json, severity, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (rule_name, entity) DO UPDATE SET
             rule_kind = excluded.rule_kind,
             params_json = excluded.params_json,
             severity = excluded.severity,
             updated_at = excluded.updated_at",
          rusqlite::params![rule_name, entity_str, kind, params_json, severity, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn active_schema(&self, schema_name: &str) -> Result<Option<SchemaDefinition>> {
    let name = schema_name.to_owned();

    let raw: Option<RawSchema> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT schema_name, schema_version, fields_json, status
               FROM dpc_schema_registry
               WHERE schema_name = ?1 AND status = 'active'
               ORDER BY id DESC LIMIT 1",
              rusqlite::params![name],
              |row| {
                Ok(RawSchema {
                  schema_name:    row.get(0)?,
                  schema_version: row.get(1)?,
                  fields_json:    row.get(2)?,
                  status:         row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawSchema::into_schema).transpose()
  }

  async fn put_schema(&self, def: &SchemaDefinition) -> Result<()> {
    let fields_json = serde_json::to_string(&def.fields)?;
    let name = def.schema_name.clone();
    let version = def.schema_version.clone();
    let status = encode_schema_status(def.status).to_owned();
    let activating = def.status == SchemaStatus::Active;
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if activating {
          tx.execute(
            "UPDATE dpc_schema_registry SET status = 'deprecated'
             WHERE schema_name = ?1 AND status = 'active'",
            rusqlite::params![name],
          )?;
        }
        tx.execute(
          "INSERT INTO dpc_schema_registry
             (schema_name, schema_version, fields_json, status, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (schema_name, schema_version) DO UPDATE SET
             fields_json = excluded.fields_json,
             status = excluded.status",
          rusqlite::params![name, version, fields_json, status, now_str],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Admin log ─────────────────────────────────────────────────────────────

  async fn append_admin_log(
    &self,
    actor: &str,
    action: &str,
    detail: Option<&str>,
  ) -> Result<()> {
    let actor = actor.to_owned();
    let action = action.to_owned();
    let detail = detail.map(str::to_owned);
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO audit_log (actor, action, detail, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![actor, action, detail, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
