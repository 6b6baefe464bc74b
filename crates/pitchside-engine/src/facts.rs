//! The fact updater — match fixture upserts.

use chrono::Utc;
use pitchside_core::{
  matches::{MatchFact, MatchRecord, MatchStatus},
  record::RawRecord,
  store::IngestStore,
};
use tracing::warn;

use crate::error::{EngineError, Result};

/// Parse a match record out of a payload and upsert it.
///
/// The inner result carries domain rejections (illegal status transitions)
/// that become blocked, audited outcomes rather than run failures. `None`
/// means the payload lacks the structural minimum (match id + team refs).
pub async fn upsert_match<S: IngestStore>(
  store: &S,
  record: &RawRecord,
) -> Result<Option<Result<MatchFact, pitchside_core::Error>>> {
  let snapshot_ts = record.snapshot_ts.unwrap_or_else(Utc::now);
  let Some(mut rec) = MatchRecord::from_payload(&record.payload, snapshot_ts) else {
    return Ok(None);
  };

  // Scores only exist on finished fixtures; premature ones are dropped.
  if rec.status != MatchStatus::Finished && rec.score.is_some() {
    warn!(match_id = %rec.match_id, status = %rec.status.as_str(), "dropping premature score");
    rec.score = None;
  }

  let outcome = store.upsert_match(&rec).await.map_err(EngineError::store)?;
  Ok(Some(outcome))
}
