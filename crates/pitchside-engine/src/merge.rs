//! The merge engine — consolidation of two canonical entities.

use chrono::Utc;
use pitchside_core::{
  entity::{CanonicalPlayer, LifecycleStatus, MergeEvent},
  store::IngestStore,
};
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Merge `from_uid` into `to_uid`.
///
/// Preconditions are checked up front and re-validated inside the store
/// transaction, so a re-merge fails cleanly instead of double-applying.
/// The target's confidence becomes the xref-count-weighted mean of both
/// profiles.
pub async fn merge<S: IngestStore>(
  store: &S,
  from_uid: &str,
  to_uid: &str,
  reason: &str,
  decided_by: &str,
) -> Result<MergeEvent> {
  if from_uid == to_uid {
    return Err(
      pitchside_core::Error::InvalidMerge("cannot merge an entity into itself".into()).into(),
    );
  }

  let from = require(store, from_uid).await?;
  let to = require(store, to_uid).await?;
  if from.lifecycle == LifecycleStatus::Merged {
    return Err(
      pitchside_core::Error::InvalidMerge(format!("{from_uid} is already merged")).into(),
    );
  }
  if to.lifecycle == LifecycleStatus::Merged {
    return Err(
      pitchside_core::Error::InvalidMerge(format!(
        "target {to_uid} is merged; merge into {} instead",
        to.merged_into.as_deref().unwrap_or("its final target")
      ))
      .into(),
    );
  }

  let from_weight = store.count_xrefs(from_uid).await.map_err(EngineError::store)?.max(1) as f64;
  let to_weight = store.count_xrefs(to_uid).await.map_err(EngineError::store)?.max(1) as f64;
  let merged_confidence =
    (from.confidence * from_weight + to.confidence * to_weight) / (from_weight + to_weight);

  let event = MergeEvent {
    event_id:   Uuid::new_v4(),
    from_uid:   from_uid.to_owned(),
    to_uid:     to_uid.to_owned(),
    reason:     reason.to_owned(),
    decided_by: decided_by.to_owned(),
    decided_at: Utc::now(),
  };

  store
    .apply_merge(&event, merged_confidence)
    .await
    .map_err(EngineError::store)??;

  store
    .append_admin_log(decided_by, "merge", Some(&format!("{from_uid} -> {to_uid}")))
    .await
    .map_err(EngineError::store)?;

  info!(from = %from_uid, to = %to_uid, confidence = merged_confidence, "entities merged");
  Ok(event)
}

async fn require<S: IngestStore>(store: &S, uid: &str) -> Result<CanonicalPlayer> {
  store
    .get_player(uid)
    .await
    .map_err(EngineError::store)?
    .ok_or_else(|| pitchside_core::Error::InvalidMerge(format!("unknown uid {uid}")).into())
}
