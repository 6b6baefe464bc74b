//! Handlers for canonical player reads.

use axum::{
  Json,
  extract::{Path, State},
};
use pitchside_core::{
  entity::{Alias, CanonicalPlayer, MergeEvent},
  store::IngestStore,
};
use serde::Serialize;

use crate::{ApiState, error::ApiError};

/// A player profile together with its identity side-tables.
#[derive(Debug, Serialize)]
pub struct PlayerView {
  #[serde(flatten)]
  pub player:       CanonicalPlayer,
  pub aliases:      Vec<Alias>,
  pub xref_count:   u32,
  pub merge_events: Vec<MergeEvent>,
}

/// `GET /players/:uid`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(uid): Path<String>,
) -> Result<Json<PlayerView>, ApiError>
where
  S: IngestStore + Clone + 'static,
{
  let store_err = |e: S::Error| ApiError::Store(Box::new(e));

  let player = state
    .store
    .get_player(&uid)
    .await
    .map_err(store_err)?
    .ok_or_else(|| ApiError::NotFound(format!("player {uid} not found")))?;

  let aliases = state.store.aliases_for(&uid).await.map_err(store_err)?;
  let xref_count = state.store.count_xrefs(&uid).await.map_err(store_err)?;
  let merge_events = state.store.merge_events_for(&uid).await.map_err(store_err)?;

  Ok(Json(PlayerView { player, aliases, xref_count, merge_events }))
}
