//! Handler for merge decisions.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use pitchside_core::store::IngestStore;
use pitchside_engine::merge;
use serde::Deserialize;

use crate::{ApiState, error::ApiError};

/// JSON body accepted by `POST /merges`.
#[derive(Debug, Deserialize)]
pub struct MergeBody {
  pub from_uid:   String,
  pub to_uid:     String,
  pub reason:     String,
  pub decided_by: String,
}

/// `POST /merges` — returns 201 + the write-once merge event.
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<MergeBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: IngestStore + Clone + 'static,
{
  let event = merge::merge(
    state.store.as_ref(),
    &body.from_uid,
    &body.to_uid,
    &body.reason,
    &body.decided_by,
  )
  .await?;
  Ok((StatusCode::CREATED, Json(event)))
}
