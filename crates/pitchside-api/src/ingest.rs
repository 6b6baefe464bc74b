//! Handlers for ingestion runs and their audit trails.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/ingest` | Body: [`IngestBody`]; returns the run summary |
//! | `GET`  | `/runs/:run_id/audit` | All audit rows of a run, in order |

use axum::{
  Json,
  extract::{Path, State},
};
use pitchside_core::{audit::AuditRecord, record::RawRecord, store::IngestStore};
use pitchside_engine::{GateAggregates, RunSummary};
use serde::Deserialize;

use crate::{ApiState, error::ApiError};

/// Upper bound on records per ingest call; larger loads are split by the
/// caller.
const MAX_BATCH_RECORDS: usize = 500;

/// JSON body accepted by `POST /ingest`.
#[derive(Debug, Deserialize)]
pub struct IngestBody {
  pub run_id:     String,
  #[serde(default)]
  pub dry_run:    bool,
  pub records:    Vec<RawRecord>,
  /// Windowed gate statistics, when the caller maintains them.
  #[serde(default)]
  pub aggregates: GateAggregates,
}

/// `POST /ingest`
pub async fn run<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<IngestBody>,
) -> Result<Json<RunSummary>, ApiError>
where
  S: IngestStore + Clone + 'static,
{
  if body.run_id.trim().is_empty() {
    return Err(ApiError::BadRequest("run_id must not be empty".into()));
  }
  if body.records.is_empty() {
    return Err(ApiError::BadRequest("records must not be empty".into()));
  }
  if body.records.len() > MAX_BATCH_RECORDS {
    return Err(ApiError::BadRequest(format!(
      "batch of {} records exceeds the limit of {MAX_BATCH_RECORDS}",
      body.records.len()
    )));
  }

  let summary = state
    .pipeline
    .run(&body.run_id, &body.records, body.dry_run, &body.aggregates)
    .await?;
  Ok(Json(summary))
}

/// `GET /runs/:run_id/audit`
pub async fn run_audit<S>(
  State(state): State<ApiState<S>>,
  Path(run_id): Path<String>,
) -> Result<Json<Vec<AuditRecord>>, ApiError>
where
  S: IngestStore + Clone + 'static,
{
  let rows = state
    .store
    .audit_for_run(&run_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(rows))
}
