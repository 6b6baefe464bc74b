//! Handlers for rule and schema registry administration.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/registry/rules?entity=player` | Rules for one entity type |
//! | `PUT`  | `/registry/rules` | Validate + upsert one rule |
//! | `GET`  | `/registry/schemas?entity=player` | The active schema |
//! | `PUT`  | `/registry/schemas` | Append a schema version |

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
};
use pitchside_core::{
  record::EntityKind,
  rule::{QualityRule, SchemaDefinition},
  store::IngestStore,
};
use serde::Deserialize;

use crate::{ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct EntityParams {
  pub entity: String,
}

fn parse_entity(s: &str) -> Result<EntityKind, ApiError> {
  EntityKind::parse(s)
    .ok_or_else(|| ApiError::BadRequest(format!("unknown entity type {s:?}")))
}

/// Administrative writes are attributed to this actor until the API grows
/// authentication.
const API_ACTOR: &str = "api";

/// `GET /registry/rules?entity=<kind>`
pub async fn list_rules<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<EntityParams>,
) -> Result<Json<Vec<QualityRule>>, ApiError>
where
  S: IngestStore + Clone + 'static,
{
  let entity = parse_entity(&params.entity)?;
  let rules = state.pipeline.registry().rules(entity).await?;
  Ok(Json(rules.as_ref().clone()))
}

/// `PUT /registry/rules`
pub async fn put_rule<S>(
  State(state): State<ApiState<S>>,
  Json(rule): Json<QualityRule>,
) -> Result<StatusCode, ApiError>
where
  S: IngestStore + Clone + 'static,
{
  state.pipeline.registry().put_rule(&rule, API_ACTOR).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /registry/schemas?entity=<kind>`
pub async fn active_schema<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<EntityParams>,
) -> Result<Json<SchemaDefinition>, ApiError>
where
  S: IngestStore + Clone + 'static,
{
  let entity = parse_entity(&params.entity)?;
  let schema = state.pipeline.registry().active_schema(entity).await?;
  Ok(Json(schema.as_ref().clone()))
}

/// `PUT /registry/schemas`
pub async fn put_schema<S>(
  State(state): State<ApiState<S>>,
  Json(def): Json<SchemaDefinition>,
) -> Result<StatusCode, ApiError>
where
  S: IngestStore + Clone + 'static,
{
  state.pipeline.registry().put_schema(&def, API_ACTOR).await?;
  Ok(StatusCode::NO_CONTENT)
}
