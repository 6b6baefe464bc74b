//! JSON REST API for Pitchside.
//!
//! Exposes an axum [`Router`] backed by any
//! [`pitchside_core::store::IngestStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", pitchside_api::api_router(state))
//! ```

pub mod error;
pub mod ingest;
pub mod merges;
pub mod players;
pub mod registry;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use pitchside_core::store::IngestStore;
use pitchside_engine::IngestPipeline;

pub use error::ApiError;

/// Shared handler state: the store for reads, the pipeline (and through it
/// the registry) for everything that writes.
pub struct ApiState<S> {
  pub store:    Arc<S>,
  pub pipeline: Arc<IngestPipeline<S>>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), pipeline: Arc::clone(&self.pipeline) }
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: IngestStore + Clone + 'static,
{
  Router::new()
    .route("/ingest", post(ingest::run::<S>))
    .route("/runs/{run_id}/audit", get(ingest::run_audit::<S>))
    .route("/players/{uid}", get(players::get_one::<S>))
    .route("/merges", post(merges::create::<S>))
    .route(
      "/registry/rules",
      get(registry::list_rules::<S>).put(registry::put_rule::<S>),
    )
    .route(
      "/registry/schemas",
      get(registry::active_schema::<S>).put(registry::put_schema::<S>),
    )
    .with_state(state)
}

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
  };
  use pitchside_engine::{Registry, Resolver};
  use pitchside_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  async fn make_state() -> ApiState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let registry = Arc::new(Registry::new(store.clone()));
    let pipeline =
      Arc::new(IngestPipeline::new(store.clone(), registry, Resolver::default()));
    ApiState { store: Arc::new(store), pipeline }
  }

  async fn request(
    state: ApiState<SqliteStore>,
    method: &str,
    uri: &str,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let builder = Request::builder()
      .method(method)
      .uri(uri)
      .header(header::CONTENT_TYPE, "application/json");
    let req = match body {
      Some(v) => builder.body(Body::from(v.to_string())).unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };

    let resp = api_router(state).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
  }

  fn player_schema() -> Value {
    json!({
      "schema_name": "player",
      "schema_version": "1",
      "fields": [{ "name": "name", "kind": "text", "required": true }],
      "status": "active",
    })
  }

  #[tokio::test]
  async fn registry_roundtrip() {
    let state = make_state().await;

    let (status, _) =
      request(state.clone(), "PUT", "/registry/schemas", Some(player_schema())).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) =
      request(state.clone(), "GET", "/registry/schemas?entity=player", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schema_version"], "1");

    let (status, body) =
      request(state, "GET", "/registry/schemas?entity=nonsense", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("unknown entity type"));
  }

  #[tokio::test]
  async fn missing_schema_is_not_found() {
    let state = make_state().await;
    let (status, body) =
      request(state, "GET", "/registry/schemas?entity=player", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("no active schema"));
  }

  #[tokio::test]
  async fn ingest_then_read_player_and_audit() {
    let state = make_state().await;
    request(state.clone(), "PUT", "/registry/schemas", Some(player_schema())).await;

    let (status, summary) = request(
      state.clone(),
      "POST",
      "/ingest",
      Some(json!({
        "run_id": "run1",
        "records": [{
          "entity_type": "player",
          "provider": "sofa",
          "provider_local_id": "p1",
          "source_id": "sofa",
          "payload": { "name": "J. Smith", "birth_date": "1995-01-01" },
          "confidence": 0.7,
          "snapshot_ts": null,
        }],
      })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["accepted"], 1);
    assert_eq!(summary["outcomes"][0]["entity_id"], "plr_sofa_p1");

    let (status, player) =
      request(state.clone(), "GET", "/players/plr_sofa_p1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(player["full_name"], "J. Smith");
    assert_eq!(player["xref_count"], 1);

    let (status, audit) = request(state.clone(), "GET", "/runs/run1/audit", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(audit.as_array().unwrap().len(), 1);
    assert_eq!(audit[0]["status"], "accepted");

    let (status, _) = request(state, "GET", "/players/plr_ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn ingest_batch_limits() {
    let state = make_state().await;
    request(state.clone(), "PUT", "/registry/schemas", Some(player_schema())).await;

    let (status, body) = request(
      state.clone(),
      "POST",
      "/ingest",
      Some(json!({ "run_id": "run1", "records": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("empty"));

    let oversized: Vec<Value> = (0..501)
      .map(|i| {
        json!({
          "entity_type": "player",
          "provider": "sofa",
          "provider_local_id": format!("p{i}"),
          "source_id": "sofa",
          "payload": { "name": format!("Player {i}") },
          "confidence": 0.7,
          "snapshot_ts": null,
        })
      })
      .collect();
    let (status, body) = request(
      state,
      "POST",
      "/ingest",
      Some(json!({ "run_id": "run1", "records": oversized })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("500"));
  }

  #[tokio::test]
  async fn invalid_merge_is_a_conflict() {
    let state = make_state().await;
    let (status, body) = request(
      state,
      "POST",
      "/merges",
      Some(json!({
        "from_uid": "plr_a",
        "to_uid": "plr_a",
        "reason": "dup",
        "decided_by": "ops",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("invalid merge"));
  }

  #[tokio::test]
  async fn invalid_rule_is_a_bad_request() {
    let state = make_state().await;
    let (status, body) = request(
      state,
      "PUT",
      "/registry/rules",
      Some(json!({
        "rule_name": "age_bounds",
        "entity": "player",
        "params": { "kind": "bounds", "field": "age", "min": 50.0, "max": 10.0 },
        "severity": "warn",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid rule"));
  }
}
