//! Pitchside server assembly: configuration and application wiring.

use std::{path::PathBuf, sync::Arc};

use axum::Router;
use pitchside_api::ApiState;
use pitchside_engine::{IngestPipeline, Registry, Resolver, ResolverConfig};
use pitchside_store_sqlite::SqliteStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` with
/// `PITCHSIDE_*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub resolver:   ResolverConfig,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8310 }
fn default_store_path() -> PathBuf { PathBuf::from("pitchside.db") }

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       default_host(),
      port:       default_port(),
      store_path: default_store_path(),
      resolver:   ResolverConfig::default(),
    }
  }
}

// ─── Application ─────────────────────────────────────────────────────────────

/// Wire store, registry and pipeline into the API router.
pub fn app(store: SqliteStore, resolver: ResolverConfig) -> Router {
  let registry = Arc::new(Registry::new(store.clone()));
  let pipeline =
    Arc::new(IngestPipeline::new(store.clone(), registry, Resolver::new(resolver)));
  let state = ApiState { store: Arc::new(store), pipeline };

  Router::new()
    .nest("/api", pitchside_api::api_router(state))
    .layer(TraceLayer::new_for_http())
}
