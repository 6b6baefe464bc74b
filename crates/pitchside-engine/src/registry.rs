//! Rule & schema registry — a read-through cache over the store.
//!
//! One registry per process, passed as an explicit dependency. Every write
//! validates, persists, appends an admin-log row and invalidates the cached
//! entry, so readers only ever pay the store round trip after a change.

use std::{collections::HashMap, sync::Arc};

use pitchside_core::{
  record::EntityKind,
  rule::{QualityRule, SchemaDefinition},
  store::IngestStore,
};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{EngineError, Result};

pub struct Registry<S> {
  store:   S,
  schemas: RwLock<HashMap<EntityKind, Arc<SchemaDefinition>>>,
  rules:   RwLock<HashMap<EntityKind, Arc<Vec<QualityRule>>>>,
}

impl<S: IngestStore> Registry<S> {
  pub fn new(store: S) -> Self {
    Self {
      store,
      schemas: RwLock::new(HashMap::new()),
      rules: RwLock::new(HashMap::new()),
    }
  }

  /// The active schema for an entity type. Fails with
  /// [`pitchside_core::Error::SchemaNotFound`] when no active version
  /// exists — ingestion for that type is refused, not silently skipped.
  pub async fn active_schema(&self, entity: EntityKind) -> Result<Arc<SchemaDefinition>> {
    if let Some(hit) = self.schemas.read().await.get(&entity) {
      return Ok(Arc::clone(hit));
    }

    let def = self
      .store
      .active_schema(entity.as_str())
      .await
      .map_err(EngineError::store)?
      .ok_or_else(|| {
        pitchside_core::Error::SchemaNotFound(entity.as_str().to_owned())
      })?;

    let def = Arc::new(def);
    self.schemas.write().await.insert(entity, Arc::clone(&def));
    Ok(def)
  }

  /// All quality rules registered for an entity type (possibly empty).
  pub async fn rules(&self, entity: EntityKind) -> Result<Arc<Vec<QualityRule>>> {
    if let Some(hit) = self.rules.read().await.get(&entity) {
      return Ok(Arc::clone(hit));
    }

    let rules =
      Arc::new(self.store.rules_for(entity).await.map_err(EngineError::store)?);
    self.rules.write().await.insert(entity, Arc::clone(&rules));
    Ok(rules)
  }

  /// Validate and upsert a rule, logging the administrative action.
  pub async fn put_rule(&self, rule: &QualityRule, actor: &str) -> Result<()> {
    rule.validate()?;
    self.store.put_rule(rule).await.map_err(EngineError::store)?;
    self
      .store
      .append_admin_log(
        actor,
        "rule_upsert",
        Some(&format!("{}/{}", rule.rule_name, rule.entity.as_str())),
      )
      .await
      .map_err(EngineError::store)?;

    self.rules.write().await.remove(&rule.entity);
    info!(rule = %rule.rule_name, entity = %rule.entity.as_str(), "rule registered");
    Ok(())
  }

  /// Append a schema version, logging the administrative action. An active
  /// version deprecates prior actives of the same name inside the store
  /// transaction.
  pub async fn put_schema(&self, def: &SchemaDefinition, actor: &str) -> Result<()> {
    if def.schema_name.trim().is_empty() || def.schema_version.trim().is_empty() {
      return Err(
        pitchside_core::Error::InvalidRule {
          rule_name: def.schema_name.clone(),
          reason:    "schema name and version must not be empty".into(),
        }
        .into(),
      );
    }

    self.store.put_schema(def).await.map_err(EngineError::store)?;
    self
      .store
      .append_admin_log(
        actor,
        "schema_register",
        Some(&format!("{}@{}", def.schema_name, def.schema_version)),
      )
      .await
      .map_err(EngineError::store)?;

    if let Some(entity) = EntityKind::parse(&def.schema_name) {
      self.schemas.write().await.remove(&entity);
    }
    info!(schema = %def.schema_name, version = %def.schema_version, "schema registered");
    Ok(())
  }
}
