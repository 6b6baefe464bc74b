//! The `IngestStore` trait — the seam between the resolution core and its
//! storage backend.
//!
//! Implemented by storage backends (e.g. `pitchside-store-sqlite`). The
//! engine and API depend on this abstraction, not on any concrete backend.
//!
//! Methods whose output is `Result<Result<T, crate::Error>, Self::Error>`
//! separate the two failure planes: the outer error is an infrastructure
//! failure (retryable at the write boundary), the inner one a domain
//! rejection decided inside the backend's transaction (merge preconditions,
//! match status transitions).

use std::{collections::HashSet, future::Future};

use chrono::{DateTime, Utc};

use crate::{
  audit::{AuditAppend, AuditRecord, NewAuditRecord},
  entity::{Alias, CanonicalPlayer, MergeEvent},
  matches::{MatchFact, MatchRecord},
  record::EntityKind,
  rule::{QualityRule, SchemaDefinition},
};

/// Abstraction over a Pitchside storage backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait IngestStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Identity ──────────────────────────────────────────────────────────

  /// Exact cross-reference lookup. Returns the mapped player, already
  /// redirected through `merged_into` if the mapping predates a merge.
  fn find_player_by_xref<'a>(
    &'a self,
    provider: &'a str,
    provider_local_id: &'a str,
  ) -> impl Future<Output = Result<Option<CanonicalPlayer>, Self::Error>> + Send + 'a;

  /// Update `last_seen_at` on an existing xref. The side-effect-light path
  /// of an exact resolution hit.
  fn touch_xref<'a>(
    &'a self,
    provider: &'a str,
    provider_local_id: &'a str,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn get_player<'a>(
    &'a self,
    uid: &'a str,
  ) -> impl Future<Output = Result<Option<CanonicalPlayer>, Self::Error>> + Send + 'a;

  /// Fuzzy-match prefilter: non-merged players whose normalized name or
  /// alias contains `norm_fragment`.
  fn candidate_players<'a>(
    &'a self,
    norm_fragment: &'a str,
  ) -> impl Future<Output = Result<Vec<CanonicalPlayer>, Self::Error>> + Send + 'a;

  /// Insert a new player together with its first xref, atomically. If
  /// another worker registered the same `(provider, provider_local_id)`
  /// pair first, the insert is discarded and the winner's player is
  /// returned instead.
  fn create_player_with_xref<'a>(
    &'a self,
    player: &'a CanonicalPlayer,
    provider: &'a str,
    provider_local_id: &'a str,
  ) -> impl Future<Output = Result<CanonicalPlayer, Self::Error>> + Send + 'a;

  /// Map an additional provider pair onto an existing entity. Returns the
  /// uid the pair actually maps to afterwards — the existing mapping wins
  /// on conflict.
  fn register_xref<'a>(
    &'a self,
    entity_uid: &'a str,
    provider: &'a str,
    provider_local_id: &'a str,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;

  /// Optimistically write back a mutated profile. Returns `false` when the
  /// row's `updated_at` no longer matches `expected_updated_at` (a
  /// concurrent writer won; re-read and retry).
  fn update_player<'a>(
    &'a self,
    player: &'a CanonicalPlayer,
    expected_updated_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  fn add_alias<'a>(
    &'a self,
    alias: &'a Alias,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn aliases_for<'a>(
    &'a self,
    uid: &'a str,
  ) -> impl Future<Output = Result<Vec<Alias>, Self::Error>> + Send + 'a;

  fn count_xrefs<'a>(
    &'a self,
    uid: &'a str,
  ) -> impl Future<Output = Result<u32, Self::Error>> + Send + 'a;

  // ── Merge ─────────────────────────────────────────────────────────────

  /// Apply a merge in one transaction: repoint aliases and xrefs from
  /// `event.from_uid` to `event.to_uid`, mark the source Merged with its
  /// redirect, set the target's recomputed confidence, and append the
  /// write-once merge event. Preconditions are re-validated inside the
  /// transaction; violations come back as the inner domain error and leave
  /// no partial state.
  fn apply_merge<'a>(
    &'a self,
    event: &'a MergeEvent,
    merged_confidence: f64,
  ) -> impl Future<Output = Result<Result<(), crate::Error>, Self::Error>> + Send + 'a;

  fn merge_events_for<'a>(
    &'a self,
    uid: &'a str,
  ) -> impl Future<Output = Result<Vec<MergeEvent>, Self::Error>> + Send + 'a;

  // ── Match facts ───────────────────────────────────────────────────────

  fn get_match<'a>(
    &'a self,
    match_id: &'a str,
  ) -> impl Future<Output = Result<Option<MatchFact>, Self::Error>> + Send + 'a;

  /// Idempotent last-writer-wins upsert. Status transitions outside the
  /// lifecycle table are rejected as the inner domain error; an incoming
  /// snapshot older than the stored row leaves the row untouched.
  fn upsert_match<'a>(
    &'a self,
    record: &'a MatchRecord,
  ) -> impl Future<Output = Result<Result<MatchFact, crate::Error>, Self::Error>> + Send + 'a;

  // ── Audit ─────────────────────────────────────────────────────────────

  /// Append an audit row. Idempotent per `(run_id, signature)`: a repeated
  /// signature within the run collapses into the existing row, which is
  /// re-flagged with the `duplicate` action.
  fn append_audit(
    &self,
    rec: NewAuditRecord,
  ) -> impl Future<Output = Result<AuditAppend, Self::Error>> + Send + '_;

  fn audit_for_run<'a>(
    &'a self,
    run_id: &'a str,
  ) -> impl Future<Output = Result<Vec<AuditRecord>, Self::Error>> + Send + 'a;

  /// Signatures already audited in a run — the duplicate rule's input.
  fn run_signatures<'a>(
    &'a self,
    run_id: &'a str,
  ) -> impl Future<Output = Result<HashSet<String>, Self::Error>> + Send + 'a;

  // ── Registry ──────────────────────────────────────────────────────────

  fn rules_for(
    &self,
    entity: EntityKind,
  ) -> impl Future<Output = Result<Vec<QualityRule>, Self::Error>> + Send + '_;

  /// Upsert by `(rule_name, entity)`; latest row wins.
  fn put_rule<'a>(
    &'a self,
    rule: &'a QualityRule,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// The latest active schema version for `schema_name`, if any.
  fn active_schema<'a>(
    &'a self,
    schema_name: &'a str,
  ) -> impl Future<Output = Result<Option<SchemaDefinition>, Self::Error>> + Send + 'a;

  /// Append a schema version. Registering an active version deprecates
  /// prior versions of the same name in the same transaction; versions are
  /// never deleted.
  fn put_schema<'a>(
    &'a self,
    def: &'a SchemaDefinition,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Admin log ─────────────────────────────────────────────────────────

  /// Record an administrative action (registry write, merge decision).
  fn append_admin_log<'a>(
    &'a self,
    actor: &'a str,
    action: &'a str,
    detail: Option<&'a str>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
