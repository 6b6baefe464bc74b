//! The ingestion pipeline — registry, gate, resolver, merge-aware store and
//! fact updater wired together over one batch of records.
//!
//! Every record produces exactly one audit row per run and signature, on
//! every path: accepted, warned, blocked, ambiguous, even store failure
//! after retries. Dry runs evaluate the gate and preview resolution but
//! write nothing, audit included.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use pitchside_core::{
  audit::{AuditAction, NewAuditRecord},
  record::{EntityKind, RawRecord, normalize_name, field_str},
  store::IngestStore,
  verdict::{Verdict, VerdictStatus},
};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
  error::{EngineError, Result},
  facts, gate,
  gate::{GateAggregates, GateContext},
  registry::Registry,
  resolve::{Resolution, Resolver},
};

/// Attempts per store write before the record is given up as blocked.
const WRITE_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

// ─── Results ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
  pub provider:          String,
  pub provider_local_id: String,
  pub entity_type:       EntityKind,
  /// Canonical uid (players) or match id, when one was determined.
  pub entity_id:         Option<String>,
  pub status:            VerdictStatus,
  pub resolution:        Option<Resolution>,
  pub message:           Option<String>,
  pub deduplicated:      bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
  pub run_id:       String,
  pub dry_run:      bool,
  /// Worst per-record verdict: blocked > warn > accepted.
  pub overall:      VerdictStatus,
  pub total:        usize,
  pub accepted:     usize,
  pub warned:       usize,
  pub blocked:      usize,
  pub deduplicated: usize,
  pub outcomes:     Vec<RecordOutcome>,
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

pub struct IngestPipeline<S> {
  store:    S,
  registry: Arc<Registry<S>>,
  resolver: Resolver,
}

impl<S: IngestStore + Clone + 'static> IngestPipeline<S> {
  pub fn new(store: S, registry: Arc<Registry<S>>, resolver: Resolver) -> Self {
    Self { store, registry, resolver }
  }

  pub fn registry(&self) -> &Registry<S> { &self.registry }

  /// Run one batch under `run_id`. `aggregates` supplies the windowed
  /// null-ratio and sample statistics maintained by the caller.
  pub async fn run(
    &self,
    run_id: &str,
    records: &[RawRecord],
    dry_run: bool,
    aggregates: &GateAggregates,
  ) -> Result<RunSummary> {
    let span = info_span!("ingest_run", run_id = %run_id, dry_run);
    self.run_inner(run_id, records, dry_run, aggregates).instrument(span).await
  }

  async fn run_inner(
    &self,
    run_id: &str,
    records: &[RawRecord],
    dry_run: bool,
    aggregates: &GateAggregates,
  ) -> Result<RunSummary> {
    let seen = if dry_run {
      Default::default()
    } else {
      self.store.run_signatures(run_id).await.map_err(EngineError::store)?
    };
    let mut ctx = GateContext {
      prior:           None,
      aggregates:      aggregates.clone(),
      seen_signatures: seen,
    };

    let mut summary = RunSummary {
      run_id:       run_id.to_owned(),
      dry_run,
      overall:      VerdictStatus::Accepted,
      total:        records.len(),
      accepted:     0,
      warned:       0,
      blocked:      0,
      deduplicated: 0,
      outcomes:     Vec::with_capacity(records.len()),
    };

    for record in records {
      let outcome = self.process(run_id, record, dry_run, &mut ctx).await?;
      match outcome.status {
        VerdictStatus::Accepted => summary.accepted += 1,
        VerdictStatus::Warn => summary.warned += 1,
        VerdictStatus::Blocked => summary.blocked += 1,
      }
      if outcome.deduplicated {
        summary.deduplicated += 1;
      }
      summary.outcomes.push(outcome);
    }

    summary.overall = if summary.blocked > 0 {
      VerdictStatus::Blocked
    } else if summary.warned > 0 {
      VerdictStatus::Warn
    } else {
      VerdictStatus::Accepted
    };

    info!(
      overall = summary.overall.as_str(),
      total = summary.total,
      accepted = summary.accepted,
      warned = summary.warned,
      blocked = summary.blocked,
      deduplicated = summary.deduplicated,
      "ingestion run complete"
    );
    Ok(summary)
  }

  async fn process(
    &self,
    run_id: &str,
    record: &RawRecord,
    dry_run: bool,
    ctx: &mut GateContext,
  ) -> Result<RecordOutcome> {
    let kind = record.entity_type;
    let signature = record.signature();

    // No active schema refuses ingestion for the entity type outright.
    let schema = match self.registry.active_schema(kind).await {
      Ok(schema) => schema,
      Err(EngineError::Domain(err)) => {
        return self
          .finish(
            run_id,
            record,
            dry_run,
            ctx,
            signature,
            None,
            None,
            VerdictStatus::Blocked,
            Some(err.to_string()),
          )
          .await;
      }
      Err(err) => return Err(err),
    };
    let rules = self.registry.rules(kind).await?;

    // Jump rules compare against the last known profile; a read-only
    // lookup, shared by real and dry runs.
    ctx.prior = if kind == EntityKind::Player {
      self
        .store
        .find_player_by_xref(&record.provider, &record.provider_local_id)
        .await
        .map_err(EngineError::store)?
        .map(|p| p.payload_view())
    } else {
      None
    };

    let verdict = gate::evaluate(record, &schema, &rules, ctx);
    if verdict.status == VerdictStatus::Warn {
      warn!(
        provider = %record.provider,
        local_id = %record.provider_local_id,
        message = verdict.message().as_deref().unwrap_or(""),
        "record passed with warnings"
      );
    }

    if verdict.is_blocked() {
      let message = verdict.message();
      return self
        .finish(run_id, record, dry_run, ctx, signature, None, None, verdict.status, message)
        .await;
    }

    if dry_run {
      return self.preview(run_id, record, ctx, signature, &verdict).await;
    }

    let (entity_id, resolution, failure) = match kind {
      EntityKind::Player => self.ingest_player(record).await?,
      EntityKind::Match => self.ingest_match(record).await?,
      // Teams, referees and coaches are audited and referenced by uid but
      // not resolver-managed.
      _ => (Some(reference_id(record)), None, None),
    };

    let status =
      if failure.is_some() { VerdictStatus::Blocked } else { verdict.status };
    let message = combine(verdict.message(), failure);

    self
      .finish(run_id, record, dry_run, ctx, signature, entity_id, resolution, status, message)
      .await
  }

  async fn ingest_player(
    &self,
    record: &RawRecord,
  ) -> Result<(Option<String>, Option<Resolution>, Option<String>)> {
    let now = Utc::now();
    let attempt = {
      let store = self.store.clone();
      let resolver = self.resolver.clone();
      let record = record.clone();
      move || {
        let store = store.clone();
        let resolver = resolver.clone();
        let record = record.clone();
        async move { resolver.resolve(&store, &record, now).await }
      }
    };

    match with_retry(attempt).await {
      Ok(resolved) => {
        Ok((Some(resolved.player.uid), Some(resolved.resolution), None))
      }
      Err(EngineError::Domain(err)) => {
        debug!(%err, "resolution refused");
        Ok((None, None, Some(err.to_string())))
      }
      Err(EngineError::Store(err)) => {
        Ok((None, None, Some(format!("store failure: {err}"))))
      }
    }
  }

  async fn ingest_match(
    &self,
    record: &RawRecord,
  ) -> Result<(Option<String>, Option<Resolution>, Option<String>)> {
    let attempt = {
      let store = self.store.clone();
      let record = record.clone();
      move || {
        let store = store.clone();
        let record = record.clone();
        async move { facts::upsert_match(&store, &record).await }
      }
    };

    match with_retry(attempt).await {
      Ok(Some(Ok(fact))) => Ok((Some(fact.match_id), None, None)),
      Ok(Some(Err(err))) => Ok((None, None, Some(err.to_string()))),
      Ok(None) => {
        Ok((None, None, Some("match payload missing structural fields".into())))
      }
      Err(EngineError::Domain(err)) => Ok((None, None, Some(err.to_string()))),
      Err(EngineError::Store(err)) => {
        Ok((None, None, Some(format!("store failure: {err}"))))
      }
    }
  }

  /// The dry-run tail: resolution preview, no writes of any kind.
  async fn preview(
    &self,
    run_id: &str,
    record: &RawRecord,
    ctx: &mut GateContext,
    signature: String,
    verdict: &Verdict,
  ) -> Result<RecordOutcome> {
    let (entity_id, resolution) = match record.entity_type {
      EntityKind::Player => match self.resolver.preview(&self.store, record).await {
        Ok((uid, resolution)) => (uid, Some(resolution)),
        Err(EngineError::Domain(err)) => {
          return self
            .finish(
              run_id,
              record,
              true,
              ctx,
              signature,
              None,
              None,
              VerdictStatus::Blocked,
              Some(err.to_string()),
            )
            .await;
        }
        Err(err) => return Err(err),
      },
      EntityKind::Match => {
        (field_str(&record.payload, "match_id").map(str::to_owned), None)
      }
      _ => (Some(reference_id(record)), None),
    };

    self
      .finish(
        run_id,
        record,
        true,
        ctx,
        signature,
        entity_id,
        resolution,
        verdict.status,
        verdict.message(),
      )
      .await
  }

  /// Audit (unless dry-run), mark the signature seen, build the outcome.
  #[allow(clippy::too_many_arguments)]
  async fn finish(
    &self,
    run_id: &str,
    record: &RawRecord,
    dry_run: bool,
    ctx: &mut GateContext,
    signature: String,
    entity_id: Option<String>,
    resolution: Option<Resolution>,
    status: VerdictStatus,
    message: Option<String>,
  ) -> Result<RecordOutcome> {
    let mut deduplicated = false;

    if !dry_run {
      let rec = NewAuditRecord {
        run_id:      run_id.to_owned(),
        source_id:   record.source_id.clone(),
        entity_type: record.entity_type,
        entity_id:   entity_id
          .clone()
          .unwrap_or_else(|| {
            format!("{}:{}", record.provider, record.provider_local_id)
          }),
        action:      AuditAction::Ingest,
        confidence:  record.confidence,
        signature:   Some(signature.clone()),
        status,
        message:     message.clone(),
      };

      let attempt = {
        let store = self.store.clone();
        move || {
          let store = store.clone();
          let rec = rec.clone();
          async move { store.append_audit(rec).await.map_err(EngineError::store) }
        }
      };
      deduplicated = with_retry(attempt).await?.deduplicated;
    }

    ctx.seen_signatures.insert(signature);

    Ok(RecordOutcome {
      provider: record.provider.clone(),
      provider_local_id: record.provider_local_id.clone(),
      entity_type: record.entity_type,
      entity_id,
      status,
      resolution,
      message,
      deduplicated,
    })
  }
}

/// Stable reference id for entity kinds without canonical tables.
fn reference_id(record: &RawRecord) -> String {
  let name = normalize_name(field_str(&record.payload, "name").unwrap_or_default());
  if name.is_empty() {
    format!("{}:{}", record.provider, record.provider_local_id)
  } else {
    format!("{}_{}", record.entity_type.as_str(), name)
  }
}

fn combine(verdict_message: Option<String>, failure: Option<String>) -> Option<String> {
  match (verdict_message, failure) {
    (Some(v), Some(f)) => Some(format!("{v} | {f}")),
    (v, None) => v,
    (None, f) => f,
  }
}

/// Bounded exponential backoff over store failures; domain rejections are
/// final and returned immediately.
async fn with_retry<T, F, Fut>(mut op: F) -> Result<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T>>,
{
  let mut delay = RETRY_BASE_DELAY;
  let mut attempt = 0;
  loop {
    attempt += 1;
    match op().await {
      Err(err) if err.is_retryable() && attempt < WRITE_ATTEMPTS => {
        warn!(%err, attempt, "store write failed, retrying");
        sleep(delay).await;
        delay *= 2;
      }
      other => return other,
    }
  }
}
