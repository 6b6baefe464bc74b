//! The identity resolver — exact, fuzzy, create.
//!
//! Exact hits go through the xref table. Misses are scored against
//! store-prefiltered candidates with Jaro-Winkler similarity over
//! normalized names, adjusted by birth-date and team agreement. A
//! sufficiently clear best candidate is adopted; a near-tie is refused as
//! [`pitchside_core::Error::AmbiguousMatch`]; anything else becomes a new
//! canonical entity with a deterministic uid.

use chrono::{DateTime, Utc};
use pitchside_core::{
  entity::{Alias, CanonicalPlayer},
  importance,
  record::{RawRecord, field_date, field_str, make_player_uid, normalize_name},
  store::IngestStore,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EngineError, Result};

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
  /// Minimum adjusted similarity for a fuzzy match to be adopted.
  pub accept_threshold:   f64,
  /// A runner-up within this margin of the best makes the match ambiguous.
  pub ambiguity_margin:   f64,
  /// Profile confidence assigned when the source reports none.
  pub default_confidence: f64,
}

impl Default for ResolverConfig {
  fn default() -> Self {
    Self { accept_threshold: 0.85, ambiguity_margin: 0.05, default_confidence: 0.5 }
  }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// How a record arrived at its canonical entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
  /// The provider pair was already mapped.
  ExactXref,
  /// Adopted an existing entity by name similarity.
  Fuzzy { score: f64 },
  /// First sighting; a new canonical entity was created.
  Created,
}

#[derive(Debug, Clone)]
pub struct Resolved {
  pub player:     CanonicalPlayer,
  pub resolution: Resolution,
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Attempts to write back a profile mutation before giving up on the
/// optimistic-concurrency race.
const UPDATE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Default)]
pub struct Resolver {
  pub config: ResolverConfig,
}

impl Resolver {
  pub fn new(config: ResolverConfig) -> Self { Self { config } }

  pub async fn resolve<S: IngestStore>(
    &self,
    store: &S,
    record: &RawRecord,
    now: DateTime<Utc>,
  ) -> Result<Resolved> {
    // 1. Exact: the provider pair is already mapped.
    if let Some(player) = store
      .find_player_by_xref(&record.provider, &record.provider_local_id)
      .await
      .map_err(EngineError::store)?
    {
      store
        .touch_xref(&record.provider, &record.provider_local_id, now)
        .await
        .map_err(EngineError::store)?;
      let player = self.apply_profile(store, player, record).await?;
      debug!(uid = %player.uid, "resolved via xref");
      return Ok(Resolved { player, resolution: Resolution::ExactXref });
    }

    // 2. Fuzzy: score candidates sharing a name fragment.
    let display_name = field_str(&record.payload, "name").unwrap_or_default();
    let norm = normalize_name(display_name);
    if !norm.is_empty() {
      if let Some((player, score)) = self.best_candidate(store, record, &norm).await? {
        let mapped_uid = store
          .register_xref(&player.uid, &record.provider, &record.provider_local_id)
          .await
          .map_err(EngineError::store)?;
        // A concurrent registration may have mapped the pair elsewhere;
        // adopt whatever the pair now points at.
        let player = if mapped_uid == player.uid {
          player
        } else {
          store
            .get_player(&mapped_uid)
            .await
            .map_err(EngineError::store)?
            .unwrap_or(player)
        };

        self.record_alias(store, &player, display_name, record).await?;
        let player = self.apply_profile(store, player, record).await?;
        info!(uid = %player.uid, score, provider = %record.provider, "fuzzy match adopted");
        return Ok(Resolved { player, resolution: Resolution::Fuzzy { score } });
      }
    }

    // 3. Miss: new canonical entity.
    let uid = make_player_uid(
      Some(&record.provider),
      Some(&record.provider_local_id),
      field_str(&record.payload, "name"),
      field_date(&record.payload, "birth_date"),
    );
    let confidence = record.confidence.unwrap_or(self.config.default_confidence);
    let mut player = CanonicalPlayer::from_payload(uid, &record.payload, confidence, now);
    player.importance = importance::score(record.entity_type, &record.payload);

    let winner = store
      .create_player_with_xref(&player, &record.provider, &record.provider_local_id)
      .await
      .map_err(EngineError::store)?;

    if winner.uid == player.uid {
      if !display_name.is_empty() {
        store
          .add_alias(&Alias::new(
            &winner.uid,
            display_name,
            Some(&record.provider),
            confidence,
          ))
          .await
          .map_err(EngineError::store)?;
      }
      info!(uid = %winner.uid, provider = %record.provider, "canonical entity created");
      Ok(Resolved { player: winner, resolution: Resolution::Created })
    } else {
      // Lost the registration race; the winner's uid is authoritative.
      debug!(uid = %winner.uid, "adopted concurrent winner");
      let player = self.apply_profile(store, winner, record).await?;
      Ok(Resolved { player, resolution: Resolution::ExactXref })
    }
  }

  /// Preview resolution without any writes — the dry-run path.
  pub async fn preview<S: IngestStore>(
    &self,
    store: &S,
    record: &RawRecord,
  ) -> Result<(Option<String>, Resolution)> {
    if let Some(player) = store
      .find_player_by_xref(&record.provider, &record.provider_local_id)
      .await
      .map_err(EngineError::store)?
    {
      return Ok((Some(player.uid), Resolution::ExactXref));
    }

    let norm = normalize_name(field_str(&record.payload, "name").unwrap_or_default());
    if !norm.is_empty() {
      if let Some((player, score)) = self.best_candidate(store, record, &norm).await? {
        return Ok((Some(player.uid), Resolution::Fuzzy { score }));
      }
    }
    Ok((None, Resolution::Created))
  }

  /// Best fuzzy candidate above the acceptance threshold, or `None`. A
  /// runner-up inside the ambiguity margin aborts with `AmbiguousMatch`.
  async fn best_candidate<S: IngestStore>(
    &self,
    store: &S,
    record: &RawRecord,
    norm: &str,
  ) -> Result<Option<(CanonicalPlayer, f64)>> {
    // Prefilter on the last name token; initials mangle the leading ones.
    let fragment = norm.rsplit('_').next().unwrap_or(norm);
    let candidates =
      store.candidate_players(fragment).await.map_err(EngineError::store)?;
    if candidates.is_empty() {
      return Ok(None);
    }

    let mut scored: Vec<(CanonicalPlayer, f64)> = candidates
      .into_iter()
      .map(|c| {
        let score = similarity(record, norm, &c);
        (c, score)
      })
      .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    let (best, best_score) = &scored[0];
    if *best_score < self.config.accept_threshold {
      return Ok(None);
    }
    if let Some((_, second_score)) = scored.get(1) {
      if *second_score > best_score - self.config.ambiguity_margin {
        let candidates =
          scored.iter().take(4).map(|(c, s)| (c.uid.clone(), *s)).collect();
        return Err(pitchside_core::Error::AmbiguousMatch { candidates }.into());
      }
    }
    Ok(Some((best.clone(), *best_score)))
  }

  async fn record_alias<S: IngestStore>(
    &self,
    store: &S,
    player: &CanonicalPlayer,
    display_name: &str,
    record: &RawRecord,
  ) -> Result<()> {
    let norm = normalize_name(display_name);
    if norm.is_empty() || norm == player.norm_name {
      return Ok(());
    }
    let known = store.aliases_for(&player.uid).await.map_err(EngineError::store)?;
    if known.iter().any(|a| a.norm_name == norm) {
      return Ok(());
    }
    store
      .add_alias(&Alias::new(
        &player.uid,
        display_name,
        Some(&record.provider),
        record.confidence.unwrap_or(self.config.default_confidence),
      ))
      .await
      .map_err(EngineError::store)
  }

  /// Fold the record's fields into the stored profile (stronger source
  /// overwrites, weaker fills gaps) and write back optimistically,
  /// re-reading on a lost race.
  async fn apply_profile<S: IngestStore>(
    &self,
    store: &S,
    mut player: CanonicalPlayer,
    record: &RawRecord,
  ) -> Result<CanonicalPlayer> {
    let source_confidence =
      record.confidence.unwrap_or(self.config.default_confidence);

    for _ in 0..UPDATE_ATTEMPTS {
      let mut updated = player.clone();
      let changed = updated.merge_from_payload(&record.payload, source_confidence);
      let rescored = importance::score(record.entity_type, &record.payload);
      let importance_moved = rescored.score > updated.importance.score;
      if importance_moved {
        updated.importance = rescored;
      }
      if !changed && !importance_moved {
        return Ok(player);
      }

      if store
        .update_player(&updated, player.updated_at)
        .await
        .map_err(EngineError::store)?
      {
        return Ok(updated);
      }

      // Lost the optimistic race; re-read and fold again.
      match store.get_player(&player.uid).await.map_err(EngineError::store)? {
        Some(fresh) => player = fresh,
        None => return Ok(updated),
      }
    }
    Ok(player)
  }
}

/// Adjusted similarity between a record and a candidate profile.
///
/// Jaro-Winkler over normalized names; halved on a birth-date disagreement;
/// +0.25 for birth-date agreement, +0.10 for team agreement; clamped to 1.
fn similarity(record: &RawRecord, norm: &str, candidate: &CanonicalPlayer) -> f64 {
  let mut score = strsim::jaro_winkler(norm, &candidate.norm_name);

  match (field_date(&record.payload, "birth_date"), candidate.birth_date) {
    (Some(a), Some(b)) if a == b => score = (score + 0.25).min(1.0),
    (Some(_), Some(_)) => score /= 2.0,
    _ => {}
  }

  if let (Some(team), Some(candidate_team)) =
    (field_str(&record.payload, "team_uid"), candidate.team_uid.as_deref())
  {
    if team == candidate_team {
      score = (score + 0.10).min(1.0);
    }
  }

  score
}
