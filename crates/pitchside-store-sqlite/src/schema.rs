//! SQL schema for the Pitchside SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS dim_player (
    uid              TEXT PRIMARY KEY,
    full_name        TEXT NOT NULL,
    norm_name        TEXT NOT NULL,
    birth_date       TEXT,            -- ISO date or NULL
    country          TEXT,
    team_uid         TEXT,
    position         TEXT,            -- 'F' | 'M' | 'D' | 'GK'
    jersey_no        INTEGER,
    importance_score REAL NOT NULL DEFAULT 0.3,
    importance_tier  TEXT NOT NULL DEFAULT 'D',
    confidence       REAL NOT NULL DEFAULT 0.5,
    lifecycle        TEXT NOT NULL DEFAULT 'active',  -- 'active' | 'retired' | 'merged'
    merged_into      TEXT REFERENCES dim_player(uid),
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    CHECK (lifecycle != 'merged' OR merged_into IS NOT NULL)
);

CREATE TABLE IF NOT EXISTS player_alias (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_uid   TEXT NOT NULL REFERENCES dim_player(uid) ON DELETE CASCADE,
    display_name TEXT NOT NULL,
    norm_name    TEXT NOT NULL,
    lang         TEXT,
    source       TEXT,
    confidence   REAL NOT NULL DEFAULT 0.5,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS player_xref (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_uid         TEXT NOT NULL REFERENCES dim_player(uid) ON DELETE CASCADE,
    provider           TEXT NOT NULL,
    provider_player_id TEXT NOT NULL,
    first_seen_at      TEXT NOT NULL,
    last_seen_at       TEXT NOT NULL,
    UNIQUE (provider, provider_player_id)
);

-- Merge events are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS player_merge_event (
    event_id   TEXT PRIMARY KEY,
    from_uid   TEXT NOT NULL,
    to_uid     TEXT NOT NULL,
    reason     TEXT NOT NULL,
    decided_by TEXT NOT NULL,
    decided_at TEXT NOT NULL,
    CHECK (from_uid != to_uid)
);

CREATE TABLE IF NOT EXISTS f_match (
    match_id      TEXT PRIMARY KEY,
    league        TEXT,
    season        TEXT,
    round         TEXT,
    home_team_uid TEXT NOT NULL,
    away_team_uid TEXT NOT NULL,
    kickoff_at    TEXT,
    kickoff_tz    TEXT,
    venue         TEXT,
    referee_uid   TEXT,
    status        TEXT NOT NULL DEFAULT 'scheduled',
    odds_home     REAL,
    odds_draw     REAL,
    odds_away     REAL,
    home_score    INTEGER,
    away_score    INTEGER,
    result        TEXT,             -- 'H' | 'D' | 'A', set at finish
    snapshot_ts   TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dpc_schema_registry (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    schema_name    TEXT NOT NULL,
    schema_version TEXT NOT NULL,
    fields_json    TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'active',   -- 'active' | 'deprecated'
    created_at     TEXT NOT NULL,
    UNIQUE (schema_name, schema_version)
);

CREATE TABLE IF NOT EXISTS dpc_quality_rule (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    rule_name   TEXT NOT NULL,
    entity      TEXT NOT NULL,
    rule_kind   TEXT NOT NULL,     -- discriminant of RuleParams variant
    params_json TEXT NOT NULL,
    severity    TEXT NOT NULL DEFAULT 'warn',
    updated_at  TEXT NOT NULL,
    UNIQUE (rule_name, entity)
);

-- Ingest audit rows are append-only; the duplicate re-flag on
-- (run_id, signature) is the single allowed in-place update.
CREATE TABLE IF NOT EXISTS dpc_ingest_audit (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id      TEXT NOT NULL,
    source_id   TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id   TEXT NOT NULL,
    action      TEXT NOT NULL DEFAULT 'ingest',
    confidence  REAL,
    signature   TEXT,
    status      TEXT NOT NULL,
    message     TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    actor      TEXT NOT NULL,
    action     TEXT NOT NULL,
    detail     TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS dim_player_norm_idx    ON dim_player(norm_name);
CREATE INDEX IF NOT EXISTS player_alias_norm_idx  ON player_alias(norm_name);
CREATE INDEX IF NOT EXISTS player_alias_uid_idx   ON player_alias(entity_uid);
CREATE INDEX IF NOT EXISTS player_xref_uid_idx    ON player_xref(entity_uid);
CREATE INDEX IF NOT EXISTS ingest_audit_run_idx   ON dpc_ingest_audit(run_id);
CREATE INDEX IF NOT EXISTS ingest_audit_ent_idx   ON dpc_ingest_audit(entity_type, entity_id);
CREATE UNIQUE INDEX IF NOT EXISTS ingest_audit_sig_idx
    ON dpc_ingest_audit(run_id, signature) WHERE signature IS NOT NULL;

PRAGMA user_version = 1;
";
