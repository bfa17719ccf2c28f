use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{types::Type, Connection, Row};

use crate::error::Result;

/// How long a writer waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `schedules` and `publish_events` tables (idempotent). All
/// instants are stored as Unix milliseconds so range comparisons in the
/// polling query are plain integer comparisons.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schedules (
            id                       TEXT    NOT NULL PRIMARY KEY,
            post_variant_id          TEXT    NOT NULL,
            channel_connection_id    TEXT    NOT NULL,
            run_at_ms                INTEGER NOT NULL,
            timezone                 TEXT    NOT NULL,
            status                   TEXT    NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending','processing','published','failed','cancelled')),
            attempt_count            INTEGER NOT NULL DEFAULT 0,
            last_attempt_at_ms       INTEGER,
            error_code               TEXT,
            error_message            TEXT,
            processing_started_at_ms INTEGER,
            lease_owner              TEXT,
            lease_token              TEXT,
            published_at_ms          INTEGER,
            created_by               TEXT,
            created_at_ms            INTEGER NOT NULL,
            updated_at_ms            INTEGER NOT NULL,
            deleted_at_ms            INTEGER
        ) STRICT;

        -- Polling: WHERE status = 'pending' AND run_at_ms <= ? ORDER BY run_at_ms
        CREATE INDEX IF NOT EXISTS idx_schedules_due
            ON schedules (status, run_at_ms);
        -- Stale lease scan: WHERE status = 'processing' AND processing_started_at_ms < ?
        CREATE INDEX IF NOT EXISTS idx_schedules_lease
            ON schedules (status, processing_started_at_ms);
        CREATE INDEX IF NOT EXISTS idx_schedules_variant
            ON schedules (post_variant_id);
        CREATE INDEX IF NOT EXISTS idx_schedules_principal
            ON schedules (created_by, run_at_ms);

        CREATE TABLE IF NOT EXISTS publish_events (
            id               TEXT    NOT NULL PRIMARY KEY,
            schedule_id      TEXT    NOT NULL
                REFERENCES schedules (id) ON DELETE CASCADE,
            attempt_index    INTEGER NOT NULL CHECK (attempt_index >= 1),
            status           TEXT    NOT NULL CHECK (status IN ('success','failed')),
            external_post_id TEXT,
            external_url     TEXT,
            error_code       TEXT,
            error_message    TEXT,
            raw_response     TEXT,
            worker_id        TEXT,
            attempted_at_ms  INTEGER NOT NULL,
            UNIQUE (schedule_id, attempt_index)
        ) STRICT;

        CREATE TRIGGER IF NOT EXISTS publish_events_append_only
            BEFORE UPDATE ON publish_events
        BEGIN
            SELECT RAISE(ABORT, 'publish_events rows are immutable');
        END;
        ",
    )?;
    Ok(())
}

/// Per-connection settings every scheduler connection needs.
///
/// WAL lets pollers read while a claim is being written; the busy timeout
/// makes concurrent claimers wait for the write lock instead of failing.
pub fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(())
}

pub(crate) fn to_ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn dt_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms).ok_or_else(|| bad_column(idx, format!("timestamp {ms}")))
}

pub(crate) fn opt_dt_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(ms) => DateTime::from_timestamp_millis(ms)
            .map(Some)
            .ok_or_else(|| bad_column(idx, format!("timestamp {ms}"))),
        None => Ok(None),
    }
}

/// Parse a TEXT column through `FromStr`, surfacing bad values as a
/// conversion error instead of dropping the row.
pub(crate) fn parsed_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: String| bad_column(idx, e))
}

fn bad_column(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}
