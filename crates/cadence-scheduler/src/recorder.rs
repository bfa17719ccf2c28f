//! Publish event recorder: the append-only attempt trail.
//!
//! [`record`] takes a `&Connection` so callers pass the open transaction of
//! the schedule update it belongs to; the event and the status change commit
//! or roll back together.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::{
    db::{dt_col, parsed_col, to_ms},
    error::Result,
    types::{AttemptOutcome, EventStatus, PublishEvent},
};

const EVENT_COLUMNS: &str = "id, schedule_id, attempt_index, status, external_post_id,
    external_url, error_code, error_message, raw_response, worker_id, attempted_at_ms";

/// Append the event for attempt `attempt_index` of `schedule_id`.
///
/// Fails with a constraint error if that attempt was already recorded.
pub fn record(
    conn: &Connection,
    schedule_id: &str,
    attempt_index: u32,
    outcome: AttemptOutcome<'_>,
    worker_id: Option<&str>,
    attempted_at: DateTime<Utc>,
) -> Result<PublishEvent> {
    let event = match outcome {
        AttemptOutcome::Success(s) => PublishEvent {
            id: Uuid::now_v7().to_string(),
            schedule_id: schedule_id.to_string(),
            attempt_index,
            status: EventStatus::Success,
            external_post_id: Some(s.external_post_id.clone()),
            external_url: s.external_url.clone(),
            error_code: None,
            error_message: None,
            raw_response: s.raw_response.clone(),
            worker_id: worker_id.map(String::from),
            attempted_at,
        },
        AttemptOutcome::Failure(f) => PublishEvent {
            id: Uuid::now_v7().to_string(),
            schedule_id: schedule_id.to_string(),
            attempt_index,
            status: EventStatus::Failed,
            external_post_id: None,
            external_url: None,
            error_code: Some(f.code.as_str().to_string()),
            error_message: Some(f.message.clone()),
            raw_response: f.raw_response.clone(),
            worker_id: worker_id.map(String::from),
            attempted_at,
        },
    };

    conn.execute(
        "INSERT INTO publish_events
         (id, schedule_id, attempt_index, status, external_post_id, external_url,
          error_code, error_message, raw_response, worker_id, attempted_at_ms)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
        params![
            event.id,
            event.schedule_id,
            event.attempt_index,
            event.status.as_str(),
            event.external_post_id,
            event.external_url,
            event.error_code,
            event.error_message,
            event.raw_response,
            event.worker_id,
            to_ms(event.attempted_at),
        ],
    )?;
    Ok(event)
}

/// All events of `schedule_id`, oldest attempt first.
pub fn list(conn: &Connection, schedule_id: &str) -> Result<Vec<PublishEvent>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {EVENT_COLUMNS} FROM publish_events
         WHERE schedule_id = ?1 ORDER BY attempt_index"
    ))?;
    let events = stmt
        .query_map([schedule_id], row_to_event)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

/// Number of recorded attempts for `schedule_id`.
#[cfg(test)]
pub(crate) fn count(conn: &Connection, schedule_id: &str) -> Result<u32> {
    let n: u32 = conn.query_row(
        "SELECT COUNT(*) FROM publish_events WHERE schedule_id = ?1",
        [schedule_id],
        |row| row.get(0),
    )?;
    Ok(n)
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<PublishEvent> {
    Ok(PublishEvent {
        id: row.get(0)?,
        schedule_id: row.get(1)?,
        attempt_index: row.get(2)?,
        status: parsed_col(row, 3)?,
        external_post_id: row.get(4)?,
        external_url: row.get(5)?,
        error_code: row.get(6)?,
        error_message: row.get(7)?,
        raw_response: row.get(8)?,
        worker_id: row.get(9)?,
        attempted_at: dt_col(row, 10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure, init_db};
    use cadence_channels::{FailureCode, PublishFailure, PublishSuccess};

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        configure(&conn).unwrap();
        init_db(&conn).unwrap();
        conn.execute(
            "INSERT INTO schedules (id, post_variant_id, channel_connection_id, run_at_ms,
                timezone, created_at_ms, updated_at_ms)
             VALUES ('s1', 'v1', 'c1', 0, 'UTC', 0, 0)",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn records_failure_then_success_in_order() {
        let conn = setup();
        let now = Utc::now();
        let failure = PublishFailure::new(FailureCode::Timeout, "slow");
        let success = PublishSuccess {
            external_post_id: "p-9".into(),
            external_url: Some("https://x.com/i/web/status/p-9".into()),
            raw_response: None,
        };

        record(&conn, "s1", 1, AttemptOutcome::Failure(&failure), Some("w1"), now).unwrap();
        record(&conn, "s1", 2, AttemptOutcome::Success(&success), Some("w1"), now).unwrap();

        let events = list(&conn, "s1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, EventStatus::Failed);
        assert_eq!(events[0].error_code.as_deref(), Some("TIMEOUT"));
        assert_eq!(events[1].status, EventStatus::Success);
        assert_eq!(events[1].external_post_id.as_deref(), Some("p-9"));
        assert_eq!(count(&conn, "s1").unwrap(), 2);
    }

    #[test]
    fn duplicate_attempt_index_is_rejected() {
        let conn = setup();
        let failure = PublishFailure::new(FailureCode::Timeout, "slow");
        let now = Utc::now();
        record(&conn, "s1", 1, AttemptOutcome::Failure(&failure), None, now).unwrap();
        assert!(record(&conn, "s1", 1, AttemptOutcome::Failure(&failure), None, now).is_err());
        assert_eq!(count(&conn, "s1").unwrap(), 1);
    }
}
