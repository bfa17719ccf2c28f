use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use cadence_channels::FailureCode;
use chrono::{DateTime, Utc};
use rusqlite::{
    params, params_from_iter, types::Value, Connection, OptionalExtension, Row,
    TransactionBehavior,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    db::{configure, dt_col, init_db, opt_dt_col, parsed_col, to_ms},
    error::{Result, SchedulerError},
    recorder,
    types::{
        ClaimedSchedule, NewSchedule, PublishEvent, Resolution, Schedule, ScheduleQuery,
        ScheduleStatus,
    },
};

/// Hard cap on rows returned by [`ScheduleStore::list`].
const MAX_LIST_LIMIT: usize = 500;

const SCHEDULE_COLUMNS: &str = "id, post_variant_id, channel_connection_id, run_at_ms, timezone,
    status, attempt_count, last_attempt_at_ms, error_code, error_message,
    processing_started_at_ms, lease_owner, published_at_ms, created_by,
    created_at_ms, updated_at_ms, deleted_at_ms, lease_token";

/// Durable schedule records backed by SQLite.
///
/// Every status mutation is a conditional UPDATE keyed on the expected prior
/// status (and, once claimed, on the lease token), so several stores over the
/// same database file, in one process or many, can race safely.
pub struct ScheduleStore {
    conn: Mutex<Connection>,
}

impl ScheduleStore {
    /// Wrap `conn`, applying connection settings and the schema.
    pub fn new(conn: Connection) -> Result<Self> {
        configure(&conn)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SchedulerError::LockPoisoned)
    }

    /// Insert a new `pending` schedule.
    pub fn create(&self, new: NewSchedule, now: DateTime<Utc>) -> Result<Schedule> {
        if new.post_variant_id.trim().is_empty() {
            return Err(SchedulerError::InvalidSchedule(
                "post_variant_id is required".into(),
            ));
        }
        if new.channel_connection_id.trim().is_empty() {
            return Err(SchedulerError::InvalidSchedule(
                "channel_connection_id is required".into(),
            ));
        }
        chrono_tz::Tz::from_str(&new.timezone).map_err(|_| {
            SchedulerError::InvalidSchedule(format!("unknown timezone: {}", new.timezone))
        })?;

        let id = Uuid::now_v7().to_string();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO schedules
             (id, post_variant_id, channel_connection_id, run_at_ms, timezone, status,
              attempt_count, created_by, created_at_ms, updated_at_ms)
             VALUES (?1,?2,?3,?4,?5,'pending',0,?6,?7,?7)",
            params![
                id,
                new.post_variant_id,
                new.channel_connection_id,
                to_ms(new.run_at),
                new.timezone,
                new.created_by,
                to_ms(now),
            ],
        )?;
        info!(schedule_id = %id, variant_id = %new.post_variant_id, run_at = %new.run_at, "schedule created");
        fetch(&conn, &id)
    }

    pub fn get(&self, id: &str) -> Result<Schedule> {
        let conn = self.conn()?;
        fetch(&conn, id)
    }

    /// IDs of pending schedules due at `now`, oldest `run_at` first.
    pub fn due_ids(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id FROM schedules
             WHERE status = 'pending' AND deleted_at_ms IS NULL AND run_at_ms <= ?1
             ORDER BY run_at_ms, id
             LIMIT ?2",
        )?;
        let ids = stmt
            .query_map(params![to_ms(now), limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Atomically move a due schedule from `pending` to `processing`.
    ///
    /// Returns `None` when the row is no longer pending or not yet due: another
    /// worker won the race, or the user cancelled it in between.
    pub fn claim(
        &self,
        id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ClaimedSchedule>> {
        let token = Uuid::new_v4().to_string();
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE schedules
             SET status = 'processing', processing_started_at_ms = ?1,
                 lease_owner = ?2, lease_token = ?3, updated_at_ms = ?1
             WHERE id = ?4 AND status = 'pending' AND deleted_at_ms IS NULL
               AND run_at_ms <= ?1",
            params![to_ms(now), worker_id, token, id],
        )?;
        if n == 0 {
            debug!(schedule_id = %id, worker_id, "claim lost");
            return Ok(None);
        }
        let schedule = fetch(&conn, id)?;
        Ok(Some(ClaimedSchedule {
            schedule,
            lease_token: token,
        }))
    }

    /// `processing` rows whose lease started before `cutoff`.
    pub fn stale(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<ClaimedSchedule>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules
             WHERE status = 'processing' AND processing_started_at_ms < ?1
             ORDER BY processing_started_at_ms
             LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![to_ms(cutoff), limit as i64], |row| {
                let schedule = row_to_schedule(row)?;
                let token: Option<String> = row.get(17)?;
                Ok(ClaimedSchedule {
                    schedule,
                    lease_token: token.unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Settle a claimed schedule: append the attempt's publish event and apply
    /// the status change in one transaction.
    ///
    /// Fails with [`SchedulerError::LeaseLost`] if the row is no longer held
    /// under `lease_token`; nothing is written in that case.
    pub fn resolve(
        &self,
        schedule_id: &str,
        lease_token: &str,
        resolution: &Resolution,
        worker_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(Schedule, PublishEvent)> {
        let mut conn = self.conn()?;
        // Take the write lock up front: a deferred read-then-write upgrade
        // fails with SQLITE_BUSY without waiting on the busy timeout.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<(String, u32, Option<String>)> = tx
            .query_row(
                "SELECT status, attempt_count, lease_token FROM schedules WHERE id = ?1",
                [schedule_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((status, attempt_count, token)) = current else {
            return Err(SchedulerError::NotFound {
                id: schedule_id.to_string(),
            });
        };
        if status != ScheduleStatus::Processing.as_str() || token.as_deref() != Some(lease_token)
        {
            return Err(SchedulerError::LeaseLost {
                id: schedule_id.to_string(),
            });
        }

        let attempt = attempt_count + 1;
        let event = recorder::record(
            &tx,
            schedule_id,
            attempt,
            resolution.outcome(),
            worker_id,
            now,
        )?;

        let now_ms = to_ms(now);
        let n = match resolution {
            Resolution::Published(_) => tx.execute(
                "UPDATE schedules
                 SET status = 'published', attempt_count = ?1, published_at_ms = ?2,
                     last_attempt_at_ms = NULL, error_code = NULL, error_message = NULL,
                     processing_started_at_ms = NULL, lease_owner = NULL, lease_token = NULL,
                     updated_at_ms = ?2
                 WHERE id = ?3 AND lease_token = ?4",
                params![attempt, now_ms, schedule_id, lease_token],
            )?,
            Resolution::Retry { failure, run_at } => tx.execute(
                "UPDATE schedules
                 SET status = 'pending', attempt_count = ?1, run_at_ms = ?2,
                     last_attempt_at_ms = ?3, error_code = ?4, error_message = ?5,
                     processing_started_at_ms = NULL, lease_owner = NULL, lease_token = NULL,
                     updated_at_ms = ?3
                 WHERE id = ?6 AND lease_token = ?7",
                params![
                    attempt,
                    to_ms(*run_at),
                    now_ms,
                    failure.code.as_str(),
                    failure.message,
                    schedule_id,
                    lease_token
                ],
            )?,
            Resolution::Failed { failure, exhausted } => {
                let (code, message) = if *exhausted {
                    (
                        FailureCode::RetryExhausted.as_str(),
                        format!(
                            "retries exhausted after {attempt} attempts; last error {}: {}",
                            failure.code, failure.message
                        ),
                    )
                } else {
                    (failure.code.as_str(), failure.message.clone())
                };
                tx.execute(
                    "UPDATE schedules
                     SET status = 'failed', attempt_count = ?1,
                         last_attempt_at_ms = ?2, error_code = ?3, error_message = ?4,
                         processing_started_at_ms = NULL, lease_owner = NULL, lease_token = NULL,
                         updated_at_ms = ?2
                     WHERE id = ?5 AND lease_token = ?6",
                    params![attempt, now_ms, code, message, schedule_id, lease_token],
                )?
            }
        };
        if n != 1 {
            return Err(SchedulerError::LeaseLost {
                id: schedule_id.to_string(),
            });
        }

        let schedule = fetch(&tx, schedule_id)?;
        tx.commit()?;
        Ok((schedule, event))
    }

    /// Cancel a pending schedule. Any other status is rejected.
    pub fn cancel(&self, id: &str, now: DateTime<Utc>) -> Result<Schedule> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE schedules SET status = 'cancelled', updated_at_ms = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![to_ms(now), id],
        )?;
        let schedule = fetch(&conn, id)?;
        if n == 0 {
            return Err(SchedulerError::InvalidTransition {
                id: id.to_string(),
                from: schedule.status,
                to: ScheduleStatus::Cancelled,
            });
        }
        info!(schedule_id = %id, "schedule cancelled");
        Ok(schedule)
    }

    /// Soft-delete every schedule of a removed variant. Pending ones are
    /// cancelled so they never publish. Returns the number of rows marked.
    pub fn soft_delete_for_variant(&self, variant_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now_ms = to_ms(now);
        tx.execute(
            "UPDATE schedules SET status = 'cancelled', updated_at_ms = ?1
             WHERE post_variant_id = ?2 AND status = 'pending' AND deleted_at_ms IS NULL",
            params![now_ms, variant_id],
        )?;
        let n = tx.execute(
            "UPDATE schedules SET deleted_at_ms = ?1, updated_at_ms = ?1
             WHERE post_variant_id = ?2 AND deleted_at_ms IS NULL",
            params![now_ms, variant_id],
        )?;
        tx.commit()?;
        info!(variant_id, count = n, "schedules soft-deleted with variant");
        Ok(n)
    }

    /// Schedules matching `query`, ordered by `run_at`.
    pub fn list(&self, query: &ScheduleQuery) -> Result<Vec<Schedule>> {
        let mut sql = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE 1 = 1");
        let mut args: Vec<Value> = Vec::new();

        if !query.include_deleted {
            sql.push_str(" AND deleted_at_ms IS NULL");
        }
        if let Some(status) = query.status {
            args.push(Value::Text(status.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(from) = query.from {
            args.push(Value::Integer(to_ms(from)));
            sql.push_str(&format!(" AND run_at_ms >= ?{}", args.len()));
        }
        if let Some(to) = query.to {
            args.push(Value::Integer(to_ms(to)));
            sql.push_str(&format!(" AND run_at_ms < ?{}", args.len()));
        }
        if let Some(ref principal) = query.principal {
            args.push(Value::Text(principal.clone()));
            sql.push_str(&format!(" AND created_by = ?{}", args.len()));
        }
        if let Some(ref variant) = query.post_variant_id {
            args.push(Value::Text(variant.clone()));
            sql.push_str(&format!(" AND post_variant_id = ?{}", args.len()));
        }
        let limit = query.limit.unwrap_or(100).min(MAX_LIST_LIMIT);
        args.push(Value::Integer(limit as i64));
        sql.push_str(&format!(" ORDER BY run_at_ms, id LIMIT ?{}", args.len()));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let schedules = stmt
            .query_map(params_from_iter(args), row_to_schedule)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(schedules)
    }

    /// Attempt trail of one schedule.
    pub fn events(&self, schedule_id: &str) -> Result<Vec<PublishEvent>> {
        let conn = self.conn()?;
        fetch(&conn, schedule_id)?;
        recorder::list(&conn, schedule_id)
    }

    /// Row counts per status, excluding soft-deleted rows.
    pub fn status_counts(&self) -> Result<Vec<(ScheduleStatus, u64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT status, COUNT(*) FROM schedules
             WHERE deleted_at_ms IS NULL GROUP BY status ORDER BY status",
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok((parsed_col(row, 0)?, row.get::<_, i64>(1)?.max(0) as u64))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }
}

fn fetch(conn: &Connection, id: &str) -> Result<Schedule> {
    conn.query_row(
        &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"),
        [id],
        row_to_schedule,
    )
    .optional()?
    .ok_or_else(|| SchedulerError::NotFound { id: id.to_string() })
}

fn row_to_schedule(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    Ok(Schedule {
        id: row.get(0)?,
        post_variant_id: row.get(1)?,
        channel_connection_id: row.get(2)?,
        run_at: dt_col(row, 3)?,
        timezone: row.get(4)?,
        status: parsed_col(row, 5)?,
        attempt_count: row.get(6)?,
        last_attempt_at: opt_dt_col(row, 7)?,
        error_code: row.get(8)?,
        error_message: row.get(9)?,
        processing_started_at: opt_dt_col(row, 10)?,
        lease_owner: row.get(11)?,
        published_at: opt_dt_col(row, 12)?,
        created_by: row.get(13)?,
        created_at: dt_col(row, 14)?,
        updated_at: dt_col(row, 15)?,
        deleted_at: opt_dt_col(row, 16)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_channels::{PublishFailure, PublishSuccess};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn store() -> ScheduleStore {
        ScheduleStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn new_schedule(run_at: DateTime<Utc>) -> NewSchedule {
        NewSchedule {
            post_variant_id: "var-1".into(),
            channel_connection_id: "conn-1".into(),
            run_at,
            timezone: "Europe/Berlin".into(),
            created_by: Some("user-7".into()),
        }
    }

    #[test]
    fn create_rejects_unknown_timezone() {
        let s = store();
        let mut new = new_schedule(t0());
        new.timezone = "Mars/Olympus_Mons".into();
        assert!(matches!(
            s.create(new, t0()),
            Err(SchedulerError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn due_ids_are_oldest_first_and_bounded() {
        let s = store();
        let late = s.create(new_schedule(t0()), t0()).unwrap();
        let early = s
            .create(new_schedule(t0() - Duration::minutes(10)), t0())
            .unwrap();
        s.create(new_schedule(t0() + Duration::hours(1)), t0())
            .unwrap();

        assert_eq!(s.due_ids(t0(), 10).unwrap(), vec![early.id.clone(), late.id]);
        assert_eq!(s.due_ids(t0(), 1).unwrap(), vec![early.id]);
    }

    #[test]
    fn second_claim_loses() {
        let s = store();
        let sched = s.create(new_schedule(t0()), t0()).unwrap();
        let claimed = s.claim(&sched.id, "w1", t0()).unwrap().expect("first claim");
        assert_eq!(claimed.schedule.status, ScheduleStatus::Processing);
        assert_eq!(claimed.schedule.lease_owner.as_deref(), Some("w1"));
        assert!(s.claim(&sched.id, "w2", t0()).unwrap().is_none());
    }

    #[test]
    fn claim_refuses_rows_not_yet_due() {
        let s = store();
        let sched = s
            .create(new_schedule(t0() + Duration::minutes(5)), t0())
            .unwrap();
        assert!(s.claim(&sched.id, "w1", t0()).unwrap().is_none());
    }

    #[test]
    fn resolve_with_wrong_token_writes_nothing() {
        let s = store();
        let sched = s.create(new_schedule(t0()), t0()).unwrap();
        s.claim(&sched.id, "w1", t0()).unwrap().unwrap();
        let res = Resolution::Published(PublishSuccess {
            external_post_id: "1".into(),
            external_url: None,
            raw_response: None,
        });
        let err = s
            .resolve(&sched.id, "not-the-token", &res, Some("w1"), t0())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::LeaseLost { .. }));
        assert!(s.events(&sched.id).unwrap().is_empty());
        assert_eq!(s.get(&sched.id).unwrap().attempt_count, 0);
    }

    #[test]
    fn exhausted_failure_keeps_last_error_in_message() {
        let s = store();
        let sched = s.create(new_schedule(t0()), t0()).unwrap();
        let claimed = s.claim(&sched.id, "w1", t0()).unwrap().unwrap();
        let res = Resolution::Failed {
            failure: PublishFailure::new(FailureCode::Timeout, "publish timed out"),
            exhausted: true,
        };
        let (after, event) = s
            .resolve(&sched.id, &claimed.lease_token, &res, Some("w1"), t0())
            .unwrap();
        assert_eq!(after.status, ScheduleStatus::Failed);
        assert_eq!(after.error_code.as_deref(), Some("RETRY_EXHAUSTED"));
        assert!(after.error_message.unwrap().contains("TIMEOUT"));
        assert_eq!(event.error_code.as_deref(), Some("TIMEOUT"));
        assert!(after.lease_owner.is_none());
    }

    #[test]
    fn cancel_only_from_pending() {
        let s = store();
        let a = s.create(new_schedule(t0()), t0()).unwrap();
        let cancelled = s.cancel(&a.id, t0()).unwrap();
        assert_eq!(cancelled.status, ScheduleStatus::Cancelled);

        let b = s.create(new_schedule(t0()), t0()).unwrap();
        s.claim(&b.id, "w1", t0()).unwrap().unwrap();
        match s.cancel(&b.id, t0()) {
            Err(SchedulerError::InvalidTransition { from, .. }) => {
                assert_eq!(from, ScheduleStatus::Processing)
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }

        assert!(matches!(
            s.cancel("missing", t0()),
            Err(SchedulerError::NotFound { .. })
        ));
    }

    #[test]
    fn soft_delete_hides_rows_and_cancels_pending() {
        let s = store();
        let a = s.create(new_schedule(t0()), t0()).unwrap();
        assert_eq!(s.soft_delete_for_variant("var-1", t0()).unwrap(), 1);

        assert!(s.due_ids(t0(), 10).unwrap().is_empty());
        assert!(s.list(&ScheduleQuery::default()).unwrap().is_empty());

        let all = s
            .list(&ScheduleQuery {
                include_deleted: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, a.id);
        assert_eq!(all[0].status, ScheduleStatus::Cancelled);
        assert!(all[0].deleted_at.is_some());
    }

    #[test]
    fn list_filters_by_status_range_and_principal() {
        let s = store();
        let a = s.create(new_schedule(t0()), t0()).unwrap();
        let mut other = new_schedule(t0() + Duration::days(2));
        other.created_by = Some("user-8".into());
        s.create(other, t0()).unwrap();
        s.cancel(&a.id, t0()).unwrap();

        let by_principal = s
            .list(&ScheduleQuery {
                principal: Some("user-8".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_principal.len(), 1);

        let cancelled = s
            .list(&ScheduleQuery {
                status: Some(ScheduleStatus::Cancelled),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, a.id);

        let window = s
            .list(&ScheduleQuery {
                from: Some(t0() + Duration::days(1)),
                to: Some(t0() + Duration::days(3)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].created_by.as_deref(), Some("user-8"));
    }

    #[test]
    fn stale_returns_old_leases_with_token() {
        let s = store();
        let sched = s.create(new_schedule(t0()), t0()).unwrap();
        let claimed = s.claim(&sched.id, "w1", t0()).unwrap().unwrap();

        assert!(s.stale(t0(), 10).unwrap().is_empty());
        let stale = s.stale(t0() + Duration::minutes(1), 10).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].lease_token, claimed.lease_token);
    }

    #[test]
    fn status_counts_group_rows() {
        let s = store();
        s.create(new_schedule(t0()), t0()).unwrap();
        let b = s.create(new_schedule(t0()), t0()).unwrap();
        s.cancel(&b.id, t0()).unwrap();
        let counts = s.status_counts().unwrap();
        assert!(counts.contains(&(ScheduleStatus::Pending, 1)));
        assert!(counts.contains(&(ScheduleStatus::Cancelled, 1)));
    }
}
