//! Structured audit trail of schedule transitions.
//!
//! Every event goes to the `cadence::audit` tracing target so it can be
//! routed to its own sink with an `EnvFilter` directive.

use tracing::info;

use crate::types::{Schedule, ScheduleStatus};

pub const AUDIT_TARGET: &str = "cadence::audit";

pub fn claimed(schedule: &Schedule, worker_id: &str) {
    info!(
        target: AUDIT_TARGET,
        schedule_id = %schedule.id,
        worker_id,
        from = %ScheduleStatus::Pending,
        to = %ScheduleStatus::Processing,
        attempt = schedule.attempt_count + 1,
        "schedule transition"
    );
}

/// A resolved attempt: `processing` to whatever `after` now holds.
pub fn resolved(after: &Schedule, worker_id: &str, event_code: Option<&str>) {
    info!(
        target: AUDIT_TARGET,
        schedule_id = %after.id,
        worker_id,
        from = %ScheduleStatus::Processing,
        to = %after.status,
        attempt = after.attempt_count,
        error_code = event_code.unwrap_or(""),
        run_at = %after.run_at,
        "schedule transition"
    );
}

pub fn cancelled(schedule: &Schedule) {
    info!(
        target: AUDIT_TARGET,
        schedule_id = %schedule.id,
        from = %ScheduleStatus::Pending,
        to = %ScheduleStatus::Cancelled,
        "schedule transition"
    );
}

pub fn variant_removed(variant_id: &str, count: usize) {
    info!(
        target: AUDIT_TARGET,
        variant_id,
        count,
        "schedules soft-deleted"
    );
}
