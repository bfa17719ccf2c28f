use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{error::Result, store::ScheduleStore};

/// Finds schedules that are due. Read-only: ownership is taken separately by
/// the coordinator's claim, and a row returned here may already be gone by
/// the time it is claimed.
pub struct DuePoller {
    store: Arc<ScheduleStore>,
    batch_size: usize,
}

impl DuePoller {
    pub fn new(store: Arc<ScheduleStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Up to `batch_size` due, undeleted, pending schedule IDs, oldest first.
    pub fn poll(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let ids = self.store.due_ids(now, self.batch_size)?;
        if !ids.is_empty() {
            debug!(count = ids.len(), "due schedules found");
        }
        Ok(ids)
    }
}
