use std::sync::Arc;

use crate::{
    audit,
    clock::{Clock, SystemClock},
    error::Result,
    store::ScheduleStore,
    types::{NewSchedule, PublishEvent, Schedule, ScheduleQuery, ScheduleStatus},
};

/// Shared handle for schedule management while the engine loop runs.
///
/// Cheap to clone; HTTP handlers hold one each. Writes go through the same
/// conditional updates the engine uses, so a cancel racing a claim resolves
/// cleanly to one winner.
#[derive(Clone)]
pub struct SchedulerHandle {
    store: Arc<ScheduleStore>,
    clock: Arc<dyn Clock>,
}

impl SchedulerHandle {
    pub fn new(store: Arc<ScheduleStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn create(&self, new: NewSchedule) -> Result<Schedule> {
        self.store.create(new, self.clock.now())
    }

    pub fn cancel(&self, id: &str) -> Result<Schedule> {
        let schedule = self.store.cancel(id, self.clock.now())?;
        audit::cancelled(&schedule);
        Ok(schedule)
    }

    pub fn get(&self, id: &str) -> Result<Schedule> {
        self.store.get(id)
    }

    /// A schedule together with its attempt trail.
    pub fn get_with_events(&self, id: &str) -> Result<(Schedule, Vec<PublishEvent>)> {
        let schedule = self.store.get(id)?;
        let events = self.store.events(id)?;
        Ok((schedule, events))
    }

    pub fn events(&self, id: &str) -> Result<Vec<PublishEvent>> {
        self.store.events(id)
    }

    pub fn list(&self, query: &ScheduleQuery) -> Result<Vec<Schedule>> {
        self.store.list(query)
    }

    /// Called when a post variant is deleted.
    pub fn remove_variant(&self, variant_id: &str) -> Result<usize> {
        let n = self
            .store
            .soft_delete_for_variant(variant_id, self.clock.now())?;
        audit::variant_removed(variant_id, n);
        Ok(n)
    }

    pub fn status_counts(&self) -> Result<Vec<(ScheduleStatus, u64)>> {
        self.store.status_counts()
    }
}
