use std::sync::Arc;
use std::time::Duration;

use cadence_core::config::SchedulerConfig;
use futures_util::{stream, StreamExt};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::{
    coordinator::{ExecutionCoordinator, Processed},
    error::Result,
    poller::DuePoller,
    types::ScheduleStatus,
};

/// Tally of one engine tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub reclaimed: usize,
    pub due: usize,
    pub conflicts: usize,
    pub published: usize,
    pub retried: usize,
    pub failed: usize,
    /// Schedules whose processing hit a store error; retried on a later tick.
    pub errors: usize,
}

/// Polling loop: reclaim stale leases, fetch due schedules, process them with
/// bounded concurrency, repeat every `poll_interval`.
pub struct SchedulerEngine {
    coordinator: Arc<ExecutionCoordinator>,
    poller: DuePoller,
    poll_interval: Duration,
    max_concurrency: usize,
}

impl SchedulerEngine {
    pub fn new(coordinator: Arc<ExecutionCoordinator>, cfg: &SchedulerConfig) -> Self {
        let poller = DuePoller::new(coordinator.store().clone(), cfg.batch_size);
        Self {
            coordinator,
            poller,
            poll_interval: Duration::from_secs(cfg.poll_interval_secs.max(1)),
            max_concurrency: cfg.max_concurrent_publishes.max(1),
        }
    }

    /// Main event loop. Ticks every `poll_interval` until `shutdown` broadcasts `true`.
    ///
    /// A tick in progress is finished before shutdown is observed, so no
    /// claimed schedule is abandoned mid-attempt.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            worker_id = self.coordinator.worker_id(),
            interval_secs = self.poll_interval.as_secs(),
            "scheduler engine started"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(report) if report != CycleReport::default() => {
                            info!(?report, "scheduler tick");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "scheduler tick error"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One cycle. Only a failing poll fails the tick; per-schedule errors are
    /// logged and counted.
    pub async fn tick(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        match self.coordinator.reclaim_stale().await {
            Ok(n) => report.reclaimed = n,
            Err(e) => error!(error = %e, "stale lease reclaim failed"),
        }

        let ids = self.poller.poll(self.coordinator.now())?;
        report.due = ids.len();

        let outcomes: Vec<_> = stream::iter(ids)
            .map(|id| {
                let coordinator = self.coordinator.clone();
                async move {
                    let outcome = coordinator.process(&id).await;
                    (id, outcome)
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        for (id, outcome) in outcomes {
            match outcome {
                Ok(Processed::ClaimConflict) => report.conflicts += 1,
                Ok(Processed::Resolved(s)) => match s.status {
                    ScheduleStatus::Published => report.published += 1,
                    ScheduleStatus::Pending => report.retried += 1,
                    _ => report.failed += 1,
                },
                Err(e) => {
                    warn!(schedule_id = %id, error = %e, "schedule processing error");
                    report.errors += 1;
                }
            }
        }
        Ok(report)
    }
}
