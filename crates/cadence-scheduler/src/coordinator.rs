use std::sync::Arc;
use std::time::Duration;

use cadence_channels::{
    FailureCode, PublishFailure, PublishRequest, PublishResult, PublisherRegistry,
};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    audit,
    clock::{Clock, SystemClock},
    collab::{ChannelCatalog, ConnectionStore, VariantStore},
    error::{Result, SchedulerError},
    retry::RetryPolicy,
    store::ScheduleStore,
    types::{ClaimedSchedule, Resolution, Schedule},
};

const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(300);
/// Stale leases reclaimed per call to [`ExecutionCoordinator::reclaim_stale`].
const RECLAIM_BATCH: usize = 100;

/// Result of [`ExecutionCoordinator::process`].
#[derive(Debug, Clone)]
pub enum Processed {
    /// Another worker claimed the schedule first, or it stopped being pending.
    ClaimConflict,
    /// The attempt ran and the schedule was settled.
    Resolved(Schedule),
}

/// Drives one schedule through claim, publish and resolution.
pub struct ExecutionCoordinator {
    store: Arc<ScheduleStore>,
    variants: Arc<dyn VariantStore>,
    connections: Arc<dyn ConnectionStore>,
    catalog: Arc<dyn ChannelCatalog>,
    publishers: PublisherRegistry,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    worker_id: String,
    publish_timeout: Duration,
    lease_timeout: Duration,
}

impl ExecutionCoordinator {
    pub fn new(
        store: Arc<ScheduleStore>,
        variants: Arc<dyn VariantStore>,
        connections: Arc<dyn ConnectionStore>,
        catalog: Arc<dyn ChannelCatalog>,
        publishers: PublisherRegistry,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            variants,
            connections,
            catalog,
            publishers,
            policy,
            clock: Arc::new(SystemClock),
            worker_id: format!("worker-{}", Uuid::new_v4().simple()),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_lease_timeout(mut self, timeout: Duration) -> Self {
        self.lease_timeout = timeout;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn store(&self) -> &Arc<ScheduleStore> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Take the execution lease on a due schedule. `None` if the race was lost.
    pub fn claim(&self, schedule_id: &str) -> Result<Option<ClaimedSchedule>> {
        let claimed = self.store.claim(schedule_id, &self.worker_id, self.now())?;
        if let Some(ref c) = claimed {
            audit::claimed(&c.schedule, &self.worker_id);
        }
        Ok(claimed)
    }

    /// Claim then execute. A lost claim is not an error.
    pub async fn process(&self, schedule_id: &str) -> Result<Processed> {
        match self.claim(schedule_id)? {
            Some(claimed) => Ok(Processed::Resolved(self.execute(claimed).await?)),
            None => Ok(Processed::ClaimConflict),
        }
    }

    /// Run one publish attempt for a schedule this worker holds, then record
    /// the attempt and settle the schedule under the lease.
    pub async fn execute(&self, claimed: ClaimedSchedule) -> Result<Schedule> {
        let ClaimedSchedule {
            schedule,
            lease_token,
        } = claimed;

        let result = self.attempt(&schedule).await;
        let now = self.now();
        let resolution = self.decide(&schedule, result, now);

        let (after, event) = match self.store.resolve(
            &schedule.id,
            &lease_token,
            &resolution,
            Some(&self.worker_id),
            now,
        ) {
            Ok(settled) => settled,
            Err(e) => {
                if let Resolution::Published(ref success) = resolution {
                    error!(
                        schedule_id = %schedule.id,
                        external_post_id = %success.external_post_id,
                        error = %e,
                        "published remotely but the store update failed; row stays processing until its lease expires"
                    );
                }
                return Err(e);
            }
        };
        audit::resolved(&after, &self.worker_id, event.error_code.as_deref());

        match resolution {
            Resolution::Published(success) => {
                info!(
                    schedule_id = %after.id,
                    external_post_id = %success.external_post_id,
                    attempt = after.attempt_count,
                    "schedule published"
                );
                if let Err(e) = self
                    .variants
                    .mark_published(&after.post_variant_id, now)
                    .await
                {
                    warn!(
                        schedule_id = %after.id,
                        variant_id = %after.post_variant_id,
                        error = %e,
                        "failed to mark variant published"
                    );
                }
            }
            Resolution::Retry { failure, run_at } => {
                info!(
                    schedule_id = %after.id,
                    attempt = after.attempt_count,
                    code = %failure.code,
                    %run_at,
                    "attempt failed; retry scheduled"
                );
            }
            Resolution::Failed { failure, exhausted } => {
                warn!(
                    schedule_id = %after.id,
                    attempt = after.attempt_count,
                    code = %failure.code,
                    exhausted,
                    "schedule failed"
                );
            }
        }
        Ok(after)
    }

    /// Map an attempt's outcome to the schedule's next state.
    pub fn decide(&self, schedule: &Schedule, result: PublishResult, now: DateTime<Utc>) -> Resolution {
        let failure = match result {
            PublishResult::Success(success) => return Resolution::Published(success),
            PublishResult::Failure(failure) => failure,
        };
        let attempt = schedule.attempt_count + 1;
        match self
            .policy
            .next_delay(attempt, failure.class, failure.retry_after)
        {
            Some(delay) => {
                let run_at = chrono::Duration::from_std(delay)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                Resolution::Retry { failure, run_at }
            }
            None => {
                let exhausted = failure.is_retryable();
                Resolution::Failed { failure, exhausted }
            }
        }
    }

    /// Settle `processing` rows whose lease outlived `lease_timeout` as a
    /// transient `LEASE_EXPIRED` failure. Returns how many were reclaimed.
    pub async fn reclaim_stale(&self) -> Result<usize> {
        let now = self.now();
        let lease = chrono::Duration::from_std(self.lease_timeout).unwrap_or(chrono::Duration::MAX);
        let cutoff = now
            .checked_sub_signed(lease)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let stale = self.store.stale(cutoff, RECLAIM_BATCH)?;

        let mut reclaimed = 0;
        for claimed in stale {
            let schedule = &claimed.schedule;
            let failure = PublishFailure::transient(
                FailureCode::LeaseExpired,
                format!(
                    "lease held by {} expired after {}s",
                    schedule.lease_owner.as_deref().unwrap_or("unknown"),
                    self.lease_timeout.as_secs()
                ),
            );
            let resolution = self.decide(schedule, PublishResult::Failure(failure), now);
            match self.store.resolve(
                &schedule.id,
                &claimed.lease_token,
                &resolution,
                Some(&self.worker_id),
                now,
            ) {
                Ok((after, event)) => {
                    warn!(
                        schedule_id = %after.id,
                        previous_owner = schedule.lease_owner.as_deref().unwrap_or(""),
                        status = %after.status,
                        "stale lease reclaimed"
                    );
                    audit::resolved(&after, &self.worker_id, event.error_code.as_deref());
                    reclaimed += 1;
                }
                Err(SchedulerError::LeaseLost { id }) => {
                    debug!(schedule_id = %id, "stale lease resolved elsewhere");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(reclaimed)
    }

    /// Gather collaborators and call the adapter. Never fails: every problem
    /// becomes a classified [`PublishFailure`].
    async fn attempt(&self, schedule: &Schedule) -> PublishResult {
        let connection = match self
            .connections
            .get_connection(&schedule.channel_connection_id)
            .await
        {
            Ok(Some(c)) if c.is_usable() => c,
            Ok(Some(c)) => {
                return PublishFailure::permanent(
                    FailureCode::ConnectionUnavailable,
                    format!("connection {} is {}", c.id, c.status),
                )
                .into()
            }
            Ok(None) => {
                return PublishFailure::permanent(
                    FailureCode::ConnectionUnavailable,
                    format!("connection {} not found", schedule.channel_connection_id),
                )
                .into()
            }
            Err(e) => return collaborator_failure("connection store", e),
        };

        let content = match self.variants.get_variant(&schedule.post_variant_id).await {
            Ok(Some(v)) => v,
            Ok(None) => {
                return PublishFailure::permanent(
                    FailureCode::VariantNotFound,
                    format!("post variant {} not found", schedule.post_variant_id),
                )
                .into()
            }
            Err(e) => return collaborator_failure("variant store", e),
        };

        let Some(publisher) = self.publishers.get(connection.channel_type) else {
            return PublishFailure::permanent(
                FailureCode::AdapterNotRegistered,
                format!("no publisher registered for {}", connection.channel_type),
            )
            .into();
        };

        let request = PublishRequest {
            content,
            limits: self.catalog.get_limits(connection.channel_type),
            idempotency_key: schedule.id.clone(),
        };
        debug!(
            schedule_id = %schedule.id,
            channel = %connection.channel_type,
            attempt = schedule.attempt_count + 1,
            "publishing"
        );
        match tokio::time::timeout(self.publish_timeout, publisher.publish(&request, &connection))
            .await
        {
            Ok(result) => result,
            Err(_) => PublishFailure::transient(
                FailureCode::Timeout,
                format!(
                    "publish did not complete within {}s",
                    self.publish_timeout.as_secs_f64()
                ),
            )
            .into(),
        }
    }
}

fn collaborator_failure(which: &str, e: cadence_core::CadenceError) -> PublishResult {
    warn!(error = %e, "{which} unavailable");
    PublishFailure::transient(
        FailureCode::CollaboratorUnavailable,
        format!("{which} unavailable: {e}"),
    )
    .into()
}
