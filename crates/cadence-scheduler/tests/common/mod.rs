//! In-memory collaborators and a scripted publisher for scenario tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cadence_channels::{
    ErrorClass, FailureCode, PublishFailure, PublishRequest, PublishResult, PublishSuccess,
    Publisher, PublisherRegistry,
};
use cadence_core::{
    CadenceError, ChannelConnection, ChannelType, ConnectionCredentials, ConnectionStatus,
    VariantContent,
};
use cadence_scheduler::{
    Clock, ConnectionStore, DefaultCatalog, ExecutionCoordinator, ManualClock, NewSchedule,
    RetryPolicy, Schedule, ScheduleStore, SchedulerHandle, VariantStore,
};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()
}

#[derive(Default)]
pub struct MemoryVariants {
    variants: Mutex<HashMap<String, VariantContent>>,
    pub published: Mutex<Vec<String>>,
    pub fail_mark: AtomicBool,
}

impl MemoryVariants {
    pub fn insert(&self, id: &str, text: &str) {
        self.variants.lock().unwrap().insert(
            id.to_string(),
            VariantContent {
                variant_id: id.to_string(),
                text: text.to_string(),
                media: vec![],
            },
        );
    }
}

#[async_trait]
impl VariantStore for MemoryVariants {
    async fn get_variant(&self, variant_id: &str) -> cadence_core::Result<Option<VariantContent>> {
        Ok(self.variants.lock().unwrap().get(variant_id).cloned())
    }

    async fn mark_published(&self, variant_id: &str, _at: DateTime<Utc>) -> cadence_core::Result<()> {
        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(CadenceError::Database("variants table locked".into()));
        }
        self.published.lock().unwrap().push(variant_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryConnections {
    connections: Mutex<HashMap<String, ChannelConnection>>,
    pub outage: AtomicBool,
}

impl MemoryConnections {
    pub fn insert(&self, id: &str, channel_type: ChannelType, status: ConnectionStatus) {
        self.connections.lock().unwrap().insert(
            id.to_string(),
            ChannelConnection {
                id: id.to_string(),
                channel_type,
                status,
                credentials: ConnectionCredentials {
                    access_token: "token".into(),
                    base_url: None,
                },
            },
        );
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnections {
    async fn get_connection(
        &self,
        connection_id: &str,
    ) -> cadence_core::Result<Option<ChannelConnection>> {
        if self.outage.load(Ordering::SeqCst) {
            return Err(CadenceError::Database("connection store offline".into()));
        }
        Ok(self.connections.lock().unwrap().get(connection_id).cloned())
    }
}

/// Publisher whose results are scripted per variant. Once a variant's
/// script runs out every further attempt succeeds.
#[derive(Default)]
pub struct ScriptedPublisher {
    scripts: Mutex<HashMap<String, VecDeque<PublishResult>>>,
    pub calls: AtomicUsize,
    pub idempotency_keys: Mutex<Vec<String>>,
    /// Sleep before answering, to trip the publish timeout.
    pub delay: Mutex<Option<Duration>>,
}

impl ScriptedPublisher {
    pub fn script(&self, variant_id: &str, results: Vec<PublishResult>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(variant_id.to_string(), results.into());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    fn channel_type(&self) -> ChannelType {
        ChannelType::X
    }

    async fn publish(&self, request: &PublishRequest, _conn: &ChannelConnection) -> PublishResult {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.idempotency_keys
            .lock()
            .unwrap()
            .push(request.idempotency_key.clone());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.content.variant_id)
            .and_then(|q| q.pop_front());
        next.unwrap_or_else(|| {
            PublishResult::Success(PublishSuccess {
                external_post_id: format!("post-{n}"),
                external_url: Some(format!("https://x.com/i/web/status/post-{n}")),
                raw_response: None,
            })
        })
    }
}

pub fn transient(code: FailureCode) -> PublishResult {
    PublishResult::Failure(PublishFailure::new(code, "scripted failure"))
}

pub fn permanent(code: FailureCode) -> PublishResult {
    let f = PublishFailure::permanent(code, "scripted failure");
    assert_eq!(f.class, ErrorClass::Permanent);
    PublishResult::Failure(f)
}

pub struct Harness {
    pub store: Arc<ScheduleStore>,
    pub clock: Arc<ManualClock>,
    pub variants: Arc<MemoryVariants>,
    pub connections: Arc<MemoryConnections>,
    pub publisher: Arc<ScriptedPublisher>,
    pub coordinator: Arc<ExecutionCoordinator>,
    pub handle: SchedulerHandle,
}

impl Harness {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_timeouts(policy, Duration::from_secs(5), Duration::from_secs(300))
    }

    pub fn with_timeouts(policy: RetryPolicy, publish: Duration, lease: Duration) -> Self {
        Self::build(Connection::open_in_memory().unwrap(), policy, publish, lease)
    }

    /// Harness over a database file, so tests can open side connections to it.
    pub fn on_file(policy: RetryPolicy, path: &Path) -> Self {
        Self::build(
            Connection::open(path).unwrap(),
            policy,
            Duration::from_secs(5),
            Duration::from_secs(300),
        )
    }

    fn build(conn: Connection, policy: RetryPolicy, publish: Duration, lease: Duration) -> Self {
        let store = Arc::new(ScheduleStore::new(conn).unwrap());
        let clock = Arc::new(ManualClock::new(t0()));
        let variants = Arc::new(MemoryVariants::default());
        let connections = Arc::new(MemoryConnections::default());
        let publisher = Arc::new(ScriptedPublisher::default());

        variants.insert("var-1", "hello from cadence");
        connections.insert("conn-x", ChannelType::X, ConnectionStatus::Connected);

        let mut registry = PublisherRegistry::new();
        registry.register(publisher.clone());

        let coordinator = Arc::new(
            ExecutionCoordinator::new(
                store.clone(),
                variants.clone(),
                connections.clone(),
                Arc::new(DefaultCatalog),
                registry,
                policy,
            )
            .with_clock(clock.clone())
            .with_worker_id("worker-test")
            .with_publish_timeout(publish)
            .with_lease_timeout(lease),
        );
        let handle = SchedulerHandle::new(store.clone()).with_clock(clock.clone());

        Self {
            store,
            clock,
            variants,
            connections,
            publisher,
            coordinator,
            handle,
        }
    }

    /// A schedule for `variant_id` on `conn-x`, due now.
    pub fn schedule(&self, variant_id: &str) -> Schedule {
        self.schedule_on(variant_id, "conn-x")
    }

    pub fn schedule_on(&self, variant_id: &str, connection_id: &str) -> Schedule {
        self.handle
            .create(NewSchedule {
                post_variant_id: variant_id.into(),
                channel_connection_id: connection_id.into(),
                run_at: self.clock.now(),
                timezone: "America/New_York".into(),
                created_by: Some("user-1".into()),
            })
            .unwrap()
    }

    /// `attempt_count` must always equal the number of recorded events.
    pub fn assert_counts_match(&self, id: &str) {
        let schedule = self.store.get(id).unwrap();
        let events = self.store.events(id).unwrap();
        assert_eq!(schedule.attempt_count as usize, events.len());
        for (i, e) in events.iter().enumerate() {
            assert_eq!(e.attempt_index as usize, i + 1);
        }
    }
}

pub fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_attempts,
        Duration::from_secs(30),
        Duration::from_secs(3600),
        0.1,
    )
}
