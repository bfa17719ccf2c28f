//! `cadence-scheduler`: durable publish scheduling with SQLite persistence.
//!
//! # Overview
//!
//! Schedules are rows in a SQLite `schedules` table. The
//! [`engine::SchedulerEngine`] polls for due rows on a fixed interval and
//! hands each to the [`coordinator::ExecutionCoordinator`], which claims it
//! with a compare-and-set update, publishes through the channel adapter and
//! settles the outcome.
//!
//! # Lifecycle
//!
//! | From         | To           | Trigger                                  |
//! |--------------|--------------|------------------------------------------|
//! | `pending`    | `processing` | claim (one winner per attempt)           |
//! | `processing` | `published`  | adapter success                          |
//! | `processing` | `pending`    | transient failure, attempts left         |
//! | `processing` | `failed`     | permanent failure or ceiling reached     |
//! | `pending`    | `cancelled`  | user cancel or variant removal           |
//!
//! Each attempt appends exactly one row to `publish_events` in the same
//! transaction as its status change.

pub mod audit;
pub mod clock;
pub mod collab;
pub mod coordinator;
pub mod db;
pub mod engine;
pub mod error;
pub mod handle;
pub mod poller;
pub mod recorder;
pub mod retry;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collab::{ChannelCatalog, ConnectionStore, DefaultCatalog, VariantStore};
pub use coordinator::{ExecutionCoordinator, Processed};
pub use engine::{CycleReport, SchedulerEngine};
pub use error::{Result, SchedulerError};
pub use handle::SchedulerHandle;
pub use poller::DuePoller;
pub use retry::RetryPolicy;
pub use store::ScheduleStore;
pub use types::{
    ClaimedSchedule, EventStatus, NewSchedule, PublishEvent, Resolution, Schedule, ScheduleQuery,
    ScheduleStatus,
};
