use cadence_channels::{PublishFailure, PublishSuccess};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// Waiting for `run_at`, either first time or after a retryable failure.
    Pending,
    /// Claimed by a worker; an attempt is in flight.
    Processing,
    /// Published; exactly one success event exists.
    Published,
    /// Permanently failed (non-retryable error or retry ceiling reached).
    Failed,
    /// Cancelled by the user while pending.
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Processing => "processing",
            ScheduleStatus::Published => "published",
            ScheduleStatus::Failed => "failed",
            ScheduleStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScheduleStatus::Published | ScheduleStatus::Failed | ScheduleStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScheduleStatus::Pending),
            "processing" => Ok(ScheduleStatus::Processing),
            "published" => Ok(ScheduleStatus::Published),
            "failed" => Ok(ScheduleStatus::Failed),
            "cancelled" => Ok(ScheduleStatus::Cancelled),
            other => Err(format!("unknown schedule status: {other}")),
        }
    }
}

/// A persisted instruction to publish a post variant to a channel connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// UUIDv7 primary key.
    pub id: String,
    pub post_variant_id: String,
    pub channel_connection_id: String,
    /// Earliest eligible execution instant (absolute, UTC).
    pub run_at: DateTime<Utc>,
    /// IANA zone used for display; never changes `run_at`.
    pub timezone: String,
    pub status: ScheduleStatus,
    /// Number of execution attempts so far; equals the publish event count.
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Set while `processing`; drives stale-lease detection.
    pub processing_started_at: Option<DateTime<Utc>>,
    /// Worker currently holding the execution lease.
    pub lease_owner: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Principal that created the schedule.
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker, set when the owning variant is removed.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Input for creating a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSchedule {
    pub post_variant_id: String,
    pub channel_connection_id: String,
    pub run_at: DateTime<Utc>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub created_by: Option<String>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// A schedule this worker owns, plus the token proving it.
#[derive(Debug, Clone)]
pub struct ClaimedSchedule {
    pub schedule: Schedule,
    pub lease_token: String,
}

/// Filters for listing schedules. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleQuery {
    pub status: Option<ScheduleStatus>,
    /// Inclusive lower bound on `run_at`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `run_at`.
    pub to: Option<DateTime<Utc>>,
    /// Matches `created_by`.
    pub principal: Option<String>,
    pub post_variant_id: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Success,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Success => "success",
            EventStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(EventStatus::Success),
            "failed" => Ok(EventStatus::Failed),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

/// Immutable audit record of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishEvent {
    pub id: String,
    pub schedule_id: String,
    /// 1-based; equals the schedule's attempt_count at this attempt.
    pub attempt_index: u32,
    pub status: EventStatus,
    pub external_post_id: Option<String>,
    pub external_url: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub raw_response: Option<String>,
    pub worker_id: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// What an attempt produced, as written to the audit trail.
#[derive(Debug, Clone, Copy)]
pub enum AttemptOutcome<'a> {
    Success(&'a PublishSuccess),
    Failure(&'a PublishFailure),
}

/// How the coordinator settles a claimed schedule after an attempt.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Mark `published`.
    Published(PublishSuccess),
    /// Back to `pending` with a later `run_at`.
    Retry {
        failure: PublishFailure,
        run_at: DateTime<Utc>,
    },
    /// Mark `failed` for good. `exhausted` is true when the retry ceiling,
    /// not the error class, ended the schedule.
    Failed {
        failure: PublishFailure,
        exhausted: bool,
    },
}

impl Resolution {
    pub fn target_status(&self) -> ScheduleStatus {
        match self {
            Resolution::Published(_) => ScheduleStatus::Published,
            Resolution::Retry { .. } => ScheduleStatus::Pending,
            Resolution::Failed { .. } => ScheduleStatus::Failed,
        }
    }

    pub fn outcome(&self) -> AttemptOutcome<'_> {
        match self {
            Resolution::Published(s) => AttemptOutcome::Success(s),
            Resolution::Retry { failure, .. } | Resolution::Failed { failure, .. } => {
                AttemptOutcome::Failure(failure)
            }
        }
    }
}
