use thiserror::Error;

use crate::types::ScheduleStatus;

/// Errors that can occur within the scheduler subsystem.
///
/// Publish failures are not errors: they are recorded as failed attempts.
/// A lost claim race is not an error either; `claim` returns `None`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The schedule definition supplied on create is invalid.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// No schedule with the given ID exists in the store.
    #[error("Schedule not found: {id}")]
    NotFound { id: String },

    /// The requested status change is not allowed from the current status.
    #[error("Schedule {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: ScheduleStatus,
        to: ScheduleStatus,
    },

    /// The execution lease was reclaimed or resolved by someone else.
    #[error("Lease lost for schedule {id}")]
    LeaseLost { id: String },

    /// A collaborator store (variants, connections) failed.
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] cadence_core::CadenceError),

    /// A thread panicked while holding the store connection.
    #[error("Schedule store lock poisoned")]
    LockPoisoned,
}

impl SchedulerError {
    /// Short error code string returned to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::Database(_) => "DATABASE_ERROR",
            SchedulerError::InvalidSchedule(_) => "INVALID_SCHEDULE",
            SchedulerError::NotFound { .. } => "SCHEDULE_NOT_FOUND",
            SchedulerError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SchedulerError::LeaseLost { .. } => "LEASE_LOST",
            SchedulerError::Collaborator(e) => e.code(),
            SchedulerError::LockPoisoned => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
