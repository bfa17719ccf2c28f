use std::fmt;
use std::time::Duration;

use cadence_core::{ChannelLimits, VariantContent};
use serde::{Deserialize, Serialize};

/// Whether a failed attempt may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Network timeout, 5xx, rate limit: retry with backoff.
    Transient,
    /// Auth/validation 4xx, rejected content, unusable connection: never retried.
    Permanent,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Permanent => write!(f, "permanent"),
        }
    }
}

/// Stable machine-readable failure codes, persisted on schedules and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    ConnectionUnavailable,
    ContentRejected,
    RateLimited,
    TransientNetwork,
    Timeout,
    RetryExhausted,
    AuthFailed,
    PlatformError,
    InvalidResponse,
    VariantNotFound,
    AdapterNotRegistered,
    CollaboratorUnavailable,
    LeaseExpired,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::ConnectionUnavailable => "CONNECTION_UNAVAILABLE",
            FailureCode::ContentRejected => "CONTENT_REJECTED",
            FailureCode::RateLimited => "RATE_LIMITED",
            FailureCode::TransientNetwork => "TRANSIENT_NETWORK",
            FailureCode::Timeout => "TIMEOUT",
            FailureCode::RetryExhausted => "RETRY_EXHAUSTED",
            FailureCode::AuthFailed => "AUTH_FAILED",
            FailureCode::PlatformError => "PLATFORM_ERROR",
            FailureCode::InvalidResponse => "INVALID_RESPONSE",
            FailureCode::VariantNotFound => "VARIANT_NOT_FOUND",
            FailureCode::AdapterNotRegistered => "ADAPTER_NOT_REGISTERED",
            FailureCode::CollaboratorUnavailable => "COLLABORATOR_UNAVAILABLE",
            FailureCode::LeaseExpired => "LEASE_EXPIRED",
        }
    }

    /// Classification used when a failure is raised without an explicit one.
    pub fn default_class(&self) -> ErrorClass {
        match self {
            FailureCode::RateLimited
            | FailureCode::TransientNetwork
            | FailureCode::Timeout
            | FailureCode::PlatformError
            | FailureCode::CollaboratorUnavailable
            | FailureCode::LeaseExpired => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an adapter needs to publish one variant.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub content: VariantContent,
    pub limits: ChannelLimits,
    /// Stable across retries of the same schedule; forwarded to platforms
    /// that deduplicate on it.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishSuccess {
    pub external_post_id: String,
    pub external_url: Option<String>,
    pub raw_response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishFailure {
    pub code: FailureCode,
    pub message: String,
    pub class: ErrorClass,
    /// Platform-provided `Retry-After` hint.
    pub retry_after: Option<Duration>,
    pub raw_response: Option<String>,
}

impl PublishFailure {
    /// Failure classified by its code's default class.
    pub fn new(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            class: code.default_class(),
            retry_after: None,
            raw_response: None,
        }
    }

    pub fn permanent(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Permanent,
            ..Self::new(code, message)
        }
    }

    pub fn transient(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Transient,
            ..Self::new(code, message)
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = Some(raw.into());
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.class == ErrorClass::Transient
    }
}

/// Normalized outcome of one publish call.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishResult {
    Success(PublishSuccess),
    Failure(PublishFailure),
}

impl PublishResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PublishResult::Success(_))
    }
}

impl From<PublishFailure> for PublishResult {
    fn from(f: PublishFailure) -> Self {
        PublishResult::Failure(f)
    }
}
