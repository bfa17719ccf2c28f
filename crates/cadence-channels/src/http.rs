//! Transport-level normalization shared by the HTTP adapters.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use tracing::warn;

use crate::types::{ErrorClass, FailureCode, PublishFailure};

/// Raw bodies kept for the audit trail are cut to this many bytes.
const RAW_RESPONSE_MAX: usize = 4096;

pub(crate) const USER_AGENT: &str = concat!("cadence/", env!("CARGO_PKG_VERSION"));

/// Map a reqwest transport error (no HTTP response) to a transient failure.
pub(crate) fn failure_from_transport(err: &reqwest::Error) -> PublishFailure {
    if err.is_timeout() {
        PublishFailure::transient(FailureCode::Timeout, format!("request timed out: {err}"))
    } else if err.is_decode() {
        PublishFailure::permanent(
            FailureCode::InvalidResponse,
            format!("unreadable response: {err}"),
        )
    } else {
        PublishFailure::transient(
            FailureCode::TransientNetwork,
            format!("network error: {err}"),
        )
    }
}

/// Classify a non-2xx HTTP status.
pub(crate) fn classify_status(status: u16) -> (FailureCode, ErrorClass) {
    match status {
        429 => (FailureCode::RateLimited, ErrorClass::Transient),
        401 | 403 => (FailureCode::AuthFailed, ErrorClass::Permanent),
        408 => (FailureCode::Timeout, ErrorClass::Transient),
        400..=499 => (FailureCode::ContentRejected, ErrorClass::Permanent),
        _ => (FailureCode::PlatformError, ErrorClass::Transient),
    }
}

/// Build a failure from a non-2xx response, consuming its body.
pub(crate) async fn failure_from_response(
    platform: &str,
    resp: reqwest::Response,
) -> PublishFailure {
    let status = resp.status().as_u16();
    let retry_after = if status == 429 {
        retry_after_hint(resp.headers(), Utc::now())
    } else {
        None
    };
    let body = resp.text().await.unwrap_or_default();
    let (code, class) = classify_status(status);
    warn!(platform, status, code = %code, "publish rejected by platform");

    PublishFailure {
        code,
        message: format!("{platform} returned HTTP {status}: {}", summarize(&body)),
        class,
        retry_after,
        raw_response: Some(truncate_raw(&body)),
    }
}

/// Parse a rate-limit hint: `Retry-After` (seconds or HTTP date) first, then
/// X's `x-rate-limit-reset` epoch seconds.
pub(crate) fn retry_after_hint(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(value) = headers.get("retry-after").and_then(|v| v.to_str().ok()) {
        let value = value.trim();
        if let Ok(secs) = value.parse::<u64>() {
            return Some(Duration::from_secs(secs));
        }
        if let Ok(at) = DateTime::parse_from_rfc2822(value) {
            return (at.with_timezone(&Utc) - now).to_std().ok();
        }
    }

    headers
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|reset| DateTime::<Utc>::from_timestamp(reset, 0))
        .and_then(|at| (at - now).to_std().ok())
}

pub(crate) fn truncate_raw(body: &str) -> String {
    if body.len() <= RAW_RESPONSE_MAX {
        return body.to_string();
    }
    let mut end = RAW_RESPONSE_MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

fn summarize(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    trimmed.chars().take(200).collect()
}
