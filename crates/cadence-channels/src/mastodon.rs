//! Mastodon adapter: `POST /api/v1/statuses` on the connection's instance.
//!
//! Mastodon deduplicates on the `Idempotency-Key` header for an hour, so a
//! retry after an ambiguous timeout returns the already-created status
//! instead of posting twice.

use async_trait::async_trait;
use cadence_core::{ChannelConnection, ChannelType};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    error::ChannelError,
    http::{failure_from_response, failure_from_transport, truncate_raw, USER_AGENT},
    limits::check_limits,
    publisher::Publisher,
    types::{FailureCode, PublishFailure, PublishRequest, PublishResult, PublishSuccess},
};

pub struct MastodonPublisher {
    client: reqwest::Client,
}

impl MastodonPublisher {
    pub fn new() -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }
}

#[derive(Deserialize)]
struct Status {
    id: String,
    url: Option<String>,
}

#[async_trait]
impl Publisher for MastodonPublisher {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Mastodon
    }

    async fn publish(
        &self,
        request: &PublishRequest,
        connection: &ChannelConnection,
    ) -> PublishResult {
        if let Some(rejected) = check_limits(&request.content, &request.limits) {
            return rejected.into();
        }

        let Some(instance) = connection.credentials.base_url.as_deref() else {
            return PublishFailure::permanent(
                FailureCode::ConnectionUnavailable,
                "mastodon connection has no instance url",
            )
            .into();
        };

        let media_ids: Vec<&str> = request
            .content
            .media
            .iter()
            .filter_map(|m| m.external_id.as_deref())
            .collect();
        if media_ids.len() != request.content.media.len() {
            return PublishFailure::permanent(
                FailureCode::ContentRejected,
                "every attachment must be uploaded to the instance before posting",
            )
            .into();
        }

        let body = json!({
            "status": request.content.text,
            "media_ids": media_ids,
        });
        let url = format!("{}/api/v1/statuses", instance.trim_end_matches('/'));
        debug!(variant_id = %request.content.variant_id, %instance, "posting to Mastodon");

        let resp = match self
            .client
            .post(&url)
            .bearer_auth(&connection.credentials.access_token)
            .header("Idempotency-Key", &request.idempotency_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return failure_from_transport(&e).into(),
        };

        if !resp.status().is_success() {
            return failure_from_response("mastodon", resp).await.into();
        }

        let text = match resp.text().await {
            Ok(t) => t,
            Err(e) => return failure_from_transport(&e).into(),
        };
        match serde_json::from_str::<Status>(&text) {
            Ok(status) => PublishResult::Success(PublishSuccess {
                external_post_id: status.id,
                external_url: status.url,
                raw_response: Some(truncate_raw(&text)),
            }),
            Err(e) => PublishFailure::permanent(
                FailureCode::InvalidResponse,
                format!("unexpected Mastodon response: {e}"),
            )
            .with_raw(truncate_raw(&text))
            .into(),
        }
    }
}
