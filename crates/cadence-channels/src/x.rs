//! X (formerly Twitter) adapter: `POST /2/tweets` with an OAuth 2.0 user token.
//!
//! The X API has no idempotency header, so a timeout after the post was
//! created can still produce a duplicate on retry.

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

pub struct XPublisher {
    client: reqwest::Client,
    base_url: String,
}

impl XPublisher {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Deserialize)]
struct CreateTweetResponse {
    data: TweetData,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

#[async_trait]
impl Publisher for XPublisher {
    fn channel_type(&self) -> ChannelType {
        ChannelType::X
    }

    async fn publish(
        &self,
        request: &PublishRequest,
        connection: &ChannelConnection,
    ) -> PublishResult {
        if let Some(rejected) = check_limits(&request.content, &request.limits) {
            return rejected.into();
        }

        // Media must already be uploaded; the tweet only references ids.
        let mut media_ids = Vec::with_capacity(request.content.media.len());
        for item in &request.content.media {
            match &item.external_id {
                Some(id) => media_ids.push(id.clone()),
                None => {
                    return PublishFailure::permanent(
                        FailureCode::ContentRejected,
                        format!("media {} has not been uploaded to X", item.url),
                    )
                    .into()
                }
            }
        }

        let mut body = json!({ "text": request.content.text });
        if !media_ids.is_empty() {
            body["media"] = json!({ "media_ids": media_ids });
        }

        let base = connection
            .credentials
            .base_url
            .as_deref()
            .unwrap_or(&self.base_url)
            .trim_end_matches('/');
        let url = format!("{base}/2/tweets");
        debug!(variant_id = %request.content.variant_id, "posting to X");

        let resp = match self
            .client
            .post(&url)
            .bearer_auth(&connection.credentials.access_token)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return failure_from_transport(&e).into(),
        };

        if !resp.status().is_success() {
            return failure_from_response("x", resp).await.into();
        }

        let text = match resp.text().await {
            Ok(t) => t,
            Err(e) => return failure_from_transport(&e).into(),
        };
        match serde_json::from_str::<CreateTweetResponse>(&text) {
            Ok(parsed) => PublishResult::Success(PublishSuccess {
                external_url: Some(format!("https://x.com/i/web/status/{}", parsed.data.id)),
                external_post_id: parsed.data.id,
                raw_response: Some(truncate_raw(&text)),
            }),
            Err(e) => PublishFailure::permanent(
                FailureCode::InvalidResponse,
                format!("unexpected X response: {e}"),
            )
            .with_raw(truncate_raw(&text))
            .into(),
        }
    }
}
