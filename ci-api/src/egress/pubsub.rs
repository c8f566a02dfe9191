//! Pub/Sub REST publisher

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::{TokenSource, TopicPublisher};
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

pub struct PubSubTopic {
    http: reqwest::Client,
    topic_url: String,
    tokens: Arc<TokenSource>,
}

impl PubSubTopic {
    pub fn new(http: reqwest::Client, base_url: &str, project: &str, topic: &str, tokens: Arc<TokenSource>) -> Self {
        Self {
            http,
            topic_url: format!(
                "{}/v1/projects/{}/topics/{}",
                base_url.trim_end_matches('/'),
                project,
                topic
            ),
            tokens,
        }
    }

    pub fn topic_path(&self) -> &str {
        &self.topic_url
    }
}

#[async_trait]
impl TopicPublisher for PubSubTopic {
    async fn publish(&self, data: Vec<u8>) -> ApiResult<String> {
        debug!(topic = %self.topic_url, "About to publish to pubsub");
        let token = self.tokens.token().await?;
        let body = json!({ "messages": [{ "data": STANDARD.encode(&data) }] });

        let response = self
            .http
            .post(format!("{}:publish", self.topic_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::CloudEgress(format!("publish request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ApiError::CloudEgress(format!(
                "publish returned {}",
                response.status()
            )));
        }

        let published: PublishResponse = response
            .json()
            .await
            .map_err(|e| ApiError::CloudEgress(format!("publish response invalid: {}", e)))?;
        published
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::CloudEgress("publish returned no message id".to_string()))
    }
}
