//! Bucket plus topic hand-off

use async_trait::async_trait;
use ci_common::crypto::JweEncrypter;
use md5::{Digest, Md5};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::{ObjectStore, ResponseEgress, SurveyResponse, TopicPublisher};
use crate::error::{ApiError, ApiResult};

/// Upper bound on waiting for the topic to accept the metadata record
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(15);

pub struct CloudEgress {
    encrypter: Arc<JweEncrypter>,
    store: Arc<dyn ObjectStore>,
    topic: Arc<dyn TopicPublisher>,
    file_prefix: Option<String>,
    publish_timeout: Duration,
}

impl CloudEgress {
    pub fn new(
        encrypter: Arc<JweEncrypter>,
        store: Arc<dyn ObjectStore>,
        topic: Arc<dyn TopicPublisher>,
        file_prefix: Option<String>,
    ) -> Self {
        Self {
            encrypter,
            store,
            topic,
            file_prefix: file_prefix.filter(|p| !p.is_empty()),
            publish_timeout: PUBLISH_TIMEOUT,
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    fn object_key(&self, filename: &str) -> String {
        match &self.file_prefix {
            Some(prefix) => format!("{}/{}", prefix, filename),
            None => filename.to_string(),
        }
    }
}

#[async_trait]
impl ResponseEgress for CloudEgress {
    async fn hand_off(&self, response: &SurveyResponse) -> ApiResult<()> {
        let token = self.encrypter.encrypt(&response.message())?.into_bytes();
        let metadata = json!({
            "filename": response.filename,
            "tx_id": response.tx_id.to_string(),
            "survey_id": response.survey_ref,
            "period": response.exercise_ref,
            "ru_ref": response.ru_ref,
            "md5sum": hex::encode(Md5::digest(&token)),
            "sizeBytes": token.len(),
        });

        let key = self.object_key(&response.filename);
        self.store.upload(&key, token).await.map_err(|e| {
            error!(key = %key, tx_id = %response.tx_id, error = %e, "Failed to put survey response in bucket");
            ApiError::CloudEgress(format!("bucket upload failed: {}", e))
        })?;
        info!(key = %key, tx_id = %response.tx_id, "Survey response put in bucket");

        let data = serde_json::to_vec(&metadata)
            .map_err(|e| ApiError::Internal(format!("Metadata is not serializable: {}", e)))?;
        match tokio::time::timeout(self.publish_timeout, self.topic.publish(data)).await {
            Ok(Ok(message_id)) => {
                info!(tx_id = %response.tx_id, message_id = %message_id, "Publish succeeded");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(tx_id = %response.tx_id, error = %e, "Publish to topic failed");
                Err(ApiError::CloudEgress(format!("publish failed: {}", e)))
            }
            Err(_) => {
                error!(tx_id = %response.tx_id, "Publish to topic timed out");
                Err(ApiError::CloudEgress("publish timed out".to_string()))
            }
        }
    }
}
