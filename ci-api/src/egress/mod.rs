//! Survey response egress
//!
//! A survey response leaves the service one of two ways, chosen at startup:
//! - [`BrokerEgress`]: encrypted and published to the `Seft.Responses` queue
//! - [`CloudEgress`]: encrypted into a bucket, then announced on a topic

pub mod broker;
pub mod cloud;
pub mod gcs;
pub mod pubsub;
pub mod token;

pub use broker::BrokerEgress;
pub use cloud::CloudEgress;
pub use gcs::GcsBucket;
pub use pubsub::PubSubTopic;
pub use token::TokenSource;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiResult;

/// A survey response ready to hand off
#[derive(Debug, Clone)]
pub struct SurveyResponse {
    /// Generated name, `{ru}{checkletter}_{period}_{survey_ref}_{stamp}`
    pub filename: String,
    pub tx_id: Uuid,
    pub case_id: String,
    pub survey_ref: String,
    pub exercise_ref: String,
    pub ru_ref: String,
    pub file: Vec<u8>,
}

impl SurveyResponse {
    /// JSON record that is encrypted and handed off
    pub fn message(&self) -> Value {
        json!({
            "filename": self.filename,
            "file": STANDARD.encode(&self.file),
            "case_id": self.case_id,
            "survey_id": self.survey_ref,
            "tx_id": self.tx_id.to_string(),
        })
    }
}

/// Final hand-off of a survey response
#[async_trait]
pub trait ResponseEgress: Send + Sync {
    async fn hand_off(&self, response: &SurveyResponse) -> ApiResult<()>;
}

/// Blob storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, key: &str, body: Vec<u8>) -> ApiResult<()>;
}

/// Pub/sub topic; returns the message id
#[async_trait]
pub trait TopicPublisher: Send + Sync {
    async fn publish(&self, data: Vec<u8>) -> ApiResult<String>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_uses_survey_ref_as_survey_id() {
        let response = testing::response();
        let message = response.message();
        assert_eq!(message["survey_id"], "023");
        assert_eq!(message["filename"], response.filename);
        assert_eq!(message["tx_id"], response.tx_id.to_string());
        assert_eq!(
            STANDARD.decode(message["file"].as_str().unwrap()).unwrap(),
            b"spreadsheet bytes"
        );
    }
}
