use async_trait::async_trait;
use ci_common::crypto::JweEncrypter;
use std::sync::Arc;
use tracing::info;

use super::{ResponseEgress, SurveyResponse};
use crate::error::ApiResult;
use crate::publisher::MessagePublisher;

/// Survey responses to the broker queue
pub struct BrokerEgress {
    encrypter: Arc<JweEncrypter>,
    publisher: Arc<dyn MessagePublisher>,
}

impl BrokerEgress {
    pub fn new(encrypter: Arc<JweEncrypter>, publisher: Arc<dyn MessagePublisher>) -> Self {
        Self { encrypter, publisher }
    }
}

#[async_trait]
impl ResponseEgress for BrokerEgress {
    async fn hand_off(&self, response: &SurveyResponse) -> ApiResult<()> {
        let token = self.encrypter.encrypt(&response.message())?;
        let tx_id = response.tx_id.to_string();
        self.publisher.publish(token.as_bytes(), Some(&tx_id)).await?;
        info!(
            filename = %response.filename,
            case_id = %response.case_id,
            tx_id = %tx_id,
            "Survey response published to broker"
        );
        Ok(())
    }
}
