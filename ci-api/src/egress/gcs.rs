//! Cloud Storage uploads with a customer-supplied encryption key

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

use super::{ObjectStore, TokenSource};
use crate::error::{ApiError, ApiResult};

pub struct GcsBucket {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    key: [u8; 32],
    tokens: Arc<TokenSource>,
}

impl GcsBucket {
    /// `key` is the raw AES-256 key the object is encrypted with
    pub fn new(http: reqwest::Client, base_url: &str, bucket: &str, key: [u8; 32], tokens: Arc<TokenSource>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            key,
            tokens,
        }
    }
}

#[async_trait]
impl ObjectStore for GcsBucket {
    async fn upload(&self, key: &str, body: Vec<u8>) -> ApiResult<()> {
        let url = format!("{}/upload/storage/v1/b/{}/o", self.base_url, self.bucket);
        debug!(bucket = %self.bucket, key, bytes = body.len(), "Uploading object");

        let token = self.tokens.token().await?;
        let response = self
            .http
            .post(&url)
            .query(&[("uploadType", "media"), ("name", key)])
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header("x-goog-encryption-algorithm", "AES256")
            .header("x-goog-encryption-key", STANDARD.encode(self.key))
            .header("x-goog-encryption-key-sha256", STANDARD.encode(Sha256::digest(self.key)))
            .body(body)
            .send()
            .await
            .map_err(|e| ApiError::CloudEgress(format!("upload to {} failed: {}", self.bucket, e)))?;

        if !response.status().is_success() {
            return Err(ApiError::CloudEgress(format!(
                "upload to {} returned {}",
                self.bucket,
                response.status()
            )));
        }
        Ok(())
    }
}
