//! OAuth access tokens for the cloud APIs

use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ApiError, ApiResult};

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh a cached token this long before it expires
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

pub enum TokenSource {
    /// Fixed token from configuration
    Static(String),
    /// Token fetched from the instance metadata server and cached
    Metadata {
        http: reqwest::Client,
        url: String,
        cached: Mutex<Option<(String, Instant)>>,
    },
}

impl TokenSource {
    pub fn metadata(http: reqwest::Client) -> Self {
        Self::metadata_at(http, METADATA_TOKEN_URL)
    }

    pub fn metadata_at(http: reqwest::Client, url: &str) -> Self {
        TokenSource::Metadata {
            http,
            url: url.to_string(),
            cached: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> ApiResult<String> {
        match self {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Metadata { http, url, cached } => {
                let mut cached = cached.lock().await;
                if let Some((token, expires)) = cached.as_ref() {
                    if Instant::now() + EXPIRY_MARGIN < *expires {
                        return Ok(token.clone());
                    }
                }

                debug!("Fetching access token from metadata server");
                let response = http
                    .get(url.as_str())
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| ApiError::CloudEgress(format!("token request failed: {}", e)))?;
                if !response.status().is_success() {
                    return Err(ApiError::CloudEgress(format!(
                        "token request returned {}",
                        response.status()
                    )));
                }
                let fresh: MetadataToken = response
                    .json()
                    .await
                    .map_err(|e| ApiError::CloudEgress(format!("token response invalid: {}", e)))?;

                let expires = Instant::now() + Duration::from_secs(fresh.expires_in);
                *cached = Some((fresh.access_token.clone(), expires));
                Ok(fresh.access_token)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_static_token() {
        let source = TokenSource::Static("abc".to_string());
        assert_eq!(source.token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_metadata_token_is_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/token",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({"access_token": "ya29", "expires_in": 3600, "token_type": "Bearer"}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let source = TokenSource::metadata_at(reqwest::Client::new(), &format!("http://{}/token", addr));
        assert_eq!(source.token().await.unwrap(), "ya29");
        assert_eq!(source.token().await.unwrap(), "ya29");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
