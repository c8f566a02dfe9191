//! Clients for the survey platform services this service depends on
//!
//! Every lookup goes through [`ServiceClient::get_json`], which applies the
//! configured credentials and timeout and turns transport and status failures
//! into [`ApiError`]s:
//!
//! | failure                        | error                         |
//! |--------------------------------|-------------------------------|
//! | connection refused, DNS        | `ServiceUnavailable` (503)    |
//! | timeout                        | `ServiceTimeout` (504)        |
//! | 404                            | `NotFound` (404)              |
//! | any other status >= 400        | `Upstream` (500)              |

pub mod lookups;

pub use lookups::{BusinessParty, CaseGroup, CollectionExercise};

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};

/// Upstream services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Case,
    CollectionExercise,
    Survey,
    Party,
}

impl Service {
    pub fn name(&self) -> &'static str {
        match self {
            Service::Case => "case-service",
            Service::CollectionExercise => "collectionexercise-service",
            Service::Survey => "survey-service",
            Service::Party => "party-service",
        }
    }
}

/// Base URLs of the upstream services
#[derive(Debug, Clone)]
pub struct ServiceUrls {
    pub case: String,
    pub collection_exercise: String,
    pub survey: String,
    pub party: String,
}

impl ServiceUrls {
    pub fn from_config(config: &Config) -> Self {
        Self {
            case: config.case_url.clone(),
            collection_exercise: config.collection_exercise_url.clone(),
            survey: config.survey_url.clone(),
            party: config.party_url.clone(),
        }
    }

    fn base(&self, service: Service) -> &str {
        let url = match service {
            Service::Case => &self.case,
            Service::CollectionExercise => &self.collection_exercise,
            Service::Survey => &self.survey,
            Service::Party => &self.party,
        };
        url.trim_end_matches('/')
    }
}

/// HTTP client for the upstream services
#[derive(Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    urls: ServiceUrls,
    username: String,
    password: String,
}

impl ServiceClient {
    pub fn new(urls: ServiceUrls, username: &str, password: &str, timeout: Duration) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            urls,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> ApiResult<Self> {
        Self::new(
            ServiceUrls::from_config(config),
            &config.security_user_name,
            &config.security_user_password,
            config.upstream_timeout(),
        )
    }

    /// GET `{base}/{endpoint}/{value}` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        service: Service,
        endpoint: &str,
        value: &str,
        query: &[(&str, &str)],
    ) -> ApiResult<T> {
        let url = format!("{}/{}/{}", self.urls.base(service), endpoint, value);
        info!(service = service.name(), url = %url, "Making request to upstream service");

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(service, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            info!(service = service.name(), url = %url, "Upstream returned not found");
            return Err(ApiError::NotFound(format!(
                "{} has no {} {}",
                service.name(),
                endpoint,
                value
            )));
        }
        if !status.is_success() {
            error!(service = service.name(), url = %url, status = status.as_u16(), "Upstream request failed");
            return Err(ApiError::Upstream {
                service: service.name().to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| {
            error!(service = service.name(), url = %url, error = %e, "Upstream response was not valid JSON");
            ApiError::Upstream {
                service: service.name().to_string(),
                status: status.as_u16(),
            }
        })
    }

    /// Tell the collection exercise service which instruments an exercise has
    ///
    /// Any failure, transport or status, is a `LinkPublish` error.
    pub async fn collection_instrument_link(&self, exercise_id: &Uuid, instruments: &[Uuid]) -> ApiResult<()> {
        let url = format!(
            "{}/collection-instrument/link",
            self.urls.base(Service::CollectionExercise)
        );
        let body = json!({
            "exercise_id": exercise_id.to_string(),
            "instruments": instruments.iter().map(Uuid::to_string).collect::<Vec<_>>(),
        });
        debug!(exercise_id = %exercise_id, instruments = instruments.len(), "Acknowledging instrument link");

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(exercise_id = %exercise_id, error = %e, "Link request failed");
                ApiError::LinkPublish(exercise_id.to_string())
            })?;

        if !response.status().is_success() {
            error!(
                exercise_id = %exercise_id,
                status = response.status().as_u16(),
                "Collection exercise service rejected instrument link"
            );
            return Err(ApiError::LinkPublish(exercise_id.to_string()));
        }
        Ok(())
    }
}

fn transport_error(service: Service, err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        error!(service = service.name(), error = %err, "Upstream request timed out");
        ApiError::ServiceTimeout {
            service: service.name().to_string(),
        }
    } else {
        error!(service = service.name(), error = %err, "Upstream service unavailable");
        ApiError::ServiceUnavailable {
            service: service.name().to_string(),
        }
    }
}
