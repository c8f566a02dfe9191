//! Error types for ci-api
//!
//! Every failure a handler can report maps to exactly one status code. Typed
//! errors render as `{"errors": [message]}`.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input (400)
    #[error("{0}")]
    Validation(String),

    /// Zero-length survey response (400)
    #[error("File too small")]
    FileTooSmall,

    /// A second SEFT instrument for the same reporting unit and exercise (400)
    #[error("Reporting unit {0} already has an instrument uploaded for this collection exercise")]
    DuplicateSeftForRu(String),

    /// A second EQ instrument with the same classifiers in one survey (400)
    #[error("Cannot upload an instrument with an identical set of classifiers")]
    DuplicateClassifierSet,

    /// The form type is already used by an instrument of the other mode (400)
    #[error("Cannot upload an instrument with form type {0} as it is already used by an instrument of a different type")]
    FormTypeModeConflict(String),

    /// Operation only applies to SEFT instruments (400)
    #[error("Instrument {0} is not a SEFT instrument")]
    WrongInstrumentType(String),

    /// Missing entity or missing upstream data (404)
    #[error("{0}")]
    NotFound(String),

    /// Missing or wrong credentials (401)
    #[error("Unauthorized")]
    Unauthorized,

    /// Upstream could not be reached (503)
    #[error("{service} is unavailable")]
    ServiceUnavailable { service: String },

    /// Upstream did not answer in time (504)
    #[error("Request to {service} timed out")]
    ServiceTimeout { service: String },

    /// Upstream answered with an error status other than 404 (500)
    #[error("{service} returned status {status}")]
    Upstream { service: String, status: u16 },

    /// Collection exercise service rejected a link notification (500)
    #[error("Failed to publish collection instrument link for exercise {0}")]
    LinkPublish(String),

    /// Broker hand-off failed (500)
    #[error("Failed to publish message: {0}")]
    Publish(String),

    /// Bucket or topic hand-off failed (500)
    #[error("Failed to hand off survey response: {0}")]
    CloudEgress(String),

    /// Cipher or keystore failure (500)
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Database failure (500)
    #[error("Database error: {0}")]
    Database(String),

    /// Anything else (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::FileTooSmall
            | ApiError::DuplicateSeftForRu(_)
            | ApiError::DuplicateClassifierSet
            | ApiError::FormTypeModeConflict(_)
            | ApiError::WrongInstrumentType(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::ServiceTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Upstream { .. }
            | ApiError::LinkPublish(_)
            | ApiError::Publish(_)
            | ApiError::CloudEgress(_)
            | ApiError::Crypto(_)
            | ApiError::Database(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render as a plain text body, used by the upload paths
    pub fn into_plain_response(self) -> Response {
        let status = self.status();
        self.log(status);
        (status, self.to_string()).into_response()
    }

    fn log(&self, status: StatusCode) {
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        self.log(status);

        let body = Json(json!({ "errors": [self.to_string()] }));

        if matches!(self, ApiError::Unauthorized) {
            return (
                status,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"Authentication Required\"")],
                body,
            )
                .into_response();
        }
        (status, body).into_response()
    }
}

impl From<ci_common::Error> for ApiError {
    fn from(err: ci_common::Error) -> Self {
        match err {
            ci_common::Error::Database(e) => ApiError::from(e),
            ci_common::Error::Crypto(msg) => ApiError::Crypto(msg),
            ci_common::Error::InvalidInput(msg) => ApiError::Validation(msg),
            ci_common::Error::NotFound(msg) => ApiError::NotFound(msg),
            ci_common::Error::Config(msg) => ApiError::Internal(msg),
            ci_common::Error::Io(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(err.to_string())
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// True when a database error is a UNIQUE constraint failure
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}
