//! HTTP Basic authentication
//!
//! Protected routes accept only the configured service credentials.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::ApiError;
use crate::AppState;

/// Reject requests without the configured Basic credentials
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let credentials = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_basic);

    match credentials {
        Some((user, password))
            if credentials_match(
                (user.as_str(), password.as_str()),
                (
                    state.config.security_user_name.as_str(),
                    state.config.security_user_password.as_str(),
                ),
            ) =>
        {
            Ok(next.run(request).await)
        }
        Some((user, _)) => {
            warn!(user = %user, path = %request.uri().path(), "Rejected request with wrong credentials");
            Err(ApiError::Unauthorized)
        }
        None => {
            warn!(path = %request.uri().path(), "Rejected request without credentials");
            Err(ApiError::Unauthorized)
        }
    }
}

/// Constant-time comparison over SHA-256 digests of both sides
fn credentials_match(given: (&str, &str), expected: (&str, &str)) -> bool {
    let digest = |value: &str| Sha256::digest(value.as_bytes());
    let user = digest(given.0).as_slice().ct_eq(digest(expected.0).as_slice());
    let password = digest(given.1).as_slice().ct_eq(digest(expected.1).as_slice());
    bool::from(user & password)
}

/// Decode `Basic <base64(user:password)>`
fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}
