//! Service information endpoint

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Name and build identification
#[derive(Debug, Serialize)]
pub struct Info {
    pub name: String,
    pub version: String,
    pub git_hash: String,
    pub build_timestamp: String,
    pub build_profile: String,
}

impl Info {
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_hash: env!("GIT_HASH").to_string(),
            build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
            build_profile: env!("BUILD_PROFILE").to_string(),
        }
    }
}

/// GET /info
///
/// Does not require authentication.
pub async fn get_info() -> Json<Info> {
    Json(Info::current())
}

pub fn info_routes() -> Router<AppState> {
    Router::new().route("/info", get(get_info))
}
