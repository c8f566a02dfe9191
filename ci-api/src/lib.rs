//! ci-api library - Collection instrument service
//!
//! Manages collection instruments (SEFT spreadsheets and EQ classifier sets),
//! their links to collection exercises and reporting units, the registry of
//! externally selected instrument versions, and forwards survey responses to
//! the downstream pipeline.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use ci_common::crypto::Cipher;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod clients;
pub mod config;
pub mod db;
pub mod egress;
pub mod error;
pub mod publisher;
pub mod services;

use clients::ServiceClient;
use config::Config;
use db::Store;
use egress::ResponseEgress;
use publisher::MessagePublisher;

/// Route prefix of the instrument API
pub const INSTRUMENT_API: &str = "/collection-instrument-api/1.0.2";
/// Route prefix of the survey response API
pub const SURVEY_RESPONSE_API: &str = "/survey_response-api/v1";

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<Config>,
    /// At-rest cipher for SEFT instrument payloads
    pub cipher: Arc<Cipher>,
    pub clients: ServiceClient,
    /// Instrument events to `Seft.Instruments`
    pub instrument_events: Arc<dyn MessagePublisher>,
    /// Survey response hand-off, broker or cloud
    pub response_egress: Arc<dyn ResponseEgress>,
}

impl AppState {
    pub fn new(
        store: Store,
        config: Config,
        clients: ServiceClient,
        instrument_events: Arc<dyn MessagePublisher>,
        response_egress: Arc<dyn ResponseEgress>,
    ) -> Self {
        let cipher = Arc::new(Cipher::new(&config.ons_cryptokey));
        Self {
            store,
            config: Arc::new(config),
            cipher,
            clients,
            instrument_events,
            response_egress,
        }
    }
}

/// Build application router
///
/// Everything except `/info` requires Basic authentication.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;

    let max_upload_bytes = state.config.max_upload_bytes;

    let protected = Router::new()
        .nest(
            INSTRUMENT_API,
            api::collection_instrument_routes().merge(api::registry_instrument_routes()),
        )
        .nest(SURVEY_RESPONSE_API, api::survey_response_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new().merge(api::info_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
