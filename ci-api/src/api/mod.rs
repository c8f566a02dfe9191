//! HTTP API handlers

pub mod auth;
pub mod collection_instrument;
pub mod info;
pub mod multipart;
pub mod registry_instrument;
pub mod survey_response;

pub use auth::auth_middleware;
pub use collection_instrument::collection_instrument_routes;
pub use info::info_routes;
pub use registry_instrument::registry_instrument_routes;
pub use survey_response::survey_response_routes;
