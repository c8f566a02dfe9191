//! # Collection Instrument Common Library
//!
//! Shared code for the collection instrument service that does not depend on
//! the HTTP framework:
//! - Error type
//! - At-rest cipher and the JWE keystore used for outbound responses
//! - Database bootstrap and entity models
//! - Classifier maps and upload filename helpers

pub mod classifiers;
pub mod crypto;
pub mod db;
pub mod error;
pub mod files;
pub mod time;
pub mod uuid_utils;

pub use classifiers::Classifiers;
pub use error::{Error, Result};
