//! Request pipelines
//!
//! Handlers parse HTTP input and hand over to these functions, which own the
//! ordering of checks, writes, commits and notifications.

pub mod instruments;
pub mod registry;
pub mod responses;

/// A file received in a multipart form
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Vec<u8>,
}
