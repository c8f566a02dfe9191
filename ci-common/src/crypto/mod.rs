//! Cryptography
//!
//! Two unrelated schemes live here:
//! - [`Cipher`]: symmetric at-rest encryption of SEFT instrument payloads
//! - [`JweEncrypter`]: public-key encryption of survey responses handed to
//!   the downstream processing pipeline

pub mod cipher;
pub mod jwe;

pub use cipher::Cipher;
pub use jwe::{JweEncrypter, KEY_PURPOSE_INBOUND};

use sha2::{Digest, Sha256};

/// Derive a 256-bit key from a configured secret
pub fn derive_key(secret: &str) -> [u8; 32] {
    Sha256::digest(secret.as_bytes()).into()
}
