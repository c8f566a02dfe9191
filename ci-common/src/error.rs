//! Library error type
//!
//! Carries only what the HTTP layer needs to pick a status: the service crate
//! maps `InvalidInput` to 400, `NotFound` to 404 and the rest to 500.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Keystore parsing, encryption or a ciphertext that does not decrypt
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Client-supplied value rejected; the message is shown to the client as is
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    /// Startup settings that cannot be used
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_messages_are_unprefixed() {
        let err = Error::InvalidInput("Value is not a valid UUID (x)".to_string());
        assert_eq!(err.to_string(), "Value is not a valid UUID (x)");
        assert_eq!(Error::NotFound("gone".to_string()).to_string(), "gone");
    }

    #[test]
    fn test_sqlx_errors_convert() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::Database(_)));
    }
}
