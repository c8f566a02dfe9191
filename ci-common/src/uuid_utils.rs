//! UUID utilities
//!
//! UUIDs are persisted as lowercase 32-hex strings (no hyphens) since SQLite
//! has no native UUID column type. The API always renders the hyphenated form.

use crate::{Error, Result};
use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse a UUID supplied by a client
///
/// Fails with `InvalidInput` carrying the message clients have always seen.
pub fn parse(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s.trim()).map_err(|_| Error::InvalidInput(format!("Value is not a valid UUID ({})", s)))
}

/// Storage form of a UUID
pub fn to_db(id: &Uuid) -> String {
    id.simple().to_string()
}

/// Read a UUID back from its storage form
pub fn from_db(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Database(sqlx::Error::Decode(Box::new(e))))
}
