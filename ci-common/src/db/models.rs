//! Database models

use crate::{Classifiers, Error, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Instrument kind stored in `instrument.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentType {
    #[serde(rename = "SEFT")]
    Seft,
    #[serde(rename = "EQ")]
    Eq,
}

impl InstrumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentType::Seft => "SEFT",
            InstrumentType::Eq => "EQ",
        }
    }
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstrumentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SEFT" => Ok(InstrumentType::Seft),
            "EQ" => Ok(InstrumentType::Eq),
            other => Err(Error::InvalidInput(format!("Unknown instrument type {}", other))),
        }
    }
}

/// Row of the `instrument` table with its survey resolved
#[derive(Debug, Clone)]
pub struct Instrument {
    /// Surrogate key used by the association tables
    pub id: i64,
    pub instrument_id: Uuid,
    pub instrument_type: InstrumentType,
    pub classifiers: Classifiers,
    pub created_at: NaiveDateTime,
    pub survey_id: Uuid,
}

/// Stored spreadsheet attached to a SEFT instrument
#[derive(Debug, Clone)]
pub struct SeftBlob {
    pub instrument_id: Uuid,
    pub file_name: String,
    /// Plaintext length in bytes
    pub length: i64,
    /// `base64(IV || ciphertext)`
    pub data: Vec<u8>,
}

/// Externally curated instrument selection for an exercise and form type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryInstrument {
    pub survey_id: Uuid,
    pub exercise_id: Uuid,
    pub instrument_id: Uuid,
    pub classifier_type: String,
    pub classifier_value: String,
    pub ci_version: i64,
    pub guid: Uuid,
    pub published_at: NaiveDateTime,
}
