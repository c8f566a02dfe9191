//! Instrument classifier maps
//!
//! Classifiers are string key/value attributes attached to an instrument and
//! used for selection at run time. Keys are stored lowercased. The map is kept
//! sorted so that its JSON rendering is canonical: two maps are equal exactly
//! when their stored text is equal.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Classifier key that identifies the form an instrument collects
pub const FORM_TYPE: &str = "form_type";

/// Lowercased, canonically ordered classifier map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Classifiers(BTreeMap<String, String>);

impl Classifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the classifiers JSON supplied with an upload
    ///
    /// The document must be an object. String values are kept, numbers and
    /// booleans are stored in their JSON text form, anything else is rejected.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| Error::InvalidInput(format!("Classifiers are not valid JSON: {}", e)))?;
        Self::from_json_value(&value)
    }

    pub fn from_json_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::InvalidInput("Classifiers must be a JSON object".to_string()))?;

        let mut map = BTreeMap::new();
        for (key, value) in object {
            map.insert(key.to_lowercase(), scalar_to_string(key, value)?);
        }
        Ok(Self(map))
    }

    /// Decode the stored column value
    pub fn from_db(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Database(sqlx::Error::Decode(Box::new(e))))
    }

    /// Canonical JSON text stored in the `classifiers` column
    pub fn to_db(&self) -> String {
        // A BTreeMap<String, String> always serializes
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn form_type(&self) -> Option<&str> {
        self.get(FORM_TYPE)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// Render a JSON scalar as the string form classifiers are compared in
pub fn scalar_to_string(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(Error::InvalidInput(format!(
            "Classifier {} must have a string value",
            key
        ))),
    }
}
