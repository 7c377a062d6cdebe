//! Governance descriptor: the JSON record gating one stage, substage, or
//! custom stage.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, RiftError};

/// Fields every descriptor must carry. Absence of any is `invalid_schema`.
pub const REQUIRED_FIELDS: &[&str] = &["package_name", "version", "stage", "timestamp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageType {
    Legacy,
    #[default]
    Experimental,
    Stable,
}

/// A numbered pipeline stage (0-6) or a custom stage tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageRef {
    Numbered(u8),
    Custom(String),
}

impl std::fmt::Display for StageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageRef::Numbered(n) => write!(f, "{n}"),
            StageRef::Custom(tag) => f.write_str(tag),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceDescriptor {
    pub package_name: String,
    pub version: String,
    /// ISO-8601 timestamp as written in the file; see [`parse_timestamp`].
    pub timestamp: String,
    pub stage: StageRef,
    #[serde(default)]
    pub stage_type: StageType,
    #[serde(default)]
    pub semverx_lock: bool,
    #[serde(default)]
    pub entry_point: String,
    #[serde(default)]
    pub nlink_enabled: bool,
    #[serde(default)]
    pub custom_stages: Vec<serde_json::Value>,
    /// Stage-5 optimizer security addendum, kept raw so that missing fields
    /// can be told apart from wrong ones.
    #[serde(default, rename = "stage_5_optimizer", skip_serializing_if = "Option::is_none")]
    pub optimizer: Option<serde_json::Value>,
}

impl GovernanceDescriptor {
    /// Parse descriptor text read from `source`.
    ///
    /// Malformed JSON, a non-object document, a missing required field, or a
    /// field of the wrong type all produce [`RiftError::Schema`].
    pub fn parse(source: &Path, text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| schema_error(source, format!("malformed JSON: {e}")))?;
        Self::from_value(source, value)
    }

    pub fn from_value(source: &Path, value: serde_json::Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| schema_error(source, "descriptor is not a JSON object".into()))?;

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| !object.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            return Err(schema_error(
                source,
                format!("missing required fields: {}", missing.join(", ")),
            ));
        }

        serde_json::from_value(value).map_err(|e| schema_error(source, e.to_string()))
    }

    /// Lock compliance is only evaluated when both flags are set.
    pub fn requires_lock_check(&self) -> bool {
        self.semverx_lock && self.nlink_enabled
    }
}

fn schema_error(source: &Path, message: String) -> RiftError {
    RiftError::Schema {
        source_path: source.display().to_string(),
        message,
    }
}

/// Parse an ISO-8601 timestamp. A trailing `Z` is read as `+00:00`; offset-less
/// timestamps and bare dates are taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let normalized = match raw.strip_suffix('Z') {
        Some(head) => format!("{head}+00:00"),
        None => raw.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
