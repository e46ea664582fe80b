//! Tag Registry types
//!
//! A tag is a physical asset-tag identifier. Its status is derived from the
//! Pair Ledger: `unused` until the first pair is written for it, `used` after.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle status of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagStatus {
    /// Registered but never paired
    #[default]
    Unused,
    /// At least one pair exists for the tag
    Used,
}

impl TagStatus {
    /// Get the string representation stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            TagStatus::Unused => "unused",
            TagStatus::Used => "used",
        }
    }
}

impl FromStr for TagStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "unused" => Ok(TagStatus::Unused),
            "used" => Ok(TagStatus::Used),
            _ => Err(Error::InvalidRequest(format!("Unknown tag status: {}", s))),
        }
    }
}

impl std::fmt::Display for TagStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A row of the Tag Registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Unique tag identifier
    pub tag: String,
    pub status: TagStatus,
    /// Serial most recently bound to this tag
    pub last_serial: Option<String>,
    /// Set whenever status or last_serial changes
    pub updated_at: DateTime<Utc>,
}
