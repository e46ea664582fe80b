//! Pair Ledger types
//!
//! A pair is one historical binding event between an asset tag and a serial
//! number. The request/response shapes of the pairing engine live here too.

use crate::tag::TagStatus;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A row of the Pair Ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    /// Storage row id; increases with insertion order
    pub id: i64,
    pub asset_tag: String,
    pub serial: String,
    /// Actor that performed the assignment
    pub assigned_by: String,
    pub assigned_at: DateTime<Utc>,
}

/// One scanned item of a batch assignment.
///
/// Fields are optional so that malformed items can be reported per item
/// instead of rejecting the whole batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanInput {
    #[serde(default)]
    pub asset_tag: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
    /// RFC 3339 or naive ISO-8601 (UTC); defaults to now
    #[serde(default)]
    pub scanned_at: Option<String>,
    /// Set when a decoded field had an unusable JSON type
    #[serde(skip)]
    pub rejected: Option<&'static str>,
}

impl ScanInput {
    pub fn new(asset_tag: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            asset_tag: Some(asset_tag.into()),
            serial: Some(serial.into()),
            scanned_at: None,
            rejected: None,
        }
    }

    pub fn scanned_at(mut self, scanned_at: impl Into<String>) -> Self {
        self.scanned_at = Some(scanned_at.into());
        self
    }

    /// Decode a JSON batch item by item.
    ///
    /// Non-object items become empty inputs, which assignment reports as
    /// missing fields. Numeric tags and serials are taken as their decimal
    /// text. Any other non-string type marks the item rejected with the
    /// message naming the offending field.
    pub fn from_json_items(values: Vec<serde_json::Value>) -> Vec<ScanInput> {
        values.iter().map(Self::from_json_item).collect()
    }

    fn from_json_item(value: &serde_json::Value) -> ScanInput {
        let Some(object) = value.as_object() else {
            return ScanInput::default();
        };

        let mut input = ScanInput::default();
        match (identifier(object.get("asset_tag")), identifier(object.get("serial"))) {
            (Ok(asset_tag), Ok(serial)) => {
                input.asset_tag = asset_tag;
                input.serial = serial;
            }
            _ => input.rejected = Some(AssignOutcome::INVALID_FIELDS),
        }

        match object.get("scanned_at") {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::String(raw)) => input.scanned_at = Some(raw.clone()),
            Some(_) => {
                input.rejected.get_or_insert(AssignOutcome::INVALID_SCANNED_AT);
            }
        }
        input
    }
}

/// Text of a tag or serial field; `Err` for types that are not text or numbers.
fn identifier(value: Option<&serde_json::Value>) -> std::result::Result<Option<String>, ()> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(()),
    }
}

/// Kind of a per-item batch outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// A new pair row was written
    OkInserted,
    /// The exact (asset_tag, serial) pair existed and was overwritten
    OkOverwriteSamePair,
    /// The item was rejected; nothing was written
    Error,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::OkInserted => "ok_inserted",
            OutcomeStatus::OkOverwriteSamePair => "ok_overwrite_same_pair",
            OutcomeStatus::Error => "error",
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, OutcomeStatus::Error)
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignOutcome {
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    pub message: String,
}

impl AssignOutcome {
    pub const SAVED: &'static str = "Pair saved successfully";
    pub const MISSING_FIELDS: &'static str = "Missing asset_tag or serial";
    pub const INVALID_SCANNED_AT: &'static str = "Invalid scanned_at";
    pub const INVALID_FIELDS: &'static str = "Invalid asset_tag or serial";

    pub fn saved(status: OutcomeStatus, asset_tag: &str, serial: &str) -> Self {
        Self {
            status,
            asset_tag: Some(asset_tag.to_string()),
            serial: Some(serial.to_string()),
            message: Self::SAVED.to_string(),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: OutcomeStatus::Error,
            asset_tag: None,
            serial: None,
            message: message.to_string(),
        }
    }
}

/// Filters for a history search. Empty values count as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub asset_tag: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
}

impl SearchQuery {
    pub fn by_tag(asset_tag: impl Into<String>) -> Self {
        Self {
            asset_tag: Some(asset_tag.into()),
            serial: None,
        }
    }

    pub fn by_serial(serial: impl Into<String>) -> Self {
        Self {
            asset_tag: None,
            serial: Some(serial.into()),
        }
    }
}

/// One entry of a tag's or serial's assignment history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub asset_tag: String,
    pub serial: String,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: String,
}

impl From<Pair> for HistoryEntry {
    fn from(pair: Pair) -> Self {
        Self {
            asset_tag: pair.asset_tag,
            serial: pair.serial,
            assigned_at: pair.assigned_at,
            assigned_by: pair.assigned_by,
        }
    }
}

/// Search result: the most recent matching pair plus every matching row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairHistoryView {
    pub asset_tag: String,
    pub serial: String,
    /// Current status of the representative row's tag
    pub status: TagStatus,
    /// Most recent first
    pub history: Vec<HistoryEntry>,
}

/// Which column a replace looks up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchBy {
    AssetTag,
    Serial,
}

impl SearchBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchBy::AssetTag => "asset_tag",
            SearchBy::Serial => "serial",
        }
    }

    /// Column of the `pairs` table this key filters on
    pub fn column(&self) -> &'static str {
        self.as_str()
    }
}

impl FromStr for SearchBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asset_tag" => Ok(SearchBy::AssetTag),
            "serial" => Ok(SearchBy::Serial),
            _ => Err(Error::InvalidRequest(format!("Unknown searchBy: {}", s))),
        }
    }
}

impl std::fmt::Display for SearchBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Request to move a binding to a new tag and/or serial.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplaceRequest {
    #[serde(default, rename = "searchBy", alias = "search_by")]
    pub search_by: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub new_asset_tag: Option<String>,
    #[serde(default)]
    pub new_serial: Option<String>,
}

impl ReplaceRequest {
    pub fn new(search_by: SearchBy, value: impl Into<String>) -> Self {
        Self {
            search_by: Some(search_by.as_str().to_string()),
            value: Some(value.into()),
            new_asset_tag: None,
            new_serial: None,
        }
    }

    pub fn new_asset_tag(mut self, tag: impl Into<String>) -> Self {
        self.new_asset_tag = Some(tag.into());
        self
    }

    pub fn new_serial(mut self, serial: impl Into<String>) -> Self {
        self.new_serial = Some(serial.into());
        self
    }
}

/// Outcome of a successful replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceResult {
    pub success: bool,
    pub message: String,
    /// Tag the new pair row was written under
    pub asset_tag: String,
    pub serial: String,
}

/// Returns the value if present and non-empty. Values are taken verbatim.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
