//! Pairing engine
//!
//! Implements the four ledger operations on top of [`SqliteStore`]:
//! - List tags (optionally changed since a timestamp)
//! - Batch assign scanned (tag, serial) pairs, one transaction per item
//! - Search pair history by tag and/or serial
//! - Replace a binding with a new tag and/or serial
//!
//! The engine never authenticates; every mutating call takes the actor
//! identity from its caller.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::clock::{parse_timestamp, Clock};
use crate::pair::{
    non_empty, AssignOutcome, HistoryEntry, OutcomeStatus, PairHistoryView, ReplaceRequest, ReplaceResult,
    ScanInput, SearchBy, SearchQuery,
};
use crate::storage::SqliteStore;
use crate::tag::Tag;
use crate::{Error, Result};

/// Pairing engine over an explicit store and clock
pub struct PairingEngine<'a> {
    store: &'a SqliteStore,
    clock: &'a dyn Clock,
}

impl<'a> PairingEngine<'a> {
    /// Create a new pairing engine
    pub fn new(store: &'a SqliteStore, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// List tags, or only those updated strictly after `since`
    pub fn list_tags(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Tag>> {
        self.store.list_tags(since.as_ref())
    }

    /// Assign every scanned pair in order.
    ///
    /// Malformed items become error outcomes and do not stop the batch.
    /// Each valid item commits on its own; a storage failure aborts the
    /// remaining items but keeps the ones already committed.
    pub fn assign_batch(&self, items: &[ScanInput], actor: &str) -> Result<Vec<AssignOutcome>> {
        let mut outcomes = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let outcome = self.assign_one(item, actor)?;
            if !outcome.status.is_ok() {
                warn!("Batch item {} rejected: {}", index, outcome.message);
            }
            outcomes.push(outcome);
        }

        let saved = outcomes.iter().filter(|o| o.status.is_ok()).count();
        info!("Batch by {}: {} of {} pairs saved", actor, saved, items.len());
        Ok(outcomes)
    }

    fn assign_one(&self, item: &ScanInput, actor: &str) -> Result<AssignOutcome> {
        if let Some(reason) = item.rejected {
            return Ok(AssignOutcome::error(reason));
        }
        let (Some(asset_tag), Some(serial)) = (non_empty(&item.asset_tag), non_empty(&item.serial)) else {
            return Ok(AssignOutcome::error(AssignOutcome::MISSING_FIELDS));
        };

        let scanned_at = match non_empty(&item.scanned_at) {
            Some(raw) => match parse_timestamp(raw) {
                Some(at) => at,
                None => return Ok(AssignOutcome::error(AssignOutcome::INVALID_SCANNED_AT)),
            },
            None => self.clock.now(),
        };

        let now = self.clock.now();
        let overwritten = self.store.write(|tx| {
            if tx.ensure_tag(asset_tag, &now)? {
                debug!("Registered new tag {}", asset_tag);
            }
            let overwritten = tx.upsert_pair(asset_tag, serial, actor, &scanned_at)?;
            tx.mark_tag_used(asset_tag, serial, &now)?;
            Ok(overwritten)
        })?;

        let status = if overwritten {
            OutcomeStatus::OkOverwriteSamePair
        } else {
            OutcomeStatus::OkInserted
        };
        debug!("{} -> {}: {}", asset_tag, serial, status);
        Ok(AssignOutcome::saved(status, asset_tag, serial))
    }

    /// Search pair history by tag and/or serial (both must match when both are given)
    pub fn search_pairs(&self, query: &SearchQuery) -> Result<PairHistoryView> {
        let asset_tag = non_empty(&query.asset_tag);
        let serial = non_empty(&query.serial);
        if asset_tag.is_none() && serial.is_none() {
            return Err(Error::InvalidRequest("Either asset_tag or serial required".to_string()));
        }

        let rows = self.store.find_pairs(asset_tag, serial)?;
        let Some(first) = rows.first() else {
            return Err(Error::NotFound("No pairs found".to_string()));
        };

        let view = PairHistoryView {
            asset_tag: first.pair.asset_tag.clone(),
            serial: first.pair.serial.clone(),
            status: first.tag_status.unwrap_or_default(),
            history: rows.into_iter().map(|row| HistoryEntry::from(row.pair)).collect(),
        };
        debug!("Search matched {} pairs", view.history.len());
        Ok(view)
    }

    /// Move the most recent binding found by `search_by = value` to a new
    /// tag and/or serial, appending a fresh history row.
    ///
    /// The original tag keeps its status and last serial.
    pub fn replace_pair(&self, request: &ReplaceRequest, actor: &str) -> Result<ReplaceResult> {
        let search_by = non_empty(&request.search_by);
        let value = non_empty(&request.value);
        let new_asset_tag = non_empty(&request.new_asset_tag);
        let new_serial = non_empty(&request.new_serial);

        let (Some(search_by), Some(value)) = (search_by, value) else {
            return Err(Error::InvalidRequest("Missing required parameters".to_string()));
        };
        if new_asset_tag.is_none() && new_serial.is_none() {
            return Err(Error::InvalidRequest("Missing required parameters".to_string()));
        }
        let search_by: SearchBy = search_by.parse()?;

        let now = self.clock.now();
        let (asset_tag, serial) = self.store.write(|tx| {
            let existing = tx
                .latest_pair(search_by, value)?
                .ok_or_else(|| Error::NotFound("No matching pair found".to_string()))?;

            let asset_tag = new_asset_tag.unwrap_or(existing.asset_tag.as_str()).to_string();
            let serial = new_serial.unwrap_or(existing.serial.as_str()).to_string();

            tx.ensure_tag(&asset_tag, &now)?;
            tx.append_pair(&asset_tag, &serial, actor, &now)?;
            tx.mark_tag_used(&asset_tag, &serial, &now)?;
            Ok((asset_tag, serial))
        })?;

        info!("{} replaced {} {} -> {} / {}", actor, search_by, value, asset_tag, serial);
        Ok(ReplaceResult {
            success: true,
            message: format!("Successfully replaced {} {} with new serial {}", search_by, value, serial),
            asset_tag,
            serial,
        })
    }
}
