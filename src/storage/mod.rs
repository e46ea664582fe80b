//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - asset_tags(tag, status, last_serial, updated_at)
//! - pairs(id, asset_tag, serial, assigned_by, assigned_at)

pub mod schema;
pub mod sqlite;

pub use sqlite::{DbStats, PairWithStatus, SqliteStore, WriteTx};
