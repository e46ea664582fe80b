//! # Tagledger - asset tag / serial pairing ledger
//!
//! Tracks which physical asset tag is bound to which serial number, the
//! full reassignment history of every tag, and a derived lifecycle status
//! (unused/used) per tag.
//!
//! Tagledger provides:
//! - A Tag Registry and a Pair Ledger backed by SQLite
//! - A pairing engine (list tags, batch assign, search history, replace binding)
//! - A thin HTTP surface and a CLI over the engine

pub mod clock;
pub mod config;
pub mod engine;
pub mod pair;
pub mod server;
pub mod storage;
pub mod tag;
pub mod ui;

// Re-exports for convenient access
pub use clock::{Clock, SystemClock};
pub use engine::PairingEngine;
pub use pair::{
    AssignOutcome, HistoryEntry, OutcomeStatus, Pair, PairHistoryView, ReplaceRequest,
    ReplaceResult, ScanInput, SearchBy, SearchQuery,
};
pub use storage::SqliteStore;
pub use tag::{Tag, TagStatus};

/// Result type alias for Tagledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Tagledger operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed required fields
    #[error("{0}")]
    InvalidRequest(String),

    /// No record matched the request
    #[error("{0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,

    /// Engine work on the blocking pool panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}
