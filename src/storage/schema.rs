//! Database schema definitions

/// SQL to create the tag registry table
///
/// Timestamps are Unix milliseconds (UTC).
pub const CREATE_ASSET_TAGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS asset_tags (
    tag TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'unused' CHECK (status IN ('unused', 'used')),
    last_serial TEXT,
    updated_at INTEGER NOT NULL
)
"#;

/// SQL to create the pair ledger table
///
/// `(asset_tag, serial)` is the upsert key for scans, but replace appends
/// fresh rows for an existing key, so the key is indexed rather than UNIQUE.
pub const CREATE_PAIRS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pairs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    asset_tag TEXT NOT NULL REFERENCES asset_tags(tag),
    serial TEXT NOT NULL,
    assigned_by TEXT NOT NULL,
    assigned_at INTEGER NOT NULL
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_pairs_key ON pairs(asset_tag, serial)",
    "CREATE INDEX IF NOT EXISTS idx_pairs_serial ON pairs(serial)",
    "CREATE INDEX IF NOT EXISTS idx_pairs_assigned_at ON pairs(assigned_at)",
    "CREATE INDEX IF NOT EXISTS idx_asset_tags_updated_at ON asset_tags(updated_at)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_ASSET_TAGS_TABLE, CREATE_PAIRS_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
