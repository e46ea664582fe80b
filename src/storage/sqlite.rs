//! SQLite storage implementation

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior};

use super::schema;
use crate::clock::{from_millis, to_millis};
use crate::pair::{Pair, SearchBy};
use crate::tag::{Tag, TagStatus};
use crate::{Error, Result};

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const PAIR_COLUMNS: &str = "id, asset_tag, serial, assigned_by, assigned_at";

/// SQLite-backed storage for the tag registry and pair ledger
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open a database file, waiting up to `timeout` for other writers
    pub fn open_with_busy_timeout(path: &Path, timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Initialize the database schema
    fn initialize_schema(conn: &Connection) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Run `f` inside one IMMEDIATE transaction.
    ///
    /// The write lock is taken up front, so concurrent writers serialize
    /// instead of interleaving reads and writes on the same rows. The
    /// transaction commits only if `f` returns `Ok`.
    pub fn write<T>(&self, f: impl FnOnce(&WriteTx<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let wtx = WriteTx { tx };
        let value = f(&wtx)?;
        wtx.tx.commit()?;
        Ok(value)
    }

    // ========== Tag Operations ==========

    /// List tags ordered by tag, optionally only those updated strictly after `since`
    pub fn list_tags(&self, since: Option<&DateTime<Utc>>) -> Result<Vec<Tag>> {
        let conn = self.lock()?;
        let tags = match since {
            Some(since) => {
                let mut stmt = conn.prepare(
                    "SELECT tag, status, last_serial, updated_at FROM asset_tags WHERE updated_at > ?1 ORDER BY tag",
                )?;
                let rows = stmt.query_map([to_millis(since)], row_to_tag)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt =
                    conn.prepare("SELECT tag, status, last_serial, updated_at FROM asset_tags ORDER BY tag")?;
                let rows = stmt.query_map([], row_to_tag)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(tags)
    }

    /// Get a tag by key
    pub fn get_tag(&self, tag: &str) -> Result<Option<Tag>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT tag, status, last_serial, updated_at FROM asset_tags WHERE tag = ?1",
            [tag],
            row_to_tag,
        )
        .optional()
        .map_err(Into::into)
    }

    // ========== Pair Operations ==========

    /// Find pairs matching every supplied filter, joined with their tag's status.
    ///
    /// Most recent first; rows with equal `assigned_at` fall back to
    /// insertion order.
    pub fn find_pairs(&self, asset_tag: Option<&str>, serial: Option<&str>) -> Result<Vec<PairWithStatus>> {
        let mut sql = String::from(
            "SELECT p.id, p.asset_tag, p.serial, p.assigned_by, p.assigned_at, t.status \
             FROM pairs p LEFT JOIN asset_tags t ON p.asset_tag = t.tag WHERE 1=1",
        );
        let mut values: Vec<&str> = Vec::new();
        if let Some(asset_tag) = asset_tag {
            values.push(asset_tag);
            sql.push_str(&format!(" AND p.asset_tag = ?{}", values.len()));
        }
        if let Some(serial) = serial {
            values.push(serial);
            sql.push_str(&format!(" AND p.serial = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY p.assigned_at DESC, p.id DESC");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            let pair = row_to_pair(row)?;
            let status: Option<String> = row.get(5)?;
            let tag_status = status
                .map(|s| {
                    s.parse::<TagStatus>().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
                    })
                })
                .transpose()?;
            Ok(PairWithStatus { pair, tag_status })
        })?;
        let pairs = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }

    /// Count pair rows for an exact `(asset_tag, serial)` key
    pub fn count_pairs_for(&self, asset_tag: &str, serial: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pairs WHERE asset_tag = ?1 AND serial = ?2",
            [asset_tag, serial],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.lock()?;
        let (tags, used_tags): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(CASE WHEN status = 'used' THEN 1 END) FROM asset_tags",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let pairs: i64 = conn.query_row("SELECT COUNT(*) FROM pairs", [], |row| row.get(0))?;
        Ok(DbStats {
            tags: tags as usize,
            used_tags: used_tags as usize,
            unused_tags: (tags - used_tags) as usize,
            pairs: pairs as usize,
        })
    }
}

/// Write-side storage primitives, only reachable inside [`SqliteStore::write`].
pub struct WriteTx<'c> {
    tx: Transaction<'c>,
}

impl WriteTx<'_> {
    /// Register a tag as `unused` unless it already exists.
    ///
    /// Returns `true` when the tag was created.
    pub fn ensure_tag(&self, tag: &str, now: &DateTime<Utc>) -> Result<bool> {
        let created = self.tx.execute(
            "INSERT INTO asset_tags (tag, status, last_serial, updated_at) VALUES (?1, 'unused', NULL, ?2) \
             ON CONFLICT(tag) DO NOTHING",
            params![tag, to_millis(now)],
        )?;
        Ok(created > 0)
    }

    /// Newest pair row id for an exact `(asset_tag, serial)` key
    pub fn find_pair_id(&self, asset_tag: &str, serial: &str) -> Result<Option<i64>> {
        self.tx
            .query_row(
                "SELECT id FROM pairs WHERE asset_tag = ?1 AND serial = ?2 ORDER BY id DESC LIMIT 1",
                [asset_tag, serial],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Write a pair keyed by `(asset_tag, serial)`, overwriting the newest
    /// existing row for that key in place.
    ///
    /// Returns `true` when an existing row was overwritten.
    pub fn upsert_pair(&self, asset_tag: &str, serial: &str, assigned_by: &str, assigned_at: &DateTime<Utc>) -> Result<bool> {
        match self.find_pair_id(asset_tag, serial)? {
            Some(id) => {
                self.tx.execute(
                    "UPDATE pairs SET assigned_by = ?1, assigned_at = ?2 WHERE id = ?3",
                    params![assigned_by, to_millis(assigned_at), id],
                )?;
                Ok(true)
            }
            None => {
                self.append_pair(asset_tag, serial, assigned_by, assigned_at)?;
                Ok(false)
            }
        }
    }

    /// Append a new pair row, even if the key already exists
    pub fn append_pair(&self, asset_tag: &str, serial: &str, assigned_by: &str, assigned_at: &DateTime<Utc>) -> Result<i64> {
        self.tx.execute(
            "INSERT INTO pairs (asset_tag, serial, assigned_by, assigned_at) VALUES (?1, ?2, ?3, ?4)",
            params![asset_tag, serial, assigned_by, to_millis(assigned_at)],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Mark a registered tag as used and bound to `serial`
    pub fn mark_tag_used(&self, tag: &str, serial: &str, now: &DateTime<Utc>) -> Result<()> {
        let updated = self.tx.execute(
            "UPDATE asset_tags SET status = ?1, last_serial = ?2, updated_at = ?3 WHERE tag = ?4",
            params![TagStatus::Used.as_str(), serial, to_millis(now), tag],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Tag {} is not registered", tag)));
        }
        Ok(())
    }

    /// Most recent pair whose `by` column equals `value`
    pub fn latest_pair(&self, by: SearchBy, value: &str) -> Result<Option<Pair>> {
        let sql = format!(
            "SELECT {} FROM pairs WHERE {} = ?1 ORDER BY assigned_at DESC, id DESC LIMIT 1",
            PAIR_COLUMNS,
            by.column()
        );
        self.tx
            .query_row(&sql, [value], row_to_pair)
            .optional()
            .map_err(Into::into)
    }
}

/// Helper to convert a row to a Tag
fn row_to_tag(row: &rusqlite::Row) -> rusqlite::Result<Tag> {
    let status_str: String = row.get(1)?;
    let status: TagStatus = status_str.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Tag {
        tag: row.get(0)?,
        status,
        last_serial: row.get(2)?,
        updated_at: timestamp_at(row, 3)?,
    })
}

/// Helper to convert a row selected with `PAIR_COLUMNS` to a Pair
fn row_to_pair(row: &rusqlite::Row) -> rusqlite::Result<Pair> {
    Ok(Pair {
        id: row.get(0)?,
        asset_tag: row.get(1)?,
        serial: row.get(2)?,
        assigned_by: row.get(3)?,
        assigned_at: timestamp_at(row, 4)?,
    })
}

fn timestamp_at(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    from_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

/// A pair row with the current status of its tag (if the tag row exists)
#[derive(Debug, Clone)]
pub struct PairWithStatus {
    pub pair: Pair,
    pub tag_status: Option<TagStatus>,
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DbStats {
    pub tags: usize,
    pub used_tags: usize,
    pub unused_tags: usize,
    pub pairs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_ensure_tag_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();

        let created = store.write(|tx| tx.ensure_tag("T1", &at(0))).unwrap();
        assert!(created);
        let created_again = store.write(|tx| tx.ensure_tag("T1", &at(5))).unwrap();
        assert!(!created_again);

        let tag = store.get_tag("T1").unwrap().unwrap();
        assert_eq!(tag.status, TagStatus::Unused);
        assert_eq!(tag.last_serial, None);
        assert_eq!(tag.updated_at, at(0));
    }

    #[test]
    fn test_upsert_overwrites_same_key() {
        let store = SqliteStore::open_in_memory().unwrap();

        let first = store
            .write(|tx| {
                tx.ensure_tag("T1", &at(0))?;
                tx.upsert_pair("T1", "S1", "alice", &at(0))
            })
            .unwrap();
        let second = store.write(|tx| tx.upsert_pair("T1", "S1", "bob", &at(10))).unwrap();

        assert!(!first);
        assert!(second);
        assert_eq!(store.count_pairs_for("T1", "S1").unwrap(), 1);

        let rows = store.find_pairs(Some("T1"), None).unwrap();
        assert_eq!(rows[0].pair.assigned_by, "bob");
        assert_eq!(rows[0].pair.assigned_at, at(10));
    }

    #[test]
    fn test_append_duplicates_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                tx.ensure_tag("T1", &at(0))?;
                tx.append_pair("T1", "S1", "alice", &at(0))?;
                tx.append_pair("T1", "S1", "alice", &at(1))
            })
            .unwrap();
        assert_eq!(store.count_pairs_for("T1", "S1").unwrap(), 2);
    }

    #[test]
    fn test_pair_requires_registered_tag() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result = store.write(|tx| tx.append_pair("ghost", "S1", "alice", &at(0)));
        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(store.stats().unwrap().pairs, 0);
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result: Result<()> = store.write(|tx| {
            tx.ensure_tag("T1", &at(0))?;
            tx.mark_tag_used("T2", "S1", &at(0))
        });
        assert!(result.is_err());
        assert!(store.get_tag("T1").unwrap().is_none());
    }

    #[test]
    fn test_list_tags_since_is_strict() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                tx.ensure_tag("B", &at(10))?;
                tx.ensure_tag("A", &at(20))?;
                tx.ensure_tag("C", &at(30))
            })
            .unwrap();

        let all: Vec<_> = store.list_tags(None).unwrap().into_iter().map(|t| t.tag).collect();
        assert_eq!(all, vec!["A", "B", "C"]);

        let since: Vec<_> = store.list_tags(Some(&at(20))).unwrap().into_iter().map(|t| t.tag).collect();
        assert_eq!(since, vec!["C"]);
    }

    #[test]
    fn test_latest_pair_prefers_newest_assignment() {
        let store = SqliteStore::open_in_memory().unwrap();
        let latest = store
            .write(|tx| {
                tx.ensure_tag("T1", &at(0))?;
                tx.ensure_tag("T2", &at(0))?;
                tx.append_pair("T2", "S1", "alice", &at(50))?;
                tx.append_pair("T1", "S1", "alice", &at(10))?;
                tx.latest_pair(SearchBy::Serial, "S1")
            })
            .unwrap()
            .unwrap();
        assert_eq!(latest.asset_tag, "T2");
    }

    #[test]
    fn test_find_pairs_joins_status() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                tx.ensure_tag("T1", &at(0))?;
                tx.append_pair("T1", "S1", "alice", &at(1))?;
                tx.mark_tag_used("T1", "S1", &at(1))
            })
            .unwrap();

        let rows = store.find_pairs(None, Some("S1")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tag_status, Some(TagStatus::Used));
        assert!(store.find_pairs(Some("T1"), Some("S2")).unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                tx.ensure_tag("T1", &at(0))?;
                tx.ensure_tag("T2", &at(0))?;
                tx.append_pair("T1", "S1", "alice", &at(1))?;
                tx.mark_tag_used("T1", "S1", &at(1))
            })
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.tags, 2);
        assert_eq!(stats.used_tags, 1);
        assert_eq!(stats.unused_tags, 1);
        assert_eq!(stats.pairs, 1);
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.write(|tx| tx.ensure_tag("T1", &at(0))).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.get_tag("T1").unwrap().is_some());
    }
}
