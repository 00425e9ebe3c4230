//! Storage backends for unique entries.
//!
//! The detector only talks to storage through the [`Store`] trait. Two
//! implementations are provided: [`MemoryStore`], a process-local simulator,
//! and [`SqliteStore`], which persists entries in SQLite with WAL mode.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::fingerprint::Fingerprint;
use crate::normalize::Record;

/// A stored unique record.
///
/// Created once per distinct fingerprint and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: Uuid,
    pub record: Record,
    pub fingerprint: Fingerprint,
    /// Unix timestamp (seconds) at which the entry was created.
    pub inserted_at: u64,
}

impl Entry {
    /// Build a new entry with a fresh random id, stamped with the current time.
    pub fn new(record: Record, fingerprint: Fingerprint) -> Self {
        Self {
            id: Uuid::new_v4(),
            record,
            fingerprint,
            inserted_at: current_timestamp(),
        }
    }
}

/// Current Unix time in seconds, or 0 if the clock is before the epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Persistence collaborator for unique entries.
pub trait Store: Send + Sync {
    /// Persist a new entry. Retrying with the same entry id is a no-op.
    fn put(&self, entry: &Entry) -> Result<(), StoreError>;

    /// Fetch an entry by id, or [`StoreError::NotFound`].
    fn get(&self, id: Uuid) -> Result<Entry, StoreError>;

    /// Number of stored entries.
    fn count(&self) -> Result<usize, StoreError>;

    /// All stored entries in insertion order.
    fn entries(&self) -> Result<Vec<Entry>, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    order: Vec<Uuid>,
    by_id: HashMap<Uuid, Entry>,
}

/// In-memory store. Never fails unless its lock is poisoned.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl Store for MemoryStore {
    fn put(&self, entry: &Entry) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.by_id.contains_key(&entry.id) {
            inner.order.push(entry.id);
            inner.by_id.insert(entry.id, entry.clone());
        }
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Entry, StoreError> {
        self.lock()?
            .by_id
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.by_id.len())
    }

    fn entries(&self) -> Result<Vec<Entry>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.by_id.get(id).cloned())
            .collect())
    }
}

/// SQLite-backed store.
///
/// Uses WAL mode for durability. Thread-safe via internal Mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates a store at the given path (`:memory:` is accepted).
    ///
    /// Initializes the schema if it doesn't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                fingerprint TEXT NOT NULL,
                record TEXT NOT NULL,
                inserted_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_fingerprint ON entries(fingerprint)",
            [],
        )?;

        tracing::info!("Opened entry store at {}", path.as_ref().display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))
    }
}

/// Raw column values of an `entries` row.
type EntryRow = (String, String, String, i64);

fn read_row(row: &Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn entry_from_row((id, fingerprint, record, inserted_at): EntryRow) -> Result<Entry, StoreError> {
    let id = Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt(format!("id '{id}': {e}")))?;
    let fingerprint = Fingerprint::parse(&fingerprint)
        .ok_or_else(|| StoreError::Corrupt(format!("fingerprint of {id}: '{fingerprint}'")))?;
    let record: Record = serde_json::from_str(&record)?;
    let inserted_at = u64::try_from(inserted_at)
        .map_err(|_| StoreError::Corrupt(format!("inserted_at of {id}: {inserted_at}")))?;

    Ok(Entry {
        id,
        record,
        fingerprint,
        inserted_at,
    })
}

fn entry_count(raw: i64) -> Result<usize, StoreError> {
    usize::try_from(raw).map_err(|_| StoreError::Corrupt(format!("entry count {raw}")))
}

impl Store for SqliteStore {
    fn put(&self, entry: &Entry) -> Result<(), StoreError> {
        let record = serde_json::to_string(&entry.record)?;
        let inserted_at = i64::try_from(entry.inserted_at)
            .map_err(|_| StoreError::Corrupt(format!("inserted_at {}", entry.inserted_at)))?;

        let conn = self.lock()?;
        // A retried put with the same id leaves the original row untouched
        conn.execute(
            "INSERT OR IGNORE INTO entries (id, fingerprint, record, inserted_at)
             VALUES (?, ?, ?, ?)",
            (
                entry.id.to_string(),
                entry.fingerprint.as_str(),
                record,
                inserted_at,
            ),
        )?;

        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Entry, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, fingerprint, record, inserted_at FROM entries WHERE id = ?",
        )?;
        let row = stmt.query_row([id.to_string()], read_row).optional()?;

        match row {
            Some(row) => entry_from_row(row),
            None => Err(StoreError::NotFound(id)),
        }
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        entry_count(count)
    }

    fn entries(&self) -> Result<Vec<Entry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, fingerprint, record, inserted_at FROM entries ORDER BY seq",
        )?;
        let rows = stmt.query_map([], read_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(entry_from_row(row?)?);
        }
        Ok(entries)
    }
}
