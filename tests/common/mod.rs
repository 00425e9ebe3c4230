//! Shared test utilities and helpers for dupegate tests.
//!
//! This module provides common functionality used across integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dupegate::{Entry, MemoryStore, Record, Store, StoreError};
use serde_json::Value;
use tempfile::TempDir;
use uuid::Uuid;

/// Creates a temporary directory for test data.
///
/// The directory is automatically cleaned up when the `TempDir` is dropped.
pub fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temporary directory")
}

/// Unwraps a `json!` object literal into a record.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("test record must be an object, got {other}"),
    }
}

/// Store wrapper whose `put` can be switched to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
    put_attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `put` calls fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `put` calls seen so far, including failed ones.
    pub fn put_attempts(&self) -> usize {
        self.put_attempts.load(Ordering::SeqCst)
    }
}

impl Store for FlakyStore {
    fn put(&self, entry: &Entry) -> Result<(), StoreError> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("backend offline".to_string()));
        }
        self.inner.put(entry)
    }

    fn get(&self, id: Uuid) -> Result<Entry, StoreError> {
        self.inner.get(id)
    }

    fn count(&self) -> Result<usize, StoreError> {
        self.inner.count()
    }

    fn entries(&self) -> Result<Vec<Entry>, StoreError> {
        self.inner.entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_temp_dir() {
        let dir = create_temp_dir();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_flaky_store_toggles() {
        let store = FlakyStore::new();
        let entry = Entry::new(Record::new(), dupegate::fingerprint("{}"));

        store.set_failing(true);
        assert!(store.put(&entry).is_err());
        store.set_failing(false);
        assert!(store.put(&entry).is_ok());
        assert_eq!(store.put_attempts(), 2);
        assert_eq!(store.count().unwrap(), 1);
    }
}
