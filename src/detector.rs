//! Duplicate detection over content fingerprints.
//!
//! [`RedundancyDetector`] owns the fingerprint index and the running
//! statistics. Every submission is decided inside a single critical section
//! covering lookup, persistence, and index insert, so concurrent callers
//! submitting the same content cannot both be told it is new.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{DedupError, Result, StoreError};
use crate::fingerprint::Fingerprint;
use crate::normalize::{Normalizer, Record};
use crate::store::{Entry, Store};

/// Field shown in the summary of a rejected submission's existing entry.
pub const DEFAULT_DISPLAY_FIELD: &str = "name";

/// Why a submission was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    /// An entry with the same fingerprint is already stored.
    DuplicateFound,
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Decision {
    /// The record was new and has been stored.
    Added { id: Uuid, fingerprint: Fingerprint },
    /// The record's content matches an existing entry; nothing was stored.
    Rejected {
        reason: RejectReason,
        existing_id: Uuid,
        existing_summary: String,
    },
}

impl Decision {
    pub fn is_added(&self) -> bool {
        matches!(self, Decision::Added { .. })
    }
}

/// Running counters. `total_processed == duplicates_rejected + unique_added`
/// always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_processed: u64,
    pub duplicates_rejected: u64,
    pub unique_added: u64,
}

/// Statistics plus the store's current entry count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Report {
    #[serde(flatten)]
    pub stats: Statistics,
    pub total_stored: usize,
}

#[derive(Default)]
struct State {
    index: HashMap<Fingerprint, Entry>,
    stats: Statistics,
}

/// Decides add-vs-reject for incoming records.
pub struct RedundancyDetector {
    normalizer: Normalizer,
    display_field: String,
    store: Arc<dyn Store>,
    state: Mutex<State>,
}

impl RedundancyDetector {
    /// Create a detector backed by `store`.
    ///
    /// Entries already present in the store are loaded into the index, so a
    /// persistent store keeps rejecting content accepted by an earlier run.
    /// Stored records are re-fingerprinted with `normalizer`, since the
    /// volatile field set may differ from the one they were written under;
    /// the earliest entry wins when several collapse to one fingerprint.
    /// Statistics start at zero.
    pub fn new(store: Arc<dyn Store>, normalizer: Normalizer) -> Result<Self> {
        let mut index = HashMap::new();
        for entry in store.entries()? {
            let fingerprint = Fingerprint::of(&normalizer.normalize(&entry.record)?);
            index.entry(fingerprint).or_insert(entry);
        }
        if !index.is_empty() {
            tracing::info!("Loaded {} existing entries into the index", index.len());
        }

        Ok(Self {
            normalizer,
            display_field: DEFAULT_DISPLAY_FIELD.to_string(),
            store,
            state: Mutex::new(State {
                index,
                stats: Statistics::default(),
            }),
        })
    }

    /// Use `field` instead of `name` when summarizing existing entries.
    pub fn with_display_field(mut self, field: impl Into<String>) -> Self {
        self.display_field = field.into();
        self
    }

    /// Submit a record for deduplication.
    ///
    /// On a miss the record is persisted and `Added` is returned; on a hit
    /// `Rejected` references the entry that already holds this content. If the
    /// store fails to persist, the error is returned and neither the index nor
    /// the statistics change.
    pub fn submit(&self, record: Record) -> Result<Decision> {
        let form = self.normalizer.normalize(&record)?;
        let fingerprint = Fingerprint::of(&form);

        let mut state = self.lock();

        if let Some(existing) = state.index.get(&fingerprint) {
            let existing_id = existing.id;
            let existing_summary = self.summarize(existing);

            state.stats.total_processed += 1;
            state.stats.duplicates_rejected += 1;

            tracing::debug!(
                "Rejected duplicate {} of entry {}",
                fingerprint.short(),
                existing_id
            );

            return Ok(Decision::Rejected {
                reason: RejectReason::DuplicateFound,
                existing_id,
                existing_summary,
            });
        }

        let entry = Entry::new(record, fingerprint.clone());
        let id = entry.id;

        if let Err(e) = self.store.put(&entry) {
            tracing::warn!("Failed to store entry {} ({}): {}", id, fingerprint.short(), e);
            return Err(DedupError::StorageFailure(e));
        }

        state.index.insert(fingerprint.clone(), entry);
        state.stats.total_processed += 1;
        state.stats.unique_added += 1;

        tracing::info!("Added entry {} ({})", id, fingerprint.short());

        Ok(Decision::Added { id, fingerprint })
    }

    /// Submit an arbitrary JSON value; anything but an object is rejected as
    /// [`DedupError::InvalidRecord`].
    pub fn submit_value(&self, value: Value) -> Result<Decision> {
        match value {
            Value::Object(record) => self.submit(record),
            other => Err(DedupError::InvalidRecord(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parse `json` and submit it.
    pub fn submit_json(&self, json: &str) -> Result<Decision> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| DedupError::InvalidRecord(format!("malformed JSON: {e}")))?;
        self.submit_value(value)
    }

    /// Point-in-time copy of the statistics.
    pub fn stats_snapshot(&self) -> Statistics {
        self.lock().stats
    }

    /// Statistics together with the number of entries in the store.
    pub fn report(&self) -> std::result::Result<Report, StoreError> {
        let stats = self.stats_snapshot();
        Ok(Report {
            stats,
            total_stored: self.store.count()?,
        })
    }

    /// Zero the statistics. The index and stored entries are kept.
    pub fn reset(&self) {
        self.lock().stats = Statistics::default();
    }

    /// Number of distinct fingerprints in the index.
    pub fn len(&self) -> usize {
        self.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // The state is only written after every fallible step has succeeded, so
    // a poisoned lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn summarize(&self, existing: &Entry) -> String {
        let stored = match self.store.get(existing.id) {
            Ok(entry) => Some(entry),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => {
                tracing::debug!("Could not fetch entry {} for summary: {}", existing.id, e);
                None
            }
        };
        let record = stored.as_ref().map_or(&existing.record, |e| &e.record);

        match record.get(&self.display_field) {
            Some(Value::String(s)) => format!("{} (ID: {})", s, existing.id),
            Some(Value::Null) | None => format!("entry {}", existing.id),
            Some(other) => format!("{} (ID: {})", other, existing.id),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
