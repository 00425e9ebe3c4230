//! dupegate - content-hash deduplication for structured records
//!
//! Records are normalized into a canonical form, fingerprinted with SHA-256,
//! and checked against an index of previously accepted content before being
//! handed to a [`Store`].

pub mod config;
pub mod detector;
pub mod error;
pub mod fingerprint;
pub mod normalize;
pub mod store;

// Re-export main deduplication API
pub use detector::{Decision, RedundancyDetector, RejectReason, Report, Statistics};
pub use error::{DedupError, StoreError};
pub use fingerprint::{fingerprint, Fingerprint};
pub use normalize::{normalize, CanonicalForm, Normalizer, Record};
pub use store::{Entry, MemoryStore, SqliteStore, Store};
