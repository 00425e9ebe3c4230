//! SHA-256 content fingerprints over canonical record text.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::normalize::CanonicalForm;

/// Length of a hex-encoded SHA-256 digest.
pub const FINGERPRINT_LEN: usize = 64;

/// Lowercase hex SHA-256 digest identifying a canonical form's content.
///
/// Equal fingerprints mean equal canonical text, up to the (negligible)
/// chance of a SHA-256 collision. This is a content identity, not a
/// security boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a canonical form.
    pub fn of(form: &CanonicalForm) -> Self {
        fingerprint(form.as_str())
    }

    /// Accept a previously rendered fingerprint, e.g. one read back from storage.
    ///
    /// Returns `None` unless `hex` is exactly 64 lowercase hex digits.
    pub fn parse(hex: &str) -> Option<Self> {
        let valid = hex.len() == FINGERPRINT_LEN
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(hex.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 16 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..16]
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(hex: String) -> Result<Self, Self::Error> {
        Self::parse(&hex).ok_or_else(|| format!("invalid fingerprint '{hex}'"))
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash the UTF-8 bytes of `canonical_text`.
pub fn fingerprint(canonical_text: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(canonical_text.as_bytes());
    Fingerprint(hex::encode(hasher.finalize()))
}
