//! The persisted counter record and its integrity tag.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Format version written into every record.
pub const RECORD_VERSION: &str = "1.0";

/// On-disk counter state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRecord {
    /// Next value to hand out.
    pub current_count: u64,
    /// Last value handed out.
    pub previous_count: u64,
    /// Epoch seconds of the last write. Diagnostic only.
    pub timestamp: i64,
    pub version: String,
    /// Hex SHA-256 over the canonical form of the three fields above.
    pub integrity_tag: String,
}

/// Canonical (sorted-key) form hashed into the integrity tag.
/// Fields are declared in key order; serde_json preserves declaration order.
#[derive(Serialize)]
struct Canonical {
    current_count: u64,
    previous_count: u64,
    timestamp: i64,
}

impl CounterRecord {
    /// Build a record stamped with the current time and a fresh tag.
    pub fn sealed(current_count: u64, previous_count: u64) -> Self {
        Self::sealed_at(current_count, previous_count, chrono::Utc::now().timestamp())
    }

    pub fn sealed_at(current_count: u64, previous_count: u64, timestamp: i64) -> Self {
        Self {
            current_count,
            previous_count,
            timestamp,
            version: RECORD_VERSION.to_string(),
            integrity_tag: integrity_tag(current_count, previous_count, timestamp),
        }
    }

    /// Recompute the tag and compare it with the stored one.
    pub fn verify(&self) -> bool {
        let expected = integrity_tag(self.current_count, self.previous_count, self.timestamp);
        self.integrity_tag.eq_ignore_ascii_case(&expected)
    }

    /// A tag match plus the ordering the service always maintains.
    pub fn is_sound(&self) -> bool {
        self.verify() && self.current_count >= 1 && self.previous_count < self.current_count
    }
}

/// Digest over `{current_count, previous_count, timestamp}`.
pub fn integrity_tag(current_count: u64, previous_count: u64, timestamp: i64) -> String {
    let canonical = Canonical {
        current_count,
        previous_count,
        timestamp,
    };
    // Serializing a struct of integers cannot fail.
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_form_is_sorted_json() {
        let canonical = Canonical {
            current_count: 5,
            previous_count: 4,
            timestamp: 1700000000,
        };
        assert_eq!(
            serde_json::to_string(&canonical).unwrap(),
            r#"{"current_count":5,"previous_count":4,"timestamp":1700000000}"#
        );
    }

    #[test]
    fn test_sealed_record_verifies() {
        let record = CounterRecord::sealed_at(12, 11, 1700000000);
        assert!(record.verify());
        assert!(record.is_sound());
        assert_eq!(record.integrity_tag.len(), 64);
        assert_eq!(record.version, RECORD_VERSION);
    }

    #[test]
    fn test_tamper_is_detected() {
        let mut record = CounterRecord::sealed_at(12, 11, 1700000000);
        record.current_count = 500;
        assert!(!record.verify());

        let mut record = CounterRecord::sealed_at(12, 11, 1700000000);
        record.timestamp += 1;
        assert!(!record.verify());
    }

    #[test]
    fn test_regressed_record_is_not_sound() {
        let record = CounterRecord::sealed_at(3, 7, 1700000000);
        assert!(record.verify());
        assert!(!record.is_sound());
    }
}
