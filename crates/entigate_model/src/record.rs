//! Versioned records.

use crate::id::ResourceId;
use crate::types::{Timestamp, Version};
use crate::value::{Fields, Value};
use serde::{Deserialize, Serialize};

/// The latest committed state of a resource.
///
/// Records are never mutated in place: each committed mutation produces a
/// new record with the next version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedRecord {
    /// Resource identifier.
    pub id: ResourceId,
    /// Version produced by the commit that wrote this record.
    pub version: Version,
    /// Current field values.
    pub fields: Fields,
    /// When the producing commit happened.
    pub updated_at: Timestamp,
}

impl VersionedRecord {
    /// Creates a new record.
    pub fn new(id: ResourceId, version: Version, fields: Fields, updated_at: Timestamp) -> Self {
        Self {
            id,
            version,
            fields,
            updated_at,
        }
    }

    /// Returns the value of a field, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns a copy of this record at the next version with new fields.
    #[must_use]
    pub fn successor(&self, fields: Fields, updated_at: Timestamp) -> Self {
        Self {
            id: self.id,
            version: self.version.next(),
            fields,
            updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successor_bumps_version_only() {
        let mut fields = Fields::new();
        fields.insert("title".into(), Value::from("a"));
        let record = VersionedRecord::new(
            ResourceId::new(),
            Version::INITIAL,
            fields.clone(),
            Timestamp::from_millis(1),
        );

        let next = record.successor(fields, Timestamp::from_millis(2));
        assert_eq!(next.id, record.id);
        assert_eq!(next.version, Version::new(2));
        assert_eq!(next.get("title"), Some(&Value::from("a")));
        assert_eq!(next.updated_at, Timestamp::from_millis(2));
    }
}
