//! In-memory record store.

use crate::error::{StorageError, StorageResult};
use crate::store::{RecordStore, RecordWrite};
use entigate_model::{EntityName, ResourceId, Version, VersionedRecord};
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory record store.
///
/// This store keeps all live records in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Embedded use where persistence is handled elsewhere
///
/// # Thread Safety
///
/// The compare-and-set in `commit` runs under a single write lock, so two
/// concurrent commits against the same version cannot both succeed.
///
/// # Example
///
/// ```rust
/// use entigate_model::{EntityName, Fields, ResourceId, Timestamp, Version, VersionedRecord};
/// use entigate_storage::{InMemoryRecordStore, RecordStore, RecordWrite};
///
/// let store = InMemoryRecordStore::new();
/// let post = EntityName::from("post");
/// let id = ResourceId::new();
/// let record = VersionedRecord::new(id, Version::INITIAL, Fields::new(), Timestamp::now());
///
/// assert!(store.commit(&post, id, RecordWrite::Put(record), None).unwrap());
/// assert_eq!(store.get(&post, id).unwrap().unwrap().version, Version::INITIAL);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<(EntityName, ResourceId), VersionedRecord>>,
}

impl InMemoryRecordStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live records across all entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store holds no live records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns all live records of an entity.
    #[must_use]
    pub fn list(&self, entity: &EntityName) -> Vec<VersionedRecord> {
        let mut records: Vec<_> = self
            .records
            .read()
            .iter()
            .filter(|((name, _), _)| name == entity)
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by_key(|record| record.id);
        records
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get(&self, entity: &EntityName, id: ResourceId) -> StorageResult<Option<VersionedRecord>> {
        Ok(self.records.read().get(&(entity.clone(), id)).cloned())
    }

    fn commit(
        &self,
        entity: &EntityName,
        id: ResourceId,
        write: RecordWrite,
        expected: Option<Version>,
    ) -> StorageResult<bool> {
        if let Some(record) = write.record() {
            if record.id != id {
                return Err(StorageError::IdMismatch {
                    target: id.to_string(),
                    record: record.id.to_string(),
                });
            }
        }

        let key = (entity.clone(), id);
        let mut records = self.records.write();
        let live = records.get(&key).map(|record| record.version);
        if live != expected {
            return Ok(false);
        }

        match write {
            RecordWrite::Put(record) => {
                records.insert(key, record);
            }
            RecordWrite::Delete => {
                records.remove(&key);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entigate_model::{Fields, Timestamp, Value};

    fn record(id: ResourceId, version: u64) -> VersionedRecord {
        let mut fields = Fields::new();
        fields.insert("n".into(), Value::Integer(version as i64));
        VersionedRecord::new(id, Version::new(version), fields, Timestamp::from_millis(0))
    }

    #[test]
    fn insert_requires_absent_record() {
        let store = InMemoryRecordStore::new();
        let entity = EntityName::from("post");
        let id = ResourceId::new();

        assert!(store
            .commit(&entity, id, RecordWrite::Put(record(id, 1)), None)
            .unwrap());
        assert!(!store
            .commit(&entity, id, RecordWrite::Put(record(id, 1)), None)
            .unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn commit_compares_live_version() {
        let store = InMemoryRecordStore::new();
        let entity = EntityName::from("post");
        let id = ResourceId::new();
        store
            .commit(&entity, id, RecordWrite::Put(record(id, 1)), None)
            .unwrap();

        assert!(!store
            .commit(&entity, id, RecordWrite::Put(record(id, 3)), Some(Version::new(2)))
            .unwrap());
        assert!(store
            .commit(&entity, id, RecordWrite::Put(record(id, 2)), Some(Version::new(1)))
            .unwrap());

        let live = store.get(&entity, id).unwrap().unwrap();
        assert_eq!(live.version, Version::new(2));
    }

    #[test]
    fn delete_removes_live_record() {
        let store = InMemoryRecordStore::new();
        let entity = EntityName::from("post");
        let id = ResourceId::new();
        store
            .commit(&entity, id, RecordWrite::Put(record(id, 1)), None)
            .unwrap();

        assert!(store
            .commit(&entity, id, RecordWrite::Delete, Some(Version::new(1)))
            .unwrap());
        assert!(store.get(&entity, id).unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn entities_are_isolated() {
        let store = InMemoryRecordStore::new();
        let id = ResourceId::new();
        store
            .commit(&EntityName::from("post"), id, RecordWrite::Put(record(id, 1)), None)
            .unwrap();

        assert!(store.get(&EntityName::from("comment"), id).unwrap().is_none());
        assert_eq!(store.list(&EntityName::from("post")).len(), 1);
    }

    #[test]
    fn mismatched_record_id_is_rejected() {
        let store = InMemoryRecordStore::new();
        let entity = EntityName::from("post");
        let result = store.commit(
            &entity,
            ResourceId::new(),
            RecordWrite::Put(record(ResourceId::new(), 1)),
            None,
        );
        assert!(matches!(result, Err(StorageError::IdMismatch { .. })));
    }
}
