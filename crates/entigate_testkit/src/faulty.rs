//! Fault injection for record stores.

use entigate_model::{EntityName, ResourceId, Version, VersionedRecord};
use entigate_storage::{RecordStore, RecordWrite, StorageError, StorageResult};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A record store wrapper that fails a configurable number of calls.
///
/// Failures are reported as [`StorageError::Unavailable`] before the inner
/// store is touched, so a failed commit never changes state.
#[derive(Debug, Default)]
pub struct FaultyStore<S> {
    inner: S,
    fail_gets: AtomicUsize,
    fail_commits: AtomicUsize,
    commits: AtomicUsize,
}

impl<S: RecordStore> FaultyStore<S> {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_gets: AtomicUsize::new(0),
            fail_commits: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
        }
    }

    /// Fails the next `n` reads.
    pub fn fail_next_gets(&self, n: usize) {
        self.fail_gets.store(n, Ordering::SeqCst);
    }

    /// Fails the next `n` commits.
    pub fn fail_next_commits(&self, n: usize) {
        self.fail_commits.store(n, Ordering::SeqCst);
    }

    /// Number of commits forwarded to the inner store.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn take_fault(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl<S: RecordStore> RecordStore for FaultyStore<S> {
    fn get(&self, entity: &EntityName, id: ResourceId) -> StorageResult<Option<VersionedRecord>> {
        if take_fault(&self.fail_gets) {
            return Err(StorageError::unavailable("injected read fault"));
        }
        self.inner.get(entity, id)
    }

    fn commit(
        &self,
        entity: &EntityName,
        id: ResourceId,
        write: RecordWrite,
        expected: Option<Version>,
    ) -> StorageResult<bool> {
        if take_fault(&self.fail_commits) {
            return Err(StorageError::unavailable("injected commit fault"));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit(entity, id, write, expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entigate_model::{Fields, Timestamp};
    use entigate_storage::InMemoryRecordStore;

    #[test]
    fn faults_are_consumed_in_order() {
        let store = FaultyStore::new(InMemoryRecordStore::new());
        let entity = EntityName::from("post");
        let id = ResourceId::new();
        let record = VersionedRecord::new(id, Version::INITIAL, Fields::new(), Timestamp::from_millis(0));

        store.fail_next_commits(1);
        assert!(store.commit(&entity, id, RecordWrite::Put(record.clone()), None).is_err());
        assert!(store.inner().is_empty());
        assert!(store.commit(&entity, id, RecordWrite::Put(record), None).unwrap());
        assert_eq!(store.commit_count(), 1);

        store.fail_next_gets(2);
        assert!(store.get(&entity, id).is_err());
        assert!(store.get(&entity, id).is_err());
        assert!(store.get(&entity, id).unwrap().is_some());
    }
}
