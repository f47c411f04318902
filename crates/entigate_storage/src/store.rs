//! Record store trait definition.

use crate::error::StorageResult;
use entigate_model::{EntityName, ResourceId, Version, VersionedRecord};

/// A write handed to [`RecordStore::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordWrite {
    /// Insert or replace the live record.
    Put(VersionedRecord),
    /// Remove the live record.
    Delete,
}

impl RecordWrite {
    /// Returns the record being written, if any.
    #[must_use]
    pub fn record(&self) -> Option<&VersionedRecord> {
        match self {
            Self::Put(record) => Some(record),
            Self::Delete => None,
        }
    }
}

/// Persistence collaborator for versioned records.
///
/// Record stores hold only the **latest** committed record per resource;
/// the audit history lives elsewhere. EntiGate drives a store through two
/// calls, and uses `commit` exactly once per mutation.
///
/// # Invariants
///
/// - `get` returns the last successfully committed record, or `None`
/// - `commit` is an atomic compare-and-set on the live version:
///   - `expected = None` succeeds only if no live record exists
///   - `expected = Some(v)` succeeds only if the live record has version `v`
/// - `commit` returning `Ok(false)` leaves the store unchanged
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryRecordStore`] - For testing and embedded use
pub trait RecordStore: Send + Sync {
    /// Fetches the live record for a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn get(&self, entity: &EntityName, id: ResourceId) -> StorageResult<Option<VersionedRecord>>;

    /// Applies `write` if the live version matches `expected`.
    ///
    /// Returns `Ok(true)` when the write was applied and `Ok(false)` on a
    /// version mismatch.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails; in that case the
    /// write must not have been applied.
    fn commit(
        &self,
        entity: &EntityName,
        id: ResourceId,
        write: RecordWrite,
        expected: Option<Version>,
    ) -> StorageResult<bool>;
}

impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    fn get(&self, entity: &EntityName, id: ResourceId) -> StorageResult<Option<VersionedRecord>> {
        (**self).get(entity, id)
    }

    fn commit(
        &self,
        entity: &EntityName,
        id: ResourceId,
        write: RecordWrite,
        expected: Option<Version>,
    ) -> StorageResult<bool> {
        (**self).commit(entity, id, write, expected)
    }
}
