//! Append-only history storage.

use super::entry::{apply_forward, ChangeKind, HistoryEntry, GENESIS_DIGEST};
use crate::error::{HistoryError, HistoryResult};
use entigate_model::{EntityName, Fields, ResourceId, Version};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::error;

type ChainKey = (EntityName, ResourceId);

#[derive(Debug, Default)]
struct Chain {
    entries: Arc<Vec<HistoryEntry>>,
    poisoned: bool,
}

impl Chain {
    fn latest_version(&self) -> Version {
        self.entries.last().map_or(Version::NONE, |e| e.version)
    }

    fn last_digest(&self) -> [u8; 32] {
        self.entries.last().map_or(GENESIS_DIGEST, |e| e.digest)
    }
}

/// Append-only audit history, one gapless chain per resource.
///
/// Appends copy-on-write: a [`History`] obtained from [`read`](Self::read)
/// keeps seeing the entries that existed when it was taken, and never a
/// partially appended one. Readers hold the lock only long enough to
/// clone an `Arc`.
///
/// A resource whose chain ever violated its invariants is poisoned and
/// refuses further appends.
///
/// Writers (appends, restores, verification, and every pipeline commit
/// sharing this store) are serialized on one lock. Readers never take it.
#[derive(Debug, Default)]
pub struct HistoryStore {
    chains: RwLock<HashMap<ChainKey, Chain>>,
    writes: Mutex<()>,
}

impl HistoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, sealing it with a digest chained to its predecessor.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::VersionGap`] unless the entry's version is
    /// exactly one past the latest recorded version, and
    /// [`HistoryError::Poisoned`] for a resource that failed before. Both
    /// leave the resource poisoned.
    pub fn append(&self, entry: HistoryEntry) -> HistoryResult<()> {
        let _guard = self.lock_writes();
        self.append_locked(entry)
    }

    /// Takes the writer lock. A pipeline holds it from its pre-commit
    /// checks until its history entry is appended.
    pub(crate) fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock()
    }

    /// [`append`](Self::append) for a caller already holding
    /// [`lock_writes`](Self::lock_writes).
    pub(crate) fn append_locked(&self, mut entry: HistoryEntry) -> HistoryResult<()> {
        let key = (entry.entity.clone(), entry.resource_id);
        let mut chains = self.chains.write();
        let chain = chains.entry(key).or_default();

        if chain.poisoned {
            return Err(HistoryError::Poisoned {
                entity: entry.entity,
                id: entry.resource_id,
            });
        }

        let expected = chain.latest_version().next();
        if entry.version != expected {
            chain.poisoned = true;
            error!(
                entity = %entry.entity,
                id = %entry.resource_id,
                %expected,
                found = %entry.version,
                "history version gap; resource poisoned"
            );
            return Err(HistoryError::VersionGap {
                entity: entry.entity,
                id: entry.resource_id,
                expected,
                found: entry.version,
            });
        }

        entry.digest = entry.compute_digest(&chain.last_digest());
        Arc::make_mut(&mut chain.entries).push(entry);
        Ok(())
    }

    /// Returns a snapshot of a resource's history.
    ///
    /// Unknown resources yield an empty history.
    #[must_use]
    pub fn read(&self, entity: &EntityName, id: ResourceId) -> History {
        let entries = self
            .chains
            .read()
            .get(&(entity.clone(), id))
            .map(|chain| Arc::clone(&chain.entries))
            .unwrap_or_default();
        History {
            entity: entity.clone(),
            resource_id: id,
            entries,
        }
    }

    /// Returns the latest recorded version, or [`Version::NONE`].
    #[must_use]
    pub fn latest_version(&self, entity: &EntityName, id: ResourceId) -> Version {
        self.chains
            .read()
            .get(&(entity.clone(), id))
            .map_or(Version::NONE, Chain::latest_version)
    }

    /// Returns true if the resource's history refuses appends.
    #[must_use]
    pub fn is_poisoned(&self, entity: &EntityName, id: ResourceId) -> bool {
        self.chains
            .read()
            .get(&(entity.clone(), id))
            .is_some_and(|chain| chain.poisoned)
    }

    /// Recomputes a resource's digest chain.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::DigestMismatch`] at the first entry whose
    /// digest does not match, and poisons the resource.
    pub fn verify(&self, entity: &EntityName, id: ResourceId) -> HistoryResult<()> {
        let _guard = self.lock_writes();
        let history = self.read(entity, id);
        if let Err(err) = verify_chain(history.entries(), GENESIS_DIGEST, Version::NONE) {
            error!(entity = %entity, id = %id, error = %err, "history verification failed");
            if let Some(chain) = self.chains.write().get_mut(&(entity.clone(), id)) {
                chain.poisoned = true;
            }
            return Err(err);
        }
        Ok(())
    }

    /// Imports previously exported entries, keeping their digests.
    ///
    /// Entries may span several resources. Each resource's entries must
    /// continue its existing chain, both in version and in digest. Nothing
    /// is imported unless every resource checks out.
    ///
    /// # Errors
    ///
    /// Returns the first gap, digest mismatch, or poisoned resource found.
    pub fn restore(&self, entries: impl IntoIterator<Item = HistoryEntry>) -> HistoryResult<()> {
        let mut grouped: BTreeMap<ChainKey, Vec<HistoryEntry>> = BTreeMap::new();
        for entry in entries {
            grouped
                .entry((entry.entity.clone(), entry.resource_id))
                .or_default()
                .push(entry);
        }

        let _guard = self.lock_writes();
        let mut chains = self.chains.write();
        for ((entity, id), batch) in &grouped {
            let (digest, version) = match chains.get(&(entity.clone(), *id)) {
                Some(chain) if chain.poisoned => {
                    return Err(HistoryError::Poisoned {
                        entity: entity.clone(),
                        id: *id,
                    });
                }
                Some(chain) => (chain.last_digest(), chain.latest_version()),
                None => (GENESIS_DIGEST, Version::NONE),
            };
            verify_chain(batch, digest, version)?;
        }

        for (key, batch) in grouped {
            let chain = chains.entry(key).or_default();
            Arc::make_mut(&mut chain.entries).extend(batch);
        }
        Ok(())
    }

    /// Returns the number of resources with history.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.chains.read().len()
    }
}

fn verify_chain(entries: &[HistoryEntry], mut digest: [u8; 32], mut version: Version) -> HistoryResult<()> {
    for entry in entries {
        let expected = version.next();
        if entry.version != expected {
            return Err(HistoryError::VersionGap {
                entity: entry.entity.clone(),
                id: entry.resource_id,
                expected,
                found: entry.version,
            });
        }
        if entry.compute_digest(&digest) != entry.digest {
            return Err(HistoryError::DigestMismatch {
                entity: entry.entity.clone(),
                id: entry.resource_id,
                version: entry.version,
            });
        }
        digest = entry.digest;
        version = entry.version;
    }
    Ok(())
}

/// Immutable snapshot of one resource's history, oldest entry first.
#[derive(Debug, Clone)]
pub struct History {
    entity: EntityName,
    resource_id: ResourceId,
    entries: Arc<Vec<HistoryEntry>>,
}

impl History {
    /// Returns the entity.
    #[must_use]
    pub fn entity(&self) -> &EntityName {
        &self.entity
    }

    /// Returns the resource.
    #[must_use]
    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    /// Returns all entries in version order.
    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Iterates over entries in version order.
    pub fn iter(&self) -> std::slice::Iter<'_, HistoryEntry> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the latest version, or [`Version::NONE`] when empty.
    #[must_use]
    pub fn latest_version(&self) -> Version {
        self.entries.last().map_or(Version::NONE, |e| e.version)
    }

    /// Returns the most recent entry.
    #[must_use]
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Returns the entry that produced `version`.
    #[must_use]
    pub fn get(&self, version: Version) -> Option<&HistoryEntry> {
        let index = usize::try_from(version.as_u64()).ok()?.checked_sub(1)?;
        self.entries.get(index)
    }

    /// Returns true if the latest entry deleted the resource.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.latest().is_some_and(|e| e.kind == ChangeKind::Delete)
    }

    /// Reconstructs the resource's fields as of `version`.
    ///
    /// Returns `None` if `version` was never recorded.
    #[must_use]
    pub fn state_at(&self, version: Version) -> Option<Fields> {
        self.get(version)?;
        let mut fields = Fields::new();
        for entry in self.entries.iter().take_while(|e| e.version <= version) {
            apply_forward(&mut fields, &entry.diff);
        }
        Some(fields)
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a HistoryEntry;
    type IntoIter = std::slice::Iter<'a, HistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
