//! Audit history.
//!
//! Every committed mutation appends one [`HistoryEntry`] recording which
//! fields changed, who changed them, and when. Entries are never modified
//! or removed; a rollback is itself a new entry.

mod entry;
mod store;

pub use entry::{
    apply_forward, apply_inverse, diff_fields, ChangeKind, Diff, FieldChange, HistoryEntry,
    GENESIS_DIGEST,
};
pub use store::{History, HistoryStore};
