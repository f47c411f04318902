//! History entries and field diffs.

use entigate_model::{ActorId, EntityName, Fields, RequestId, ResourceId, Timestamp, Value, Version};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Digest of the entry before the first one.
pub const GENESIS_DIGEST: [u8; 32] = [0u8; 32];

/// What kind of mutation produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// The resource was created.
    Insert,
    /// Some fields changed.
    Update,
    /// The resource was removed.
    Delete,
    /// Fields were restored to an earlier version.
    Rollback,
}

impl ChangeKind {
    /// Returns the lowercase kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
            ChangeKind::Rollback => "rollback",
        }
    }

    const fn tag(self) -> u8 {
        match self {
            ChangeKind::Insert => 1,
            ChangeKind::Update => 2,
            ChangeKind::Delete => 3,
            ChangeKind::Rollback => 4,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Before and after values of one field. `None` means absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    /// Value before the change.
    pub before: Option<Value>,
    /// Value after the change.
    pub after: Option<Value>,
}

impl FieldChange {
    /// Creates a change.
    #[must_use]
    pub fn new(before: Option<Value>, after: Option<Value>) -> Self {
        Self { before, after }
    }

    /// Swaps before and after.
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            before: self.after.clone(),
            after: self.before.clone(),
        }
    }
}

/// Changed fields of one mutation, keyed by field name.
pub type Diff = BTreeMap<String, FieldChange>;

/// Computes the changes turning `before` into `after`.
///
/// Unchanged fields are omitted.
#[must_use]
pub fn diff_fields(before: &Fields, after: &Fields) -> Diff {
    let mut diff = Diff::new();
    for (name, old) in before {
        match after.get(name) {
            Some(new) if new == old => {}
            new => {
                diff.insert(name.clone(), FieldChange::new(Some(old.clone()), new.cloned()));
            }
        }
    }
    for (name, new) in after {
        if !before.contains_key(name) {
            diff.insert(name.clone(), FieldChange::new(None, Some(new.clone())));
        }
    }
    diff
}

/// Applies a diff forwards.
pub fn apply_forward(fields: &mut Fields, diff: &Diff) {
    for (name, change) in diff {
        set_or_remove(fields, name, change.after.as_ref());
    }
}

/// Applies a diff backwards, undoing it.
pub fn apply_inverse(fields: &mut Fields, diff: &Diff) {
    for (name, change) in diff {
        set_or_remove(fields, name, change.before.as_ref());
    }
}

fn set_or_remove(fields: &mut Fields, name: &str, value: Option<&Value>) {
    match value {
        Some(value) => {
            fields.insert(name.to_string(), value.clone());
        }
        None => {
            fields.remove(name);
        }
    }
}

/// One committed mutation of one resource.
///
/// Entries are immutable once appended. `digest` is assigned by the
/// history store and chains the entry to its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// The entity.
    pub entity: EntityName,
    /// The resource.
    pub resource_id: ResourceId,
    /// Version this entry produced.
    pub version: Version,
    /// Changed fields.
    pub diff: Diff,
    /// Who made the change.
    pub actor_id: ActorId,
    /// When the change was committed.
    pub timestamp: Timestamp,
    /// What kind of change it was.
    pub kind: ChangeKind,
    /// The request that made the change.
    pub request_id: RequestId,
    /// Target version, for rollback entries.
    pub rollback_of: Option<Version>,
    /// Chained SHA-256 digest.
    #[serde(with = "hex_digest")]
    pub digest: [u8; 32],
}

impl HistoryEntry {
    /// Computes this entry's digest given the previous entry's digest.
    ///
    /// Covers every field except `digest` itself.
    #[must_use]
    pub fn compute_digest(&self, previous: &[u8; 32]) -> [u8; 32] {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(previous);
        write_str(&mut buf, self.entity.as_str());
        buf.extend_from_slice(self.resource_id.as_bytes());
        buf.extend_from_slice(&self.version.as_u64().to_be_bytes());
        buf.extend_from_slice(&(self.diff.len() as u64).to_be_bytes());
        for (name, change) in &self.diff {
            write_str(&mut buf, name);
            write_side(&mut buf, change.before.as_ref());
            write_side(&mut buf, change.after.as_ref());
        }
        write_str(&mut buf, self.actor_id.as_str());
        buf.extend_from_slice(&self.timestamp.as_millis().to_be_bytes());
        buf.push(self.kind.tag());
        buf.extend_from_slice(self.request_id.as_bytes());
        match self.rollback_of {
            Some(target) => {
                buf.push(1);
                buf.extend_from_slice(&target.as_u64().to_be_bytes());
            }
            None => buf.push(0),
        }
        Sha256::digest(&buf).into()
    }

    /// Returns the digest as lowercase hex.
    #[must_use]
    pub fn digest_hex(&self) -> String {
        hex_digest::encode(&self.digest)
    }
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u64).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn write_side(buf: &mut Vec<u8>, value: Option<&Value>) {
    match value {
        Some(value) => {
            buf.push(1);
            value.write_canonical(buf);
        }
        None => buf.push(0),
    }
}

mod hex_digest {
    use serde::Serializer;
    use std::fmt::Write;

    pub(super) fn encode(digest: &[u8; 32]) -> String {
        digest.iter().fold(String::with_capacity(64), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
    }

    pub(super) fn serialize<S: Serializer>(digest: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fields_strategy() -> impl Strategy<Value = Fields> {
        prop::collection::btree_map(
            "[a-d]",
            prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                (0i64..4).prop_map(Value::Integer),
                "[xy]{0,2}".prop_map(Value::Text),
            ],
            0..4,
        )
    }

    proptest! {
        #[test]
        fn diff_round_trips_any_pair(before in fields_strategy(), after in fields_strategy()) {
            let diff = diff_fields(&before, &after);

            let mut forward = before.clone();
            apply_forward(&mut forward, &diff);
            prop_assert_eq!(&forward, &after);

            apply_inverse(&mut forward, &diff);
            prop_assert_eq!(forward, before.clone());

            prop_assert_eq!(diff.is_empty(), before == after);
        }
    }

    fn fields(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn diff_covers_added_removed_and_changed() {
        let before = fields(&[("a", Value::from(1i64)), ("b", Value::from("x")), ("c", Value::Null)]);
        let after = fields(&[("a", Value::from(1i64)), ("b", Value::from("y")), ("d", Value::Bool(true))]);

        let diff = diff_fields(&before, &after);
        assert_eq!(diff.len(), 3);
        assert!(!diff.contains_key("a"));
        assert_eq!(diff["b"], FieldChange::new(Some(Value::from("x")), Some(Value::from("y"))));
        assert_eq!(diff["c"], FieldChange::new(Some(Value::Null), None));
        assert_eq!(diff["d"], FieldChange::new(None, Some(Value::Bool(true))));
    }

    #[test]
    fn forward_then_inverse_restores() {
        let before = fields(&[("a", Value::from(1i64)), ("b", Value::from("x"))]);
        let after = fields(&[("b", Value::from("y")), ("c", Value::from(3i64))]);
        let diff = diff_fields(&before, &after);

        let mut state = before.clone();
        apply_forward(&mut state, &diff);
        assert_eq!(state, after);
        apply_inverse(&mut state, &diff);
        assert_eq!(state, before);
    }

    #[test]
    fn digest_depends_on_predecessor_and_content() {
        let mut entry = HistoryEntry {
            entity: EntityName::from("post"),
            resource_id: ResourceId::from_bytes([7; 16]),
            version: Version::INITIAL,
            diff: diff_fields(&Fields::new(), &fields(&[("title", Value::from("t"))])),
            actor_id: ActorId::from("A"),
            timestamp: Timestamp::from_millis(1),
            kind: ChangeKind::Insert,
            request_id: RequestId::new(),
            rollback_of: None,
            digest: GENESIS_DIGEST,
        };

        let first = entry.compute_digest(&GENESIS_DIGEST);
        assert_eq!(first, entry.compute_digest(&GENESIS_DIGEST));
        assert_ne!(first, entry.compute_digest(&[1u8; 32]));

        entry.actor_id = ActorId::from("B");
        assert_ne!(first, entry.compute_digest(&GENESIS_DIGEST));

        entry.digest = first;
        assert_eq!(entry.digest_hex().len(), 64);
    }
}
