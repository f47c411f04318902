//! Property-based test generators using proptest.
//!
//! Strategies produce data shaped for the fixture registry in
//! [`crate::fixtures`], so generated payloads mostly pass validation and
//! generated actors exercise every rule dimension.

use crate::fixtures::EPOCH;
use entigate_core::{Actor, Role};
use entigate_model::{Fields, Value};
use proptest::prelude::*;

/// Actor ids the generators draw from.
pub const ACTOR_IDS: [&str; 3] = ["alice", "bob", "carol"];

/// Organization ids the generators draw from.
pub const ORG_IDS: [&str; 2] = ["acme", "globex"];

/// Strategy for any role.
pub fn role_strategy() -> impl Strategy<Value = Role> {
    prop::sample::select(Role::ALL.to_vec())
}

/// Strategy for actors with a role, an id from [`ACTOR_IDS`], and maybe an organization.
pub fn actor_strategy() -> impl Strategy<Value = Actor> {
    (
        role_strategy(),
        prop::sample::select(ACTOR_IDS.to_vec()),
        prop::option::of(prop::sample::select(ORG_IDS.to_vec())),
    )
        .prop_map(|(role, id, org)| {
            let actor = Actor::new(id, role);
            match org {
                Some(org) => actor.with_org(org),
                None => actor,
            }
        })
}

/// Strategy for scalar field values, including nulls.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-z]{0,8}".prop_map(Value::Text),
    ]
}

/// Strategy for an optional validity window around [`EPOCH`].
fn window_strategy() -> impl Strategy<Value = (Option<i64>, Option<i64>)> {
    let offset = -10_000i64..10_000;
    (prop::option::of(offset.clone()), prop::option::of(offset))
        .prop_map(|(from, until)| (from.map(|o| EPOCH.as_millis() + o), until.map(|o| EPOCH.as_millis() + o)))
}

/// Strategy for valid `post` payloads authored by someone in [`ACTOR_IDS`].
pub fn post_payload_strategy() -> impl Strategy<Value = Fields> {
    (
        "[A-Za-z ]{1,16}",
        prop::option::of("[a-z ]{0,32}"),
        prop::sample::select(ACTOR_IDS.to_vec()),
        prop::sample::select(vec!["draft", "published"]),
        prop::option::of(any::<bool>()),
        window_strategy(),
    )
        .prop_map(|(title, body, author, status, featured, (from, until))| {
            let mut fields = Fields::new();
            fields.insert("title".into(), Value::Text(title));
            fields.insert("authorId".into(), Value::from(author));
            fields.insert("status".into(), Value::from(status));
            if let Some(body) = body {
                fields.insert("body".into(), Value::Text(body));
            }
            if let Some(featured) = featured {
                fields.insert("featured".into(), Value::Bool(featured));
            }
            if let Some(from) = from {
                fields.insert("validFrom".into(), Value::Integer(from));
            }
            if let Some(until) = until {
                fields.insert("validUntil".into(), Value::Integer(until));
            }
            fields
        })
}

/// Strategy for `post` update patches over mutable fields.
pub fn post_patch_strategy() -> impl Strategy<Value = Fields> {
    prop::collection::btree_map(
        prop::sample::select(vec!["title", "body", "status"]).prop_map(String::from),
        "[a-z]{1,8}".prop_map(Value::Text),
        1..3,
    )
}

/// One step of a generated mutation sequence.
#[derive(Debug, Clone)]
pub enum PostOp {
    /// Apply a patch at the current version.
    Update(Fields),
    /// Apply a patch at a stale version.
    StaleUpdate(Fields),
    /// Roll back to `n` versions before the current one.
    Rollback(u64),
}

/// Strategy for a sequence of mutations against one post.
pub fn post_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<PostOp>> {
    prop::collection::vec(
        prop_oneof![
            4 => post_patch_strategy().prop_map(PostOp::Update),
            1 => post_patch_strategy().prop_map(PostOp::StaleUpdate),
            1 => (1u64..4).prop_map(PostOp::Rollback),
        ],
        1..max_len,
    )
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::post_entity;
    use entigate_core::{SchemaValidator, ValidationMode, Validator};

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn post_payloads_pass_schema(payload in post_payload_strategy()) {
            let outcome = SchemaValidator::new().validate(&post_entity(), &payload, ValidationMode::Insert);
            prop_assert!(outcome.is_valid(), "{:?}", outcome.issues());
        }

        #[test]
        fn patches_are_non_empty(patch in post_patch_strategy()) {
            prop_assert!(!patch.is_empty());
            prop_assert!(!patch.contains_key("authorId"));
        }

        #[test]
        fn actors_use_known_ids(actor in actor_strategy()) {
            prop_assert!(ACTOR_IDS.contains(&actor.id().as_str()));
        }
    }
}
