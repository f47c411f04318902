//! Test fixtures: a sample registry, actors, and a ready-made pipeline.

use entigate_core::{
    Actor, AttributePredicate, EntityDef, EntityPermissionConfig, EntityRegistry, FieldAccess,
    FieldDef, FieldKind, ManualClock, MutationPipeline, Operation, PipelineConfig, Role, Rule,
};
use entigate_model::{Fields, Timestamp, Value};
use entigate_storage::{InMemoryRecordStore, RecordStore};
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

/// Fixed instant the test clock starts at (2023-11-14T22:13:20Z).
pub const EPOCH: Timestamp = Timestamp::from_millis(1_700_000_000_000);

/// The blog `post` entity.
///
/// - users and admins may do everything, guests may only read
/// - creating, updating, and deleting require `authorId` to be the actor
/// - deleting also requires `status == "draft"`
/// - reading requires now to be within `[validFrom, validUntil]`
/// - users see but cannot set `featured`; guests cannot see `authorId`
#[must_use]
pub fn post_entity() -> EntityDef {
    let permissions = EntityPermissionConfig::new()
        .grant(Role::Admin, Operation::ALL)
        .grant(Role::User, Operation::ALL)
        .grant(Role::Guest, [Operation::Read])
        .rule_for(
            [Operation::Create, Operation::Update, Operation::Delete],
            Rule::ownership("authorId"),
        )
        .rule(
            Operation::Delete,
            Rule::Attribute(AttributePredicate::field_equals("status", "draft")),
        )
        .rule(
            Operation::Read,
            Rule::temporal(Some("validFrom"), Some("validUntil")),
        )
        .field_access(Role::User, "featured", FieldAccess::READ_ONLY)
        .field_access(Role::Guest, "authorId", FieldAccess::HIDDEN);

    EntityDef::new("post")
        .table("posts")
        .field(FieldDef::new("title", FieldKind::Text).required())
        .field(FieldDef::new("body", FieldKind::Text))
        .field(FieldDef::new("authorId", FieldKind::Text).required().immutable())
        .field(FieldDef::new("status", FieldKind::Text).required())
        .field(FieldDef::new("featured", FieldKind::Bool))
        .field(FieldDef::new("validFrom", FieldKind::Timestamp))
        .field(FieldDef::new("validUntil", FieldKind::Timestamp))
        .permissions(permissions)
}

/// The tenant-scoped `document` entity.
///
/// Editors and admins may read and update documents of their own
/// organization; editors never see `salary`.
#[must_use]
pub fn document_entity() -> EntityDef {
    let permissions = EntityPermissionConfig::new()
        .grant(Role::Admin, Operation::ALL)
        .grant(Role::Editor, [Operation::Read, Operation::Update])
        .rule_for([Operation::Read, Operation::Update], Rule::organization("orgId"))
        .field_access(Role::Editor, "salary", FieldAccess::HIDDEN);

    EntityDef::new("document")
        .field(FieldDef::new("title", FieldKind::Text).required())
        .field(FieldDef::new("orgId", FieldKind::Text).required().immutable())
        .field(FieldDef::new("salary", FieldKind::Integer))
        .permissions(permissions)
}

/// A registry with [`post_entity`] and [`document_entity`].
#[must_use]
pub fn blog_registry() -> Arc<EntityRegistry> {
    let registry = EntityRegistry::builder()
        .entity(post_entity())
        .entity(document_entity())
        .build()
        .expect("fixture registry is valid");
    Arc::new(registry)
}

/// Builds field values from pairs.
#[must_use]
pub fn fields(pairs: &[(&str, Value)]) -> Fields {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), value.clone()))
        .collect()
}

/// A draft post written by `author`.
#[must_use]
pub fn post_payload(author: &str) -> Fields {
    fields(&[
        ("title", Value::from("Hello")),
        ("body", Value::from("First post")),
        ("authorId", Value::from(author)),
        ("status", Value::from("draft")),
    ])
}

/// A document owned by `org`.
#[must_use]
pub fn document_payload(org: &str) -> Fields {
    fields(&[
        ("title", Value::from("Budget")),
        ("orgId", Value::from(org)),
        ("salary", Value::Integer(100_000)),
    ])
}

/// A regular user.
#[must_use]
pub fn user(id: &str) -> Actor {
    Actor::new(id, Role::User)
}

/// An administrator.
#[must_use]
pub fn admin(id: &str) -> Actor {
    Actor::new(id, Role::Admin)
}

/// An editor belonging to `org`.
#[must_use]
pub fn editor(id: &str, org: &str) -> Actor {
    Actor::new(id, Role::Editor).with_org(org)
}

/// An anonymous visitor.
#[must_use]
pub fn guest() -> Actor {
    Actor::new("guest", Role::Guest)
}

/// A pipeline over the blog registry with a manual clock at [`EPOCH`].
pub struct TestPipeline<S: RecordStore = Arc<InMemoryRecordStore>> {
    /// The pipeline, shareable across threads.
    pub pipeline: Arc<MutationPipeline<S>>,
    /// The clock driving permission checks and timestamps.
    pub clock: Arc<ManualClock>,
}

impl TestPipeline {
    /// Creates a pipeline with default configuration and an in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    /// Creates a pipeline with the given configuration and an in-memory store.
    #[must_use]
    pub fn with_config(config: PipelineConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryRecordStore::new()))
    }
}

impl Default for TestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: RecordStore> TestPipeline<S> {
    /// Creates a pipeline over `store`.
    pub fn with_store(config: PipelineConfig, store: S) -> Self {
        let clock = Arc::new(ManualClock::new(EPOCH));
        let pipeline = MutationPipeline::new(config, blog_registry(), store).with_clock(clock.clone());
        Self {
            pipeline: Arc::new(pipeline),
            clock,
        }
    }
}

impl<S: RecordStore> std::ops::Deref for TestPipeline<S> {
    type Target = MutationPipeline<S>;

    fn deref(&self) -> &Self::Target {
        &self.pipeline
    }
}

/// Installs a `tracing` subscriber honouring `RUST_LOG`, once per process.
///
/// Output goes through the test harness so it is only shown for failing tests.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
