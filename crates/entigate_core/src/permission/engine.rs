//! Permission evaluation.

use crate::actor::{Actor, Role};
use crate::clock::{Clock, SystemClock};
use crate::permission::config::{Operation, Rule, RuleKind};
use crate::permission::decision::{DeniedReason, PermissionDecision};
use crate::registry::EntityDef;
use entigate_model::{Fields, Timestamp, Value, VersionedRecord};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Outcome of a single resource-dependent rule.
enum RuleOutcome {
    Pass,
    Deferred,
    Fail(DeniedReason),
}

/// Evaluates authorization decisions.
///
/// The engine holds no mutable state; the only input beyond the
/// arguments is the clock, read once per check. It is cheap to clone and
/// safe to share across threads.
///
/// ## Evaluation order
///
/// 1. Role grant (no further stage runs on failure)
/// 2. Ownership
/// 3. Organization
/// 4. Attribute predicate
/// 5. Temporal validity
/// 6. Field-level narrowing
///
/// Stages 2-5 deny on the first failing rule. Without a resource they are
/// deferred instead and reported in [`PermissionDecision::deferred`].
#[derive(Debug, Clone)]
pub struct PermissionEngine {
    clock: Arc<dyn Clock>,
}

impl Default for PermissionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionEngine {
    /// Creates an engine reading the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an engine reading the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Returns the engine's clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Checks whether `actor` may perform `operation` on `entity`.
    ///
    /// Pass the resource whenever it is known; without it, ownership,
    /// organization, attribute, and temporal rules are deferred.
    #[must_use]
    pub fn check(
        &self,
        actor: &Actor,
        entity: &EntityDef,
        operation: Operation,
        resource: Option<&Fields>,
    ) -> PermissionDecision {
        self.check_at(actor, entity, operation, resource, self.clock.now())
    }

    /// Same as [`check`](Self::check) at an explicit instant.
    #[must_use]
    pub fn check_at(
        &self,
        actor: &Actor,
        entity: &EntityDef,
        operation: Operation,
        resource: Option<&Fields>,
        now: Timestamp,
    ) -> PermissionDecision {
        let config = entity.permission_config();
        let mut deferred = BTreeSet::new();
        let mut denied_fields = BTreeSet::new();

        for kind in RuleKind::EVALUATION_ORDER {
            match kind {
                RuleKind::Role => {
                    if !config.is_granted(actor.role(), operation) {
                        return deny(entity, operation, DeniedReason::Role);
                    }
                }
                RuleKind::Ownership
                | RuleKind::Organization
                | RuleKind::Attribute
                | RuleKind::Temporal => {
                    let rules = config.rules(operation).iter().filter(|r| r.kind() == kind);
                    for rule in rules {
                        match evaluate_rule(rule, actor, resource, now) {
                            RuleOutcome::Pass => {}
                            RuleOutcome::Deferred => {
                                deferred.insert(kind);
                            }
                            RuleOutcome::Fail(reason) => {
                                return deny(entity, operation, reason);
                            }
                        }
                    }
                }
                RuleKind::FieldLevel => {
                    denied_fields = entity
                        .field_names()
                        .filter(|field| !config.access(actor.role(), field).permits(operation))
                        .map(str::to_string)
                        .collect();
                }
            }
        }

        PermissionDecision::allow(denied_fields, deferred)
    }

    /// Returns the fields `actor` may read on this resource.
    ///
    /// Empty when reading is denied.
    #[must_use]
    pub fn visible_fields(
        &self,
        actor: &Actor,
        entity: &EntityDef,
        resource: Option<&Fields>,
    ) -> BTreeSet<String> {
        let decision = self.check(actor, entity, Operation::Read, resource);
        permitted_fields(entity, &decision)
    }

    /// Returns the fields `actor` may change on this resource.
    ///
    /// Empty when updating is denied.
    #[must_use]
    pub fn editable_fields(
        &self,
        actor: &Actor,
        entity: &EntityDef,
        resource: Option<&Fields>,
    ) -> BTreeSet<String> {
        let decision = self.check(actor, entity, Operation::Update, resource);
        permitted_fields(entity, &decision)
    }

    /// Projects a record onto the fields `actor` may read.
    ///
    /// Returns `None` when reading the record is denied.
    #[must_use]
    pub fn filter_visible(
        &self,
        actor: &Actor,
        entity: &EntityDef,
        record: &VersionedRecord,
    ) -> Option<Fields> {
        let decision = self.check(actor, entity, Operation::Read, Some(&record.fields));
        if !decision.allowed {
            return None;
        }
        Some(
            record
                .fields
                .iter()
                .filter(|(field, _)| !decision.denied_fields.contains(*field))
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect(),
        )
    }
}

/// The fields a role reaches through its grant alone, before any override.
#[must_use]
pub fn role_allowed_fields(role: Role, entity: &EntityDef, operation: Operation) -> BTreeSet<String> {
    if entity.permission_config().is_granted(role, operation) {
        entity.field_names().map(str::to_string).collect()
    } else {
        BTreeSet::new()
    }
}

fn permitted_fields(entity: &EntityDef, decision: &PermissionDecision) -> BTreeSet<String> {
    if !decision.allowed {
        return BTreeSet::new();
    }
    entity
        .field_names()
        .filter(|field| !decision.denied_fields.contains(*field))
        .map(str::to_string)
        .collect()
}

fn deny(entity: &EntityDef, operation: Operation, reason: DeniedReason) -> PermissionDecision {
    debug!(entity = %entity.name(), %operation, %reason, "permission denied");
    PermissionDecision::deny(reason)
}

fn evaluate_rule(
    rule: &Rule,
    actor: &Actor,
    resource: Option<&Fields>,
    now: Timestamp,
) -> RuleOutcome {
    match rule {
        Rule::Ownership { field } => {
            let Some(resource) = resource else {
                return RuleOutcome::Deferred;
            };
            if text_field(resource, field) == Some(actor.id().as_str()) {
                RuleOutcome::Pass
            } else {
                RuleOutcome::Fail(DeniedReason::Ownership {
                    field: field.clone(),
                })
            }
        }
        Rule::Organization { field } => {
            let Some(resource) = resource else {
                return RuleOutcome::Deferred;
            };
            match actor.org() {
                Some(org) if text_field(resource, field) == Some(org.as_str()) => RuleOutcome::Pass,
                _ => RuleOutcome::Fail(DeniedReason::Organization {
                    field: field.clone(),
                }),
            }
        }
        Rule::Attribute(predicate) => {
            if resource.is_none() && predicate.references_resource() {
                return RuleOutcome::Deferred;
            }
            if predicate.evaluate(actor, resource) {
                RuleOutcome::Pass
            } else {
                RuleOutcome::Fail(DeniedReason::Attribute)
            }
        }
        Rule::Temporal {
            valid_from,
            valid_until,
        } => {
            let Some(resource) = resource else {
                return RuleOutcome::Deferred;
            };
            let after_start = match bound(resource, valid_from.as_deref()) {
                Ok(Some(from)) => now.as_millis() >= from,
                Ok(None) => true,
                Err(()) => false,
            };
            let before_end = match bound(resource, valid_until.as_deref()) {
                Ok(Some(until)) => now.as_millis() <= until,
                Ok(None) => true,
                Err(()) => false,
            };
            if after_start && before_end {
                RuleOutcome::Pass
            } else {
                RuleOutcome::Fail(DeniedReason::Temporal)
            }
        }
    }
}

fn text_field<'a>(resource: &'a Fields, field: &str) -> Option<&'a str> {
    resource.get(field).and_then(Value::as_text)
}

/// Reads a validity bound. Missing or null means unbounded; a non-integer
/// bound is malformed and fails the window.
fn bound(resource: &Fields, field: Option<&str>) -> Result<Option<i64>, ()> {
    match field.and_then(|field| resource.get(field)) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Integer(millis)) => Ok(Some(*millis)),
        Some(_) => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::permission::{AttributePredicate, EntityPermissionConfig, FieldAccess};
    use crate::registry::{FieldDef, FieldKind};

    fn post(permissions: EntityPermissionConfig) -> EntityDef {
        EntityDef::new("post")
            .field(FieldDef::new("title", FieldKind::Text))
            .field(FieldDef::new("authorId", FieldKind::Text))
            .field(FieldDef::new("orgId", FieldKind::Text))
            .field(FieldDef::new("status", FieldKind::Text))
            .field(FieldDef::new("validFrom", FieldKind::Timestamp))
            .field(FieldDef::new("validUntil", FieldKind::Timestamp))
            .permissions(permissions)
    }

    fn fields(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn engine_at(millis: i64) -> PermissionEngine {
        PermissionEngine::with_clock(Arc::new(ManualClock::new(Timestamp::from_millis(millis))))
    }

    #[test]
    fn role_must_be_explicitly_granted() {
        let entity = post(EntityPermissionConfig::new().grant(Role::User, [Operation::Read]));
        let engine = engine_at(0);

        let decision = engine.check(&Actor::new("A", Role::User), &entity, Operation::Update, None);
        assert!(!decision.allowed);
        assert_eq!(decision.denied_reason, Some(DeniedReason::Role));

        let decision = engine.check(&Actor::new("A", Role::Guest), &entity, Operation::Read, None);
        assert_eq!(decision.denied_reason, Some(DeniedReason::Role));
    }

    #[test]
    fn role_denial_short_circuits_field_narrowing() {
        let entity = post(
            EntityPermissionConfig::new().field_access(Role::User, "title", FieldAccess::HIDDEN),
        );
        let decision = engine_at(0).check(&Actor::new("A", Role::User), &entity, Operation::Read, None);
        assert!(decision.denied_fields.is_empty());
    }

    #[test]
    fn ownership_compares_actor_id() {
        let entity = post(
            EntityPermissionConfig::new()
                .grant(Role::User, [Operation::Update])
                .rule(Operation::Update, Rule::ownership("authorId")),
        );
        let engine = engine_at(0);
        let actor = Actor::new("A", Role::User);

        let own = fields(&[("authorId", Value::from("A"))]);
        assert!(engine.check(&actor, &entity, Operation::Update, Some(&own)).allowed);

        let other = fields(&[("authorId", Value::from("B"))]);
        let decision = engine.check(&actor, &entity, Operation::Update, Some(&other));
        assert_eq!(
            decision.denied_reason,
            Some(DeniedReason::Ownership {
                field: "authorId".into()
            })
        );
    }

    #[test]
    fn resource_rules_defer_without_resource() {
        let entity = post(
            EntityPermissionConfig::new()
                .grant(Role::User, [Operation::Read])
                .rule(Operation::Read, Rule::ownership("authorId"))
                .rule(Operation::Read, Rule::temporal(Some("validFrom"), None)),
        );
        let decision = engine_at(0).check(&Actor::new("A", Role::User), &entity, Operation::Read, None);

        assert!(decision.allowed);
        assert!(!decision.is_final());
        assert_eq!(
            decision.deferred,
            BTreeSet::from([RuleKind::Ownership, RuleKind::Temporal])
        );
    }

    #[test]
    fn organization_requires_matching_org() {
        let entity = post(
            EntityPermissionConfig::new()
                .grant(Role::Editor, [Operation::Read])
                .rule(Operation::Read, Rule::organization("orgId")),
        );
        let engine = engine_at(0);
        let resource = fields(&[("orgId", Value::from("acme"))]);

        let member = Actor::new("E", Role::Editor).with_org("acme");
        assert!(engine.check(&member, &entity, Operation::Read, Some(&resource)).allowed);

        let outsider = Actor::new("E", Role::Editor).with_org("globex");
        assert!(!engine.check(&outsider, &entity, Operation::Read, Some(&resource)).allowed);

        let orgless = Actor::new("E", Role::Editor);
        let decision = engine.check(&orgless, &entity, Operation::Read, Some(&resource));
        assert_eq!(
            decision.denied_reason,
            Some(DeniedReason::Organization {
                field: "orgId".into()
            })
        );
    }

    #[test]
    fn earlier_stage_wins_when_several_fail() {
        let entity = post(
            EntityPermissionConfig::new()
                .grant(Role::User, [Operation::Delete])
                .rule(Operation::Delete, Rule::Attribute(AttributePredicate::field_equals("status", "draft")))
                .rule(Operation::Delete, Rule::ownership("authorId")),
        );
        let resource = fields(&[
            ("authorId", Value::from("B")),
            ("status", Value::from("published")),
        ]);
        let decision = engine_at(0).check(
            &Actor::new("A", Role::User),
            &entity,
            Operation::Delete,
            Some(&resource),
        );
        assert!(matches!(decision.denied_reason, Some(DeniedReason::Ownership { .. })));
    }

    #[test]
    fn temporal_window_is_inclusive_and_open_ended() {
        let entity = post(
            EntityPermissionConfig::new()
                .grant(Role::User, [Operation::Read])
                .rule(Operation::Read, Rule::temporal(Some("validFrom"), Some("validUntil"))),
        );
        let actor = Actor::new("A", Role::User);
        let window = fields(&[
            ("validFrom", Value::Integer(100)),
            ("validUntil", Value::Integer(200)),
        ]);

        assert!(!engine_at(99).check(&actor, &entity, Operation::Read, Some(&window)).allowed);
        assert!(engine_at(100).check(&actor, &entity, Operation::Read, Some(&window)).allowed);
        assert!(engine_at(200).check(&actor, &entity, Operation::Read, Some(&window)).allowed);
        let late = engine_at(201).check(&actor, &entity, Operation::Read, Some(&window));
        assert_eq!(late.denied_reason, Some(DeniedReason::Temporal));

        let open_end = fields(&[("validFrom", Value::Integer(100)), ("validUntil", Value::Null)]);
        assert!(engine_at(i64::MAX).check(&actor, &entity, Operation::Read, Some(&open_end)).allowed);

        let malformed = fields(&[("validFrom", Value::from("yesterday"))]);
        assert!(!engine_at(0).check(&actor, &entity, Operation::Read, Some(&malformed)).allowed);
    }

    #[test]
    fn field_overrides_narrow_per_operation() {
        let entity = post(
            EntityPermissionConfig::new()
                .grant(Role::User, [Operation::Read, Operation::Update])
                .field_access(Role::User, "status", FieldAccess::READ_ONLY)
                .field_access(Role::User, "orgId", FieldAccess::HIDDEN),
        );
        let engine = engine_at(0);
        let actor = Actor::new("A", Role::User);

        let read = engine.check(&actor, &entity, Operation::Read, None);
        assert_eq!(read.denied_fields, BTreeSet::from(["orgId".to_string()]));

        let update = engine.check(&actor, &entity, Operation::Update, None);
        assert_eq!(
            update.denied_fields,
            BTreeSet::from(["orgId".to_string(), "status".to_string()])
        );

        let visible = engine.visible_fields(&actor, &entity, None);
        assert!(visible.contains("status"));
        assert!(!visible.contains("orgId"));

        let editable = engine.editable_fields(&actor, &entity, None);
        assert!(editable.contains("title"));
        assert!(!editable.contains("status"));
    }

    #[test]
    fn helpers_are_empty_when_denied() {
        let entity = post(EntityPermissionConfig::new());
        let engine = engine_at(0);
        let actor = Actor::new("A", Role::Guest);
        assert!(engine.visible_fields(&actor, &entity, None).is_empty());
        assert!(engine.editable_fields(&actor, &entity, None).is_empty());
        assert!(role_allowed_fields(Role::Guest, &entity, Operation::Read).is_empty());
    }

    #[test]
    fn filter_visible_drops_hidden_fields() {
        let entity = post(
            EntityPermissionConfig::new()
                .grant(Role::User, [Operation::Read])
                .field_access(Role::User, "orgId", FieldAccess::HIDDEN),
        );
        let record = VersionedRecord::new(
            entigate_model::ResourceId::new(),
            entigate_model::Version::INITIAL,
            fields(&[("title", Value::from("t")), ("orgId", Value::from("acme"))]),
            Timestamp::from_millis(0),
        );

        let projected = engine_at(0)
            .filter_visible(&Actor::new("A", Role::User), &entity, &record)
            .unwrap();
        assert!(projected.contains_key("title"));
        assert!(!projected.contains_key("orgId"));

        assert!(engine_at(0)
            .filter_visible(&Actor::new("G", Role::Guest), &entity, &record)
            .is_none());
    }

    #[test]
    fn identical_inputs_yield_identical_decisions() {
        let entity = post(
            EntityPermissionConfig::new()
                .grant(Role::User, [Operation::Update])
                .rule(Operation::Update, Rule::ownership("authorId"))
                .field_access(Role::User, "status", FieldAccess::READ_ONLY),
        );
        let engine = engine_at(42);
        let actor = Actor::new("A", Role::User);
        let resource = fields(&[("authorId", Value::from("A"))]);

        let first = engine.check(&actor, &entity, Operation::Update, Some(&resource));
        for _ in 0..10 {
            assert_eq!(engine.check(&actor, &entity, Operation::Update, Some(&resource)), first);
        }
    }
}
