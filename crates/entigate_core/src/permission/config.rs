//! Per-entity permission configuration.

use crate::actor::Role;
use crate::permission::predicate::AttributePredicate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Operation being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create a resource.
    Create,
    /// Read a resource.
    Read,
    /// Update a resource.
    Update,
    /// Delete a resource.
    Delete,
}

impl Operation {
    /// Every operation.
    pub const ALL: [Operation; 4] = [
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::Delete,
    ];

    /// Returns the lowercase operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authorization dimensions, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Role grants.
    Role,
    /// Resource owner must be the actor.
    Ownership,
    /// Resource organization must be the actor's.
    Organization,
    /// Attribute predicate.
    Attribute,
    /// Resource validity window.
    Temporal,
    /// Per-field visibility and editability.
    FieldLevel,
}

impl RuleKind {
    /// The order in which the engine evaluates dimensions.
    pub const EVALUATION_ORDER: [RuleKind; 6] = [
        RuleKind::Role,
        RuleKind::Ownership,
        RuleKind::Organization,
        RuleKind::Attribute,
        RuleKind::Temporal,
        RuleKind::FieldLevel,
    ];
}

/// A resource-dependent rule attached to one operation.
#[derive(Debug, Clone)]
pub enum Rule {
    /// `resource[field]` must equal the actor's id.
    Ownership {
        /// Field holding the owner id.
        field: String,
    },
    /// `resource[field]` must equal the actor's organization.
    Organization {
        /// Field holding the organization id.
        field: String,
    },
    /// A predicate over actor attributes and the resource must hold.
    Attribute(AttributePredicate),
    /// Now must fall within `[resource[valid_from], resource[valid_until]]`.
    ///
    /// An unset bound, or a null/missing value, is unbounded on that side.
    Temporal {
        /// Field holding the start of validity (Unix millis).
        valid_from: Option<String>,
        /// Field holding the end of validity (Unix millis).
        valid_until: Option<String>,
    },
}

impl Rule {
    /// Ownership rule on `field`.
    pub fn ownership(field: impl Into<String>) -> Self {
        Self::Ownership {
            field: field.into(),
        }
    }

    /// Organization rule on `field`.
    pub fn organization(field: impl Into<String>) -> Self {
        Self::Organization {
            field: field.into(),
        }
    }

    /// Temporal rule over the given bound fields.
    pub fn temporal(valid_from: Option<&str>, valid_until: Option<&str>) -> Self {
        Self::Temporal {
            valid_from: valid_from.map(str::to_string),
            valid_until: valid_until.map(str::to_string),
        }
    }

    /// Returns the dimension this rule belongs to.
    #[must_use]
    pub fn kind(&self) -> RuleKind {
        match self {
            Rule::Ownership { .. } => RuleKind::Ownership,
            Rule::Organization { .. } => RuleKind::Organization,
            Rule::Attribute(_) => RuleKind::Attribute,
            Rule::Temporal { .. } => RuleKind::Temporal,
        }
    }

    /// Returns every resource field the rule reads.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Rule::Ownership { field } | Rule::Organization { field } => vec![field.as_str()],
            Rule::Attribute(predicate) => predicate.resource_fields(),
            Rule::Temporal {
                valid_from,
                valid_until,
            } => valid_from
                .iter()
                .chain(valid_until.iter())
                .map(String::as_str)
                .collect(),
        }
    }
}

/// Visibility and editability of one field for one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAccess {
    /// Whether the field may be read.
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Whether the field may be written. Never true for hidden fields.
    #[serde(default = "default_true")]
    pub editable: bool,
}

fn default_true() -> bool {
    true
}

impl FieldAccess {
    /// Readable and writable.
    pub const FULL: FieldAccess = FieldAccess {
        visible: true,
        editable: true,
    };

    /// Readable only.
    pub const READ_ONLY: FieldAccess = FieldAccess {
        visible: true,
        editable: false,
    };

    /// Neither readable nor writable.
    pub const HIDDEN: FieldAccess = FieldAccess {
        visible: false,
        editable: false,
    };

    /// Creates an access entry; a hidden field is never editable.
    #[must_use]
    pub const fn new(visible: bool, editable: bool) -> Self {
        Self {
            visible,
            editable: visible && editable,
        }
    }

    /// Returns true if the field takes part in `operation`.
    #[must_use]
    pub const fn permits(self, operation: Operation) -> bool {
        match operation {
            Operation::Read => self.visible,
            Operation::Create | Operation::Update => self.visible && self.editable,
            Operation::Delete => true,
        }
    }
}

impl Default for FieldAccess {
    fn default() -> Self {
        Self::FULL
    }
}

/// Permission configuration of one entity.
///
/// Built once at startup and read-only afterwards. Rules for each
/// operation are kept sorted by [`RuleKind`] so the engine walks them in
/// evaluation order; several rules of one kind must all pass.
#[derive(Debug, Clone, Default)]
pub struct EntityPermissionConfig {
    grants: BTreeMap<Role, BTreeSet<Operation>>,
    rules: BTreeMap<Operation, Vec<Rule>>,
    field_overrides: BTreeMap<Role, BTreeMap<String, FieldAccess>>,
}

impl EntityPermissionConfig {
    /// Creates an empty configuration that grants nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants operations to a role.
    #[must_use]
    pub fn grant(mut self, role: Role, operations: impl IntoIterator<Item = Operation>) -> Self {
        self.grants.entry(role).or_default().extend(operations);
        self
    }

    /// Attaches a rule to an operation.
    #[must_use]
    pub fn rule(mut self, operation: Operation, rule: Rule) -> Self {
        let rules = self.rules.entry(operation).or_default();
        rules.push(rule);
        rules.sort_by_key(Rule::kind);
        self
    }

    /// Attaches a rule to several operations.
    #[must_use]
    pub fn rule_for(self, operations: impl IntoIterator<Item = Operation>, rule: Rule) -> Self {
        operations
            .into_iter()
            .fold(self, |config, operation| config.rule(operation, rule.clone()))
    }

    /// Narrows one field for one role.
    #[must_use]
    pub fn field_access(mut self, role: Role, field: impl Into<String>, access: FieldAccess) -> Self {
        let access = FieldAccess::new(access.visible, access.editable);
        self.field_overrides
            .entry(role)
            .or_default()
            .insert(field.into(), access);
        self
    }

    /// Returns true if the role is explicitly granted the operation.
    #[must_use]
    pub fn is_granted(&self, role: Role, operation: Operation) -> bool {
        self.grants
            .get(&role)
            .is_some_and(|operations| operations.contains(&operation))
    }

    /// Returns the rules attached to an operation, in evaluation order.
    #[must_use]
    pub fn rules(&self, operation: Operation) -> &[Rule] {
        self.rules.get(&operation).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the effective access of a role to a field.
    ///
    /// Fields without an override inherit the role baseline.
    #[must_use]
    pub fn access(&self, role: Role, field: &str) -> FieldAccess {
        self.field_overrides
            .get(&role)
            .and_then(|fields| fields.get(field))
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn all_rules(&self) -> impl Iterator<Item = (Operation, &Rule)> {
        self.rules
            .iter()
            .flat_map(|(operation, rules)| rules.iter().map(move |rule| (*operation, rule)))
    }

    pub(crate) fn overridden_fields(&self) -> impl Iterator<Item = (Role, &str)> {
        self.field_overrides.iter().flat_map(|(role, fields)| {
            fields.keys().map(move |field| (*role, field.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_are_explicit() {
        let config = EntityPermissionConfig::new().grant(Role::User, [Operation::Read]);
        assert!(config.is_granted(Role::User, Operation::Read));
        assert!(!config.is_granted(Role::User, Operation::Update));
        assert!(!config.is_granted(Role::Guest, Operation::Read));
    }

    #[test]
    fn rules_are_kept_in_evaluation_order() {
        let config = EntityPermissionConfig::new()
            .rule(Operation::Update, Rule::temporal(Some("from"), None))
            .rule(Operation::Update, Rule::organization("orgId"))
            .rule(Operation::Update, Rule::ownership("authorId"));

        let kinds: Vec<_> = config.rules(Operation::Update).iter().map(Rule::kind).collect();
        assert_eq!(
            kinds,
            vec![RuleKind::Ownership, RuleKind::Organization, RuleKind::Temporal]
        );
        assert!(config.rules(Operation::Read).is_empty());
    }

    #[test]
    fn rule_for_attaches_to_each_operation() {
        let config = EntityPermissionConfig::new()
            .rule_for([Operation::Update, Operation::Delete], Rule::ownership("authorId"));
        assert_eq!(config.rules(Operation::Update).len(), 1);
        assert_eq!(config.rules(Operation::Delete).len(), 1);
        assert!(config.rules(Operation::Create).is_empty());
    }

    #[test]
    fn hidden_fields_are_never_editable() {
        let config = EntityPermissionConfig::new().field_access(
            Role::User,
            "secret",
            FieldAccess {
                visible: false,
                editable: true,
            },
        );
        let access = config.access(Role::User, "secret");
        assert!(!access.visible);
        assert!(!access.editable);
        assert_eq!(config.access(Role::User, "title"), FieldAccess::FULL);
    }

    #[test]
    fn field_access_per_operation() {
        assert!(FieldAccess::READ_ONLY.permits(Operation::Read));
        assert!(!FieldAccess::READ_ONLY.permits(Operation::Update));
        assert!(!FieldAccess::HIDDEN.permits(Operation::Read));
        assert!(FieldAccess::HIDDEN.permits(Operation::Delete));
    }

    #[test]
    fn rule_fields() {
        assert_eq!(Rule::ownership("authorId").fields(), vec!["authorId"]);
        assert_eq!(
            Rule::temporal(Some("validFrom"), Some("validUntil")).fields(),
            vec!["validFrom", "validUntil"]
        );
    }
}
