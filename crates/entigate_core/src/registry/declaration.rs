//! Declarative entity descriptions.
//!
//! Entities can be described as data instead of code:
//!
//! ```json
//! [{
//!   "name": "post",
//!   "fields": [
//!     { "name": "title", "kind": "text", "required": true },
//!     { "name": "authorId", "kind": "text", "required": true, "immutable": true },
//!     { "name": "status", "kind": "text" }
//!   ],
//!   "permissions": {
//!     "read":   { "roles": ["admin", "user", "guest"] },
//!     "update": { "roles": ["admin", "user"],
//!                 "rules": [{ "kind": "ownership", "field": "authorId" }] },
//!     "delete": { "roles": ["user"],
//!                 "rules": [{ "kind": "attribute",
//!                             "predicate": { "compare": {
//!                               "left": { "resource": "status" }, "op": "eq",
//!                               "right": { "literal": "draft" } } } }] }
//!   },
//!   "fieldAccess": { "guest": { "authorId": { "visible": false } } }
//! }]
//! ```
//!
//! Custom closure predicates have no declarative form.

use super::entity::{EntityDef, FieldDef, FieldKind, MutationConfig};
use crate::actor::Role;
use crate::permission::{
    AttributePredicate, CompareOp, EntityPermissionConfig, FieldAccess, Operand, Operation, Rule,
};
use serde::Deserialize;
use std::collections::BTreeMap;

/// A serialized entity.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntityDeclaration {
    /// Entity name.
    pub name: String,
    /// Table name; defaults to the entity name.
    #[serde(default)]
    pub table: Option<String>,
    /// Fields in declaration order.
    #[serde(default)]
    pub fields: Vec<FieldDeclaration>,
    /// Per-operation grants and rules.
    #[serde(default)]
    pub permissions: BTreeMap<Operation, PermissionDeclaration>,
    /// Per-role field overrides.
    #[serde(default)]
    pub field_access: BTreeMap<Role, BTreeMap<String, FieldAccess>>,
    /// Mutation behaviour.
    #[serde(default)]
    pub mutation: MutationConfig,
}

/// A serialized field.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDeclaration {
    /// Field name.
    pub name: String,
    /// Storage type.
    pub kind: FieldKind,
    /// Must be present and non-null.
    #[serde(default)]
    pub required: bool,
    /// May not change after insert.
    #[serde(default)]
    pub immutable: bool,
}

/// Grants and rules of one operation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionDeclaration {
    /// Roles granted the operation.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Rules that must all hold.
    #[serde(default)]
    pub rules: Vec<RuleDeclaration>,
}

/// A serialized rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum RuleDeclaration {
    /// See [`Rule::Ownership`].
    Ownership {
        /// Field holding the owner id.
        field: String,
    },
    /// See [`Rule::Organization`].
    Organization {
        /// Field holding the organization id.
        field: String,
    },
    /// See [`Rule::Attribute`].
    Attribute {
        /// The predicate.
        predicate: PredicateDeclaration,
    },
    /// See [`Rule::Temporal`].
    Temporal {
        /// Start-of-validity field.
        #[serde(default, rename = "validFrom")]
        valid_from: Option<String>,
        /// End-of-validity field.
        #[serde(default, rename = "validUntil")]
        valid_until: Option<String>,
    },
}

/// A serialized attribute predicate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateDeclaration {
    /// A comparison.
    Compare {
        /// Left operand.
        left: Operand,
        /// Operator.
        op: CompareOp,
        /// Right operand.
        right: Operand,
    },
    /// Conjunction.
    All(Vec<PredicateDeclaration>),
    /// Disjunction.
    Any(Vec<PredicateDeclaration>),
    /// Negation.
    Not(Box<PredicateDeclaration>),
}

impl From<PredicateDeclaration> for AttributePredicate {
    fn from(declaration: PredicateDeclaration) -> Self {
        match declaration {
            PredicateDeclaration::Compare { left, op, right } => {
                AttributePredicate::compare(left, op, right)
            }
            PredicateDeclaration::All(inner) => {
                AttributePredicate::All(inner.into_iter().map(Into::into).collect())
            }
            PredicateDeclaration::Any(inner) => {
                AttributePredicate::Any(inner.into_iter().map(Into::into).collect())
            }
            PredicateDeclaration::Not(inner) => AttributePredicate::Not(Box::new((*inner).into())),
        }
    }
}

impl From<RuleDeclaration> for Rule {
    fn from(declaration: RuleDeclaration) -> Self {
        match declaration {
            RuleDeclaration::Ownership { field } => Rule::Ownership { field },
            RuleDeclaration::Organization { field } => Rule::Organization { field },
            RuleDeclaration::Attribute { predicate } => Rule::Attribute(predicate.into()),
            RuleDeclaration::Temporal {
                valid_from,
                valid_until,
            } => Rule::Temporal {
                valid_from,
                valid_until,
            },
        }
    }
}

impl From<FieldDeclaration> for FieldDef {
    fn from(declaration: FieldDeclaration) -> Self {
        FieldDef {
            name: declaration.name,
            kind: declaration.kind,
            required: declaration.required,
            immutable: declaration.immutable,
        }
    }
}

impl From<EntityDeclaration> for EntityDef {
    fn from(declaration: EntityDeclaration) -> Self {
        let mut permissions = EntityPermissionConfig::new();
        for (operation, declared) in declaration.permissions {
            for role in declared.roles {
                permissions = permissions.grant(role, [operation]);
            }
            for rule in declared.rules {
                permissions = permissions.rule(operation, rule.into());
            }
        }
        for (role, fields) in declaration.field_access {
            for (field, access) in fields {
                permissions = permissions.field_access(role, field, access);
            }
        }

        let mut entity = EntityDef::new(declaration.name.as_str());
        if let Some(table) = declaration.table {
            entity = entity.table(table);
        }
        declaration
            .fields
            .into_iter()
            .fold(entity, |entity, field| entity.field(field.into()))
            .permissions(permissions)
            .mutation(declaration.mutation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EntityRegistry;
    use crate::RegistryError;

    const POSTS: &str = r#"[{
        "name": "post",
        "table": "posts",
        "fields": [
            { "name": "title", "kind": "text", "required": true },
            { "name": "authorId", "kind": "text", "required": true, "immutable": true },
            { "name": "status", "kind": "text" },
            { "name": "validUntil", "kind": "timestamp" }
        ],
        "permissions": {
            "read": { "roles": ["admin", "user", "guest"],
                      "rules": [{ "kind": "temporal", "validUntil": "validUntil" }] },
            "update": { "roles": ["user"],
                        "rules": [{ "kind": "ownership", "field": "authorId" }] },
            "delete": { "roles": ["user"],
                        "rules": [{ "kind": "attribute", "predicate": { "all": [
                            { "compare": { "left": { "resource": "status" }, "op": "eq",
                                           "right": { "literal": "draft" } } },
                            { "not": { "compare": { "left": "actor_id", "op": "eq",
                                                    "right": { "literal": "banned" } } } }
                        ] } }] }
        },
        "fieldAccess": { "guest": { "authorId": { "visible": false } } },
        "mutation": { "rollbackEnabled": false }
    }]"#;

    #[test]
    fn loads_registry_from_json() {
        let registry = EntityRegistry::from_json_str(POSTS).unwrap();
        let post = registry.get("post").unwrap();

        assert_eq!(post.table_name(), "posts");
        assert_eq!(post.fields().len(), 4);
        assert!(post.get_field("authorId").is_some_and(|f| f.immutable));
        assert!(!post.mutation_config().rollback_enabled);

        let config = post.permission_config();
        assert!(config.is_granted(Role::Guest, Operation::Read));
        assert!(!config.is_granted(Role::Guest, Operation::Update));
        assert_eq!(config.rules(Operation::Update).len(), 1);
        assert_eq!(config.rules(Operation::Delete).len(), 1);
        assert_eq!(config.access(Role::Guest, "authorId"), FieldAccess::HIDDEN);
    }

    #[test]
    fn malformed_json_is_a_declaration_error() {
        let err = EntityRegistry::from_json_str(r#"[{ "name": "post", "colour": "red" }]"#).unwrap_err();
        assert!(matches!(err, RegistryError::Declaration(_)));
    }

    #[test]
    fn declarations_are_validated() {
        let json = r#"[{ "name": "post",
            "permissions": { "update": { "rules": [{ "kind": "ownership", "field": "authorId" }] } } }]"#;
        let err = EntityRegistry::from_json_str(json).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownField { .. }));
    }
}
