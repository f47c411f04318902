//! Registry construction and validation.

use super::entity::{EntityDef, FieldKind};
use super::EntityRegistry;
use crate::error::{RegistryError, RegistryResult};
use crate::permission::Rule;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Collects entity definitions and validates them into an [`EntityRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entities: Vec<EntityDef>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity.
    #[must_use]
    pub fn entity(mut self, entity: EntityDef) -> Self {
        self.entities.push(entity);
        self
    }

    /// Validates every entity and builds the registry.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate entities or fields, for rules and
    /// field overrides naming undeclared fields, and for temporal bounds
    /// on fields that do not hold timestamps.
    pub fn build(self) -> RegistryResult<EntityRegistry> {
        let mut entities = HashMap::with_capacity(self.entities.len());
        for entity in self.entities {
            check_entity(&entity)?;
            let name = entity.name().as_str().to_string();
            if entities.contains_key(&name) {
                return Err(RegistryError::DuplicateEntity(name));
            }
            debug!(entity = %name, fields = entity.fields().len(), "registered entity");
            entities.insert(name, Arc::new(entity));
        }
        Ok(EntityRegistry::from_map(entities))
    }
}

fn check_entity(entity: &EntityDef) -> RegistryResult<()> {
    let name = entity.name().as_str();

    let mut seen = BTreeSet::new();
    for field in entity.field_names() {
        if !seen.insert(field) {
            return Err(RegistryError::DuplicateField {
                entity: name.to_string(),
                field: field.to_string(),
            });
        }
    }

    let config = entity.permission_config();
    for (operation, rule) in config.all_rules() {
        for field in rule.fields() {
            if entity.get_field(field).is_none() {
                return Err(RegistryError::UnknownField {
                    entity: name.to_string(),
                    field: field.to_string(),
                    context: format!("{operation} {:?} rule", rule.kind()),
                });
            }
        }
        if let Rule::Temporal { .. } = rule {
            for field in rule.fields() {
                let kind = entity.get_field(field).map(|f| f.kind);
                if !matches!(kind, Some(FieldKind::Timestamp | FieldKind::Integer)) {
                    return Err(RegistryError::InvalidRule {
                        entity: name.to_string(),
                        message: format!("temporal bound '{field}' must be a timestamp"),
                    });
                }
            }
        }
    }

    for (role, field) in config.overridden_fields() {
        if entity.get_field(field).is_none() {
            return Err(RegistryError::UnknownField {
                entity: name.to_string(),
                field: field.to_string(),
                context: format!("{role} field override"),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;
    use crate::permission::{AttributePredicate, EntityPermissionConfig, FieldAccess, Operation};
    use crate::registry::FieldDef;

    fn post() -> EntityDef {
        EntityDef::new("post")
            .field(FieldDef::new("title", FieldKind::Text))
            .field(FieldDef::new("authorId", FieldKind::Text))
            .field(FieldDef::new("publishAt", FieldKind::Timestamp))
    }

    #[test]
    fn builds_valid_registry() {
        let registry = RegistryBuilder::new()
            .entity(post().permissions(
                EntityPermissionConfig::new()
                    .grant(Role::User, [Operation::Read])
                    .rule(Operation::Update, Rule::ownership("authorId"))
                    .rule(Operation::Read, Rule::temporal(Some("publishAt"), None))
                    .field_access(Role::Guest, "authorId", FieldAccess::HIDDEN),
            ))
            .entity(EntityDef::new("comment"))
            .build()
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get("post").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn rejects_duplicate_entity() {
        let err = RegistryBuilder::new()
            .entity(post())
            .entity(post())
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateEntity(name) if name == "post"));
    }

    #[test]
    fn rejects_duplicate_field() {
        let err = RegistryBuilder::new()
            .entity(post().field(FieldDef::new("title", FieldKind::Text)))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateField { field, .. } if field == "title"));
    }

    #[test]
    fn rejects_rules_on_unknown_fields() {
        let err = RegistryBuilder::new()
            .entity(post().permissions(
                EntityPermissionConfig::new()
                    .rule(Operation::Delete, Rule::Attribute(AttributePredicate::field_equals("status", "draft"))),
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownField { field, .. } if field == "status"));

        let err = RegistryBuilder::new()
            .entity(post().permissions(
                EntityPermissionConfig::new().field_access(Role::User, "salary", FieldAccess::HIDDEN),
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownField { field, .. } if field == "salary"));
    }

    #[test]
    fn rejects_non_timestamp_temporal_bound() {
        let err = RegistryBuilder::new()
            .entity(post().permissions(
                EntityPermissionConfig::new().rule(Operation::Read, Rule::temporal(None, Some("title"))),
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRule { .. }));
    }
}
