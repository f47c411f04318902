//! Entity definitions.

use crate::permission::EntityPermissionConfig;
use entigate_model::{EntityName, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// UTF-8 text.
    Text,
    /// Signed 64-bit integer.
    Integer,
    /// Boolean.
    Bool,
    /// Milliseconds since the Unix epoch, stored as an integer.
    Timestamp,
    /// Raw bytes.
    Bytes,
    /// Any structured value.
    Json,
}

impl FieldKind {
    /// Returns true if `value` has this kind. `Null` is checked separately.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::Text => matches!(value, Value::Text(_)),
            FieldKind::Integer | FieldKind::Timestamp => matches!(value, Value::Integer(_)),
            FieldKind::Bool => matches!(value, Value::Bool(_)),
            FieldKind::Bytes => matches!(value, Value::Bytes(_)),
            FieldKind::Json => true,
        }
    }

    /// Returns the lowercase kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Bool => "bool",
            FieldKind::Timestamp => "timestamp",
            FieldKind::Bytes => "bytes",
            FieldKind::Json => "json",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Storage type.
    pub kind: FieldKind,
    /// Must be present and non-null.
    pub required: bool,
    /// May not change after insert.
    pub immutable: bool,
}

impl FieldDef {
    /// Creates an optional, mutable field.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            immutable: false,
        }
    }

    /// Marks the field required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field immutable.
    #[must_use]
    pub const fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }
}

/// Mutation behaviour of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationConfig {
    /// Whether resources may be rolled back to earlier versions.
    #[serde(default = "default_rollback")]
    pub rollback_enabled: bool,
}

fn default_rollback() -> bool {
    true
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            rollback_enabled: default_rollback(),
        }
    }
}

/// A registered entity: its schema, permissions, and mutation behaviour.
#[derive(Debug, Clone)]
pub struct EntityDef {
    name: EntityName,
    table: String,
    fields: Vec<FieldDef>,
    permissions: EntityPermissionConfig,
    mutation: MutationConfig,
}

impl EntityDef {
    /// Creates an entity with no fields that grants nothing.
    ///
    /// The table name defaults to the entity name.
    pub fn new(name: impl Into<EntityName>) -> Self {
        let name = name.into();
        Self {
            table: name.as_str().to_string(),
            name,
            fields: Vec::new(),
            permissions: EntityPermissionConfig::new(),
            mutation: MutationConfig::default(),
        }
    }

    /// Sets the table name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Appends a field.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Sets the permission configuration.
    #[must_use]
    pub fn permissions(mut self, permissions: EntityPermissionConfig) -> Self {
        self.permissions = permissions;
        self
    }

    /// Sets the mutation configuration.
    #[must_use]
    pub fn mutation(mut self, mutation: MutationConfig) -> Self {
        self.mutation = mutation;
        self
    }

    /// Returns the entity name.
    #[must_use]
    pub fn name(&self) -> &EntityName {
        &self.name
    }

    /// Returns the table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Returns the declared fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Iterates over field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    /// Returns the permission configuration.
    #[must_use]
    pub fn permission_config(&self) -> &EntityPermissionConfig {
        &self.permissions
    }

    /// Returns the mutation configuration.
    #[must_use]
    pub fn mutation_config(&self) -> MutationConfig {
        self.mutation
    }
}
