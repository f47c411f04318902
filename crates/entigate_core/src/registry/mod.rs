//! Entity registry.
//!
//! The registry is built once at startup, validated as a whole, and is
//! read-only afterwards. It is shared by `Arc` with the pipeline; there
//! is no global instance.

mod builder;
mod declaration;
mod entity;

pub use builder::RegistryBuilder;
pub use declaration::{
    EntityDeclaration, FieldDeclaration, PermissionDeclaration, PredicateDeclaration,
    RuleDeclaration,
};
pub use entity::{EntityDef, FieldDef, FieldKind, MutationConfig};

use crate::error::RegistryResult;
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only lookup of registered entities by name.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: HashMap<String, Arc<EntityDef>>,
}

impl EntityRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Builds a registry from declarations.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn from_declarations(
        declarations: impl IntoIterator<Item = EntityDeclaration>,
    ) -> RegistryResult<Self> {
        declarations
            .into_iter()
            .fold(RegistryBuilder::new(), |builder, declaration| {
                builder.entity(declaration.into())
            })
            .build()
    }

    /// Builds a registry from a JSON array of declarations.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RegistryError::Declaration`] for malformed JSON and
    /// the first validation error otherwise.
    pub fn from_json_str(json: &str) -> RegistryResult<Self> {
        let declarations: Vec<EntityDeclaration> = serde_json::from_str(json)?;
        Self::from_declarations(declarations)
    }

    pub(crate) fn from_map(entities: HashMap<String, Arc<EntityDef>>) -> Self {
        Self { entities }
    }

    /// Looks up an entity by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<EntityDef>> {
        self.entities.get(name)
    }

    /// Returns true if an entity with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Iterates over the registered entity names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Returns the number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
