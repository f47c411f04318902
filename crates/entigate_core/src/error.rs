//! Error types for EntiGate core.

use crate::permission::{DeniedReason, Operation};
use crate::validation::ValidationIssue;
use entigate_model::{EntityName, ResourceId, Version};
use entigate_storage::StorageError;
use thiserror::Error;

/// Result type for mutation pipeline operations.
pub type MutationResult<T> = Result<T, MutationError>;

/// Result type for registry construction.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for audit history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Errors returned by the mutation pipeline.
///
/// Everything except [`MutationError::HistoryCorrupted`] and
/// [`MutationError::Storage`] is an expected outcome the caller can
/// remedy: switch actor or resource, fix the payload, or retry with a
/// refreshed version.
#[derive(Debug, Error)]
pub enum MutationError {
    /// The actor's role is not granted the operation.
    #[error("role denied: {operation} not granted")]
    RoleDenied {
        /// The attempted operation.
        operation: Operation,
    },

    /// The resource is not owned by the actor.
    #[error("ownership denied: {operation} requires '{field}' to match the actor")]
    OwnershipDenied {
        /// The attempted operation.
        operation: Operation,
        /// The ownership field that did not match.
        field: String,
    },

    /// The resource belongs to a different organization.
    #[error("organization denied: {operation} requires '{field}' to match the actor's organization")]
    OrganizationDenied {
        /// The attempted operation.
        operation: Operation,
        /// The organization field that did not match.
        field: String,
    },

    /// An attribute predicate evaluated to false.
    #[error("attribute denied: {operation} predicate not satisfied")]
    AttributeDenied {
        /// The attempted operation.
        operation: Operation,
    },

    /// The resource is outside its validity window.
    #[error("temporal denied: {operation} outside the resource validity window")]
    TemporalDenied {
        /// The attempted operation.
        operation: Operation,
    },

    /// The payload touches fields the actor may not edit.
    #[error("field permission denied: {operation} may not touch {fields:?}")]
    FieldPermissionDenied {
        /// The attempted operation.
        operation: Operation,
        /// The offending fields.
        fields: Vec<String>,
    },

    /// The payload failed schema validation.
    #[error("validation failed: {} issue(s)", issues.len())]
    ValidationFailed {
        /// Every issue found, in field order.
        issues: Vec<ValidationIssue>,
    },

    /// The resource moved past the version the caller expected.
    #[error("version conflict: expected {expected}, actual {actual}")]
    VersionConflict {
        /// The version the caller based its change on.
        expected: Version,
        /// The version currently committed.
        actual: Version,
    },

    /// The requested rollback target is not an earlier version in history.
    #[error("rollback target {target} not found (current {current})")]
    RollbackTargetNotFound {
        /// The requested target.
        target: Version,
        /// The current version of the resource.
        current: Version,
    },

    /// The audit history violated its invariants. Not retryable.
    #[error("history corrupted: {0}")]
    HistoryCorrupted(#[from] HistoryError),

    /// No entity with this name is registered.
    #[error("unknown entity: {entity}")]
    UnknownEntity {
        /// The requested entity name.
        entity: String,
    },

    /// The resource has no live record.
    #[error("resource not found: {entity}/{id}")]
    NotFound {
        /// The entity searched.
        entity: EntityName,
        /// The resource that was not found.
        id: ResourceId,
    },

    /// Rollback is disabled for this entity.
    #[error("rollback disabled for entity {entity}")]
    RollbackDisabled {
        /// The entity.
        entity: EntityName,
    },

    /// The persistence collaborator failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl MutationError {
    /// Creates the error matching a permission denial.
    pub fn denied(operation: Operation, reason: DeniedReason) -> Self {
        match reason {
            DeniedReason::Role => Self::RoleDenied { operation },
            DeniedReason::Ownership { field } => Self::OwnershipDenied { operation, field },
            DeniedReason::Organization { field } => Self::OrganizationDenied { operation, field },
            DeniedReason::Attribute => Self::AttributeDenied { operation },
            DeniedReason::Temporal => Self::TemporalDenied { operation },
        }
    }

    /// Returns true for authorization failures.
    #[must_use]
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            Self::RoleDenied { .. }
                | Self::OwnershipDenied { .. }
                | Self::OrganizationDenied { .. }
                | Self::AttributeDenied { .. }
                | Self::TemporalDenied { .. }
                | Self::FieldPermissionDenied { .. }
        )
    }

    /// Returns true if the caller can remedy the failure and try again.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::HistoryCorrupted(_) | Self::Storage(_))
    }

    /// Returns true for invariant violations that must be surfaced, not retried.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::HistoryCorrupted(_))
    }
}

/// Violations of the audit history invariants.
///
/// These indicate a bug or tampering, never a user error. A resource whose
/// history reported one of these is poisoned for further appends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// An append did not continue the gapless version sequence.
    #[error("{entity}/{id}: expected version {expected}, got {found}")]
    VersionGap {
        /// The entity.
        entity: EntityName,
        /// The resource.
        id: ResourceId,
        /// The only acceptable next version.
        expected: Version,
        /// The version that was offered.
        found: Version,
    },

    /// A stored digest does not match the recomputed chain.
    #[error("{entity}/{id}: digest mismatch at {version}")]
    DigestMismatch {
        /// The entity.
        entity: EntityName,
        /// The resource.
        id: ResourceId,
        /// The first entry whose digest does not match.
        version: Version,
    },

    /// The live record and the history disagree on the latest version.
    #[error("{entity}/{id}: live record at {live} but history at {recorded}")]
    Diverged {
        /// The entity.
        entity: EntityName,
        /// The resource.
        id: ResourceId,
        /// Version of the live record.
        live: Version,
        /// Latest version recorded in history.
        recorded: Version,
    },

    /// An earlier violation closed this resource's history.
    #[error("{entity}/{id}: history is poisoned")]
    Poisoned {
        /// The entity.
        entity: EntityName,
        /// The resource.
        id: ResourceId,
    },
}

/// Errors found while building an entity registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two entities share a name.
    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),

    /// An entity declares the same field twice.
    #[error("duplicate field '{field}' in entity {entity}")]
    DuplicateField {
        /// The entity.
        entity: String,
        /// The repeated field.
        field: String,
    },

    /// A rule or override references a field the entity does not declare.
    #[error("entity {entity}: {context} references unknown field '{field}'")]
    UnknownField {
        /// The entity.
        entity: String,
        /// The missing field.
        field: String,
        /// Where the reference appeared.
        context: String,
    },

    /// A rule is malformed for the entity.
    #[error("entity {entity}: invalid rule: {message}")]
    InvalidRule {
        /// The entity.
        entity: String,
        /// Description of the problem.
        message: String,
    },

    /// Entity declarations could not be parsed.
    #[error("invalid entity declaration: {0}")]
    Declaration(#[from] serde_json::Error),
}
