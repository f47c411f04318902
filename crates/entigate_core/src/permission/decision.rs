//! Authorization decisions.

use crate::permission::config::RuleKind;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Why an operation was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeniedReason {
    /// The role is not granted the operation.
    Role,
    /// The ownership field does not hold the actor's id.
    Ownership {
        /// The ownership field.
        field: String,
    },
    /// The organization field does not hold the actor's organization.
    Organization {
        /// The organization field.
        field: String,
    },
    /// The attribute predicate is false.
    Attribute,
    /// Now is outside the resource validity window.
    Temporal,
}

impl DeniedReason {
    /// Returns the dimension that denied.
    #[must_use]
    pub fn kind(&self) -> RuleKind {
        match self {
            Self::Role => RuleKind::Role,
            Self::Ownership { .. } => RuleKind::Ownership,
            Self::Organization { .. } => RuleKind::Organization,
            Self::Attribute => RuleKind::Attribute,
            Self::Temporal => RuleKind::Temporal,
        }
    }
}

impl fmt::Display for DeniedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role => f.write_str("role denied"),
            Self::Ownership { field } => write!(f, "ownership denied ({field})"),
            Self::Organization { field } => write!(f, "organization denied ({field})"),
            Self::Attribute => f.write_str("attribute denied"),
            Self::Temporal => f.write_str("temporal denied"),
        }
    }
}

/// Result of a permission check.
///
/// `denied_fields` narrows an allowed operation without denying it: the
/// caller renders or accepts every other field. `deferred` lists the
/// resource-dependent dimensions that were skipped because no resource
/// was supplied; such a decision is provisional and must be re-checked
/// once the resource is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionDecision {
    /// Whether the operation may proceed.
    pub allowed: bool,
    /// Why it may not, when `allowed` is false.
    pub denied_reason: Option<DeniedReason>,
    /// Fields excluded from an allowed operation.
    pub denied_fields: BTreeSet<String>,
    /// Dimensions not yet evaluated for lack of a resource.
    pub deferred: BTreeSet<RuleKind>,
}

impl PermissionDecision {
    /// An allowed decision.
    #[must_use]
    pub fn allow(denied_fields: BTreeSet<String>, deferred: BTreeSet<RuleKind>) -> Self {
        Self {
            allowed: true,
            denied_reason: None,
            denied_fields,
            deferred,
        }
    }

    /// A denied decision.
    #[must_use]
    pub fn deny(reason: DeniedReason) -> Self {
        Self {
            allowed: false,
            denied_reason: Some(reason),
            denied_fields: BTreeSet::new(),
            deferred: BTreeSet::new(),
        }
    }

    /// Returns true if the operation may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Returns true if no dimension was deferred.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.deferred.is_empty()
    }

    /// Returns true if the operation is allowed and `field` is not narrowed away.
    #[must_use]
    pub fn permits_field(&self, field: &str) -> bool {
        self.allowed && !self.denied_fields.contains(field)
    }
}
