//! Payload validation.
//!
//! Validation runs after authorization and before versioning. A
//! [`Validator`] reports problems as data: it never fails or panics, and
//! the pipeline turns an [`ValidationOutcome::Invalid`] into
//! [`crate::MutationError::ValidationFailed`].

use crate::registry::EntityDef;
use entigate_model::{Fields, Value};
use serde::Serialize;
use std::fmt;

/// One problem found in a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// The offending field.
    pub path: String,
    /// Human-readable description.
    pub message: String,
}

impl ValidationIssue {
    /// Creates an issue.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Result of validating a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// No issues.
    Valid,
    /// At least one issue.
    Invalid(Vec<ValidationIssue>),
}

impl ValidationOutcome {
    /// `Valid` for an empty list, `Invalid` otherwise.
    #[must_use]
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        if issues.is_empty() {
            Self::Valid
        } else {
            Self::Invalid(issues)
        }
    }

    /// Returns true if there are no issues.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Returns the issues found.
    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            Self::Valid => &[],
            Self::Invalid(issues) => issues,
        }
    }
}

/// What kind of payload is being validated.
#[derive(Debug, Clone, Copy)]
pub enum ValidationMode<'a> {
    /// A complete set of fields for a new resource.
    Insert,
    /// A partial set of fields applied on top of `current`.
    Patch {
        /// The resource's fields before the patch.
        current: &'a Fields,
    },
}

/// Checks payloads against an entity.
pub trait Validator: Send + Sync {
    /// Validates `payload` for `entity`.
    fn validate(&self, entity: &EntityDef, payload: &Fields, mode: ValidationMode<'_>) -> ValidationOutcome;
}

/// Validates payloads against the entity's declared fields.
///
/// Checks, in field order:
/// - fields the entity does not declare (when rejecting unknown fields)
/// - values of the wrong kind
/// - null in a required field
/// - required fields missing from an insert
/// - changes to immutable fields in a patch
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    reject_unknown_fields: bool,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    /// Creates a validator that rejects unknown fields.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reject_unknown_fields: true,
        }
    }

    /// Sets whether unknown fields are rejected.
    #[must_use]
    pub const fn reject_unknown_fields(mut self, value: bool) -> Self {
        self.reject_unknown_fields = value;
        self
    }
}

impl Validator for SchemaValidator {
    fn validate(&self, entity: &EntityDef, payload: &Fields, mode: ValidationMode<'_>) -> ValidationOutcome {
        let mut issues = Vec::new();

        for (name, value) in payload {
            let Some(field) = entity.get_field(name) else {
                if self.reject_unknown_fields {
                    issues.push(ValidationIssue::new(
                        name,
                        format!("unknown field for entity {}", entity.name()),
                    ));
                }
                continue;
            };

            if value.is_null() {
                if field.required {
                    issues.push(ValidationIssue::new(name, "required field cannot be null"));
                }
            } else if !field.kind.accepts(value) {
                issues.push(ValidationIssue::new(
                    name,
                    format!("expected {}, got {}", field.kind, value.type_name()),
                ));
            }

            if let ValidationMode::Patch { current } = mode {
                let before = current.get(name).unwrap_or(&Value::Null);
                if field.immutable && before != value {
                    issues.push(ValidationIssue::new(name, "immutable field cannot change"));
                }
            }
        }

        if let ValidationMode::Insert = mode {
            for field in entity.fields() {
                if field.required && !payload.contains_key(&field.name) {
                    issues.push(ValidationIssue::new(&field.name, "required field is missing"));
                }
            }
        }

        ValidationOutcome::from_issues(issues)
    }
}
