//! # EntiGate Core
//!
//! Entity authorization and versioned mutations.
//!
//! This crate provides:
//! - An entity registry, built once and read-only afterwards
//! - A permission engine evaluating role, ownership, organization,
//!   attribute, temporal, and field-level rules
//! - Schema validation of mutation payloads
//! - An append-only, digest-chained audit history
//! - A mutation pipeline with optimistic concurrency and rollback
//!
//! Persistence is delegated to an [`entigate_storage::RecordStore`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod actor;
mod clock;
mod config;
mod error;
pub mod history;
pub mod mutation;
pub mod permission;
pub mod registry;
mod validation;

pub use actor::{Actor, Role};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PipelineConfig;
pub use error::{HistoryError, HistoryResult, MutationError, MutationResult, RegistryError, RegistryResult};
pub use history::{ChangeKind, Diff, FieldChange, History, HistoryEntry, HistoryStore};
pub use mutation::{MutationContext, MutationPipeline, MutationStage};
pub use permission::{
    AttributePredicate, CompareOp, DeniedReason, EntityPermissionConfig, FieldAccess, Operand,
    Operation, PermissionDecision, PermissionEngine, Rule, RuleKind,
};
pub use registry::{EntityDef, EntityRegistry, FieldDef, FieldKind, MutationConfig, RegistryBuilder};
pub use validation::{SchemaValidator, ValidationIssue, ValidationMode, ValidationOutcome, Validator};
