//! Multi-dimensional authorization.
//!
//! An [`EntityPermissionConfig`] declares which roles may perform which
//! operations, which resource-dependent [`Rule`]s must hold, and how each
//! role sees individual fields. The [`PermissionEngine`] evaluates that
//! configuration into a [`PermissionDecision`].

mod config;
mod decision;
mod engine;
mod predicate;

pub use config::{EntityPermissionConfig, FieldAccess, Operation, Rule, RuleKind};
pub use decision::{DeniedReason, PermissionDecision};
pub use engine::{role_allowed_fields, PermissionEngine};
pub use predicate::{AttributePredicate, CompareOp, CustomPredicate, Operand};
