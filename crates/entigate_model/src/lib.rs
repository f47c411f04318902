//! # EntiGate Model
//!
//! Shared data model for EntiGate.
//!
//! This crate provides the types every other layer agrees on:
//! - [`Value`] and [`Fields`] for dynamic field values
//! - Identifiers for entities, resources, actors, organizations, and requests
//! - [`Version`] and [`Timestamp`]
//! - [`VersionedRecord`], the unit exchanged with persistence
//!
//! ## Usage
//!
//! ```
//! use entigate_model::{Fields, ResourceId, Timestamp, Value, Version, VersionedRecord};
//!
//! let mut fields = Fields::new();
//! fields.insert("title".into(), Value::from("Hello"));
//!
//! let record = VersionedRecord::new(ResourceId::new(), Version::INITIAL, fields, Timestamp::now());
//! assert_eq!(record.get("title"), Some(&Value::from("Hello")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod id;
mod record;
mod types;
mod value;

pub use id::{ActorId, EntityName, OrgId, RequestId, ResourceId};
pub use record::VersionedRecord;
pub use types::{Timestamp, Version};
pub use value::{Fields, Value};
