//! # EntiGate Testkit
//!
//! Test utilities for EntiGate.
//!
//! This crate provides:
//! - A fixture registry, actors, and a pipeline harness on a manual clock
//! - Property-based test generators using proptest
//! - A fault-injecting record store
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use entigate_testkit::prelude::*;
//!
//! #[test]
//! fn author_can_update() {
//!     let harness = TestPipeline::new();
//!     let post = harness.insert(&user("alice"), "post", post_payload("alice")).unwrap();
//!     // ... further mutations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faulty;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use faulty::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
