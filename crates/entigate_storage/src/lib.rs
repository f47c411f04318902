//! # EntiGate Storage
//!
//! Persistence collaborator interface for EntiGate.
//!
//! EntiGate does not own a persistence engine. It reads and writes the
//! latest version of each resource through the narrow [`RecordStore`]
//! trait, whose single write operation is a compare-and-set on the
//! resource version. That compare-and-set is the only place concurrent
//! writers are ordered.
//!
//! ## Available Stores
//!
//! - [`InMemoryRecordStore`] - For testing and embedded use

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryRecordStore;
pub use store::{RecordStore, RecordWrite};
