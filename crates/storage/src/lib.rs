//! Persistence for workflow definitions, instances and entity documents.
//!
//! Backends implement [`InstanceStore`] and [`DefinitionStore`];
//! [`WorkflowService`] drives the engine against them with optimistic
//! concurrency on instance versions.

pub mod conformance;
mod error;
mod memory;
mod service;
mod traits;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use service::{ServiceError, Target, TransitionOutcome, WorkflowService};
pub use traits::{DefinitionStore, InstanceStore};
