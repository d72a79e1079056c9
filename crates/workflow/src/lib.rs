//! Order workflow engine.
//!
//! A [`WorkflowDefinition`] describes states and event-driven transitions;
//! [`Engine`] interprets it against a [`WorkflowInstance`] and the
//! caller-owned [`EntityState`]. Role gates are decided by `bobbin-access`.
//!
//! The engine is synchronous and holds no shared state. Serializing
//! concurrent transitions on one instance is the storage layer's job.

pub mod condition;
pub mod definition;
pub mod engine;
pub mod error;
pub mod instance;
pub mod key;
pub mod legacy;
pub mod templates;
pub mod validate;

pub use condition::{ConditionDelegate, NoDelegate, Scope};
pub use definition::{
    Action, Condition, ConditionOperator, Directive, Metadata, Position, StateKind, StateNode,
    Transition, WorkflowDefinition,
};
pub use engine::{AvailableTransition, Engine, Operator, TransitionReceipt, TransitionRequest};
pub use error::{DefinitionError, WorkflowError};
pub use instance::{
    EntityState, HistoryEntry, RollbackDetails, RollbackRecord, Variables, WorkflowInstance,
    ROLLBACK_EVENT,
};
pub use key::StateKey;
pub use validate::{validate, ValidationReport, ValidationWarning};
