use crate::key::StateKey;

/// A definition could not be loaded or is structurally invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to parse {format} definition: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("unsupported definition file (expected .json or .toml): {path}")]
    UnsupportedFormat { path: String },

    #[error("workflow name must not be empty")]
    MissingName,

    #[error("workflow code must not be empty")]
    MissingCode,

    #[error("workflow declares no states")]
    NoStates,

    #[error("state #{index} has an empty code")]
    EmptyStateCode { index: usize },

    #[error("state '{code}' is declared more than once")]
    DuplicateState { code: StateKey },

    #[error("workflow must declare exactly one start state, found {count}")]
    StartStateCount { count: usize },

    #[error("workflow declares no end state")]
    NoEndState,

    #[error("transition {transition} references undeclared state '{state}'")]
    UnknownState { transition: String, state: StateKey },

    #[error("transition {transition} has an empty event")]
    EmptyEvent { transition: String },

    #[error("transition {transition} has a malformed condition: {message}")]
    MalformedCondition { transition: String, message: String },

    #[error("transition {transition} has a malformed action: {message}")]
    MalformedAction { transition: String, message: String },
}

/// A transition or rollback was refused. The instance and entity are
/// unchanged whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error("operator '{operator}' lacks role '{required_role}' required by event '{event}'")]
    Unauthorized {
        event: String,
        required_role: String,
        operator: String,
    },

    #[error("no transition for event '{event}' from state '{state}'")]
    NoMatchingTransition { state: StateKey, event: String },

    #[error("condition not met for event '{event}': {condition} ({reason})")]
    ConditionNotMet {
        event: String,
        condition: String,
        reason: String,
    },

    #[error("cannot roll back from '{current}' to '{target}': {reason}")]
    InvalidRollbackTarget {
        current: StateKey,
        target: StateKey,
        reason: String,
    },

    #[error("malformed input: {message}")]
    MalformedInput { message: String },

    #[error("workflow '{workflow}' declares no start state")]
    NoStartState { workflow: String },
}

impl WorkflowError {
    /// Stable snake_case tag for wire formats.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Unauthorized { .. } => "unauthorized",
            WorkflowError::NoMatchingTransition { .. } => "no_matching_transition",
            WorkflowError::ConditionNotMet { .. } => "condition_not_met",
            WorkflowError::InvalidRollbackTarget { .. } => "invalid_rollback_target",
            WorkflowError::MalformedInput { .. } => "malformed_input",
            WorkflowError::NoStartState { .. } => "no_start_state",
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        WorkflowError::MalformedInput {
            message: message.into(),
        }
    }
}
