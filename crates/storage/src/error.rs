/// All errors that can be returned by an instance or definition store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency conflict: the stored instance is no longer at
    /// the version the caller read.
    #[error(
        "concurrent conflict on instance {instance_id}: expected version {expected_version}, found {actual_version}"
    )]
    ConcurrentConflict {
        instance_id: String,
        expected_version: u64,
        actual_version: u64,
    },

    #[error("instance not found: {instance_id}")]
    InstanceNotFound { instance_id: String },

    /// An instance with this id already exists.
    #[error("instance already initialized: {instance_id}")]
    AlreadyInitialized { instance_id: String },

    #[error("workflow definition not found: {id}")]
    DefinitionNotFound { id: String },

    #[error("workflow definition already exists: {id}")]
    DefinitionExists { id: String },

    #[error("no active workflow definition with code '{code}'")]
    NoActiveDefinition { code: String },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
