use async_trait::async_trait;
use bobbin_workflow::{EntityState, WorkflowDefinition, WorkflowInstance};

use crate::error::StorageError;

/// Storage for workflow instances and the entity documents they act on.
///
/// ## OCC Conflict Detection
///
/// `save_instance` is a compare-and-swap on `version`: the write succeeds
/// only while the stored instance is still at `expected_version`. Otherwise
/// it returns `Err(StorageError::ConcurrentConflict { .. })` and writes
/// nothing. The entity document passed alongside is written in the same
/// step, so an instance and its entity never diverge.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait InstanceStore: Send + Sync + 'static {
    /// Persist a new instance.
    ///
    /// Returns `Err(StorageError::AlreadyInitialized)` if the id is taken.
    async fn create_instance(&self, instance: WorkflowInstance) -> Result<(), StorageError>;

    /// Returns `Err(StorageError::InstanceNotFound)` if there is no such instance.
    async fn get_instance(&self, instance_id: &str) -> Result<WorkflowInstance, StorageError>;

    async fn find_by_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<WorkflowInstance>, StorageError>;

    /// Replace the stored instance if it is still at `expected_version`,
    /// writing `entity` (when given) in the same step. Returns the new version.
    async fn save_instance(
        &self,
        instance: WorkflowInstance,
        expected_version: u64,
        entity: Option<EntityState>,
    ) -> Result<u64, StorageError>;

    async fn get_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<EntityState>, StorageError>;

    async fn put_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
        entity: EntityState,
    ) -> Result<(), StorageError>;
}

/// Storage for workflow definitions managed by the designer.
#[async_trait]
pub trait DefinitionStore: Send + Sync + 'static {
    /// Persist a new definition, assigning an id when it has none and
    /// stamping `created_at`/`updated_at`. Returns the stored definition.
    async fn create_definition(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<WorkflowDefinition, StorageError>;

    /// Replace the definition's content. `version` is incremented and the
    /// creation audit fields and activation flag are kept.
    async fn update_definition(
        &self,
        id: &str,
        definition: WorkflowDefinition,
    ) -> Result<WorkflowDefinition, StorageError>;

    async fn get_definition(&self, id: &str) -> Result<WorkflowDefinition, StorageError>;

    /// The active definition for `code`.
    ///
    /// Returns `Err(StorageError::NoActiveDefinition)` when none is active.
    async fn get_active_by_code(&self, code: &str) -> Result<WorkflowDefinition, StorageError>;

    /// One page of definitions in creation order, with the total count.
    /// `page` is 1-based.
    async fn list_definitions(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<WorkflowDefinition>, u64), StorageError>;

    async fn delete_definition(&self, id: &str) -> Result<(), StorageError>;

    /// Activate `id`, deactivating every other definition with the same code.
    async fn activate(&self, id: &str) -> Result<(), StorageError>;

    async fn deactivate(&self, id: &str) -> Result<(), StorageError>;
}
