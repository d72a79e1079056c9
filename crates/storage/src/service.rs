//! Store-backed orchestration of the workflow engine.
//!
//! Each call loads the active definition and the instance, runs the engine
//! on a copy, and saves with the version it read. Two callers racing on the
//! same instance therefore serialize: the loser gets
//! [`ServiceError::Conflict`] and nothing it computed is written.

use std::sync::Arc;

use bobbin_workflow::{
    validate, AvailableTransition, ConditionDelegate, DefinitionError, Engine, HistoryEntry,
    Metadata, NoDelegate, Operator, StateKey, TransitionReceipt, TransitionRequest,
    ValidationReport, WorkflowDefinition, WorkflowError, WorkflowInstance,
};

use crate::error::StorageError;
use crate::traits::{DefinitionStore, InstanceStore};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("invalid workflow definition: {0}")]
    Definition(#[from] DefinitionError),

    /// The instance changed between read and write.
    #[error("instance {instance_id} was modified concurrently; reload and retry")]
    Conflict { instance_id: String },

    #[error("workflow instance not found: {instance_id}")]
    InstanceNotFound { instance_id: String },

    #[error("workflow definition not found: {0}")]
    DefinitionNotFound(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConcurrentConflict { instance_id, .. }
            | StorageError::AlreadyInitialized { instance_id } => {
                ServiceError::Conflict { instance_id }
            }
            StorageError::InstanceNotFound { instance_id } => {
                ServiceError::InstanceNotFound { instance_id }
            }
            StorageError::DefinitionNotFound { id } => ServiceError::DefinitionNotFound(id),
            StorageError::NoActiveDefinition { code } => ServiceError::DefinitionNotFound(code),
            other => ServiceError::Storage(other),
        }
    }
}

impl ServiceError {
    /// Stable snake_case tag for wire formats.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Workflow(e) => e.kind(),
            ServiceError::Definition(_) => "invalid_definition",
            ServiceError::Conflict { .. } => "conflict",
            ServiceError::InstanceNotFound { .. } => "instance_not_found",
            ServiceError::DefinitionNotFound(_) => "definition_not_found",
            ServiceError::Storage(_) => "storage",
        }
    }
}

/// Instance state after a successful transition.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub instance: WorkflowInstance,
    pub receipt: TransitionReceipt,
}

/// Identifies the instance a call targets.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    /// Code of the active workflow definition.
    pub workflow: &'a str,
    pub entity_type: &'a str,
    pub entity_id: &'a str,
}

pub struct WorkflowService<S> {
    store: Arc<S>,
    delegate: Arc<dyn ConditionDelegate>,
}

impl<S> Clone for WorkflowService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            delegate: Arc::clone(&self.delegate),
        }
    }
}

impl<S> WorkflowService<S>
where
    S: InstanceStore + DefinitionStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            delegate: Arc::new(NoDelegate),
        }
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn ConditionDelegate>) -> Self {
        self.delegate = delegate;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Workflow execution ───────────────────────────────────────────────────

    pub async fn active_definition(&self, code: &str) -> Result<WorkflowDefinition, ServiceError> {
        Ok(self.store.get_active_by_code(code).await?)
    }

    pub async fn instance(&self, target: Target<'_>) -> Result<WorkflowInstance, ServiceError> {
        self.store
            .find_by_entity(target.entity_type, target.entity_id)
            .await?
            .ok_or_else(|| ServiceError::InstanceNotFound {
                instance_id: WorkflowInstance::key_for(target.entity_type, target.entity_id),
            })
    }

    pub async fn instance_by_id(&self, instance_id: &str) -> Result<WorkflowInstance, ServiceError> {
        Ok(self.store.get_instance(instance_id).await?)
    }

    /// Current state, reporting the start state for entities that have not
    /// transitioned yet.
    pub async fn current_state(&self, target: Target<'_>) -> Result<StateKey, ServiceError> {
        let (_, instance) = self.load_or_start(target).await?;
        Ok(instance.current_state)
    }

    /// History entries, newest first.
    pub async fn history(
        &self,
        target: Target<'_>,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, ServiceError> {
        match self
            .store
            .find_by_entity(target.entity_type, target.entity_id)
            .await?
        {
            Some(instance) => Ok(instance.recent_history(limit).into_iter().cloned().collect()),
            None => Ok(Vec::new()),
        }
    }

    pub async fn available_transitions(
        &self,
        target: Target<'_>,
        operator: &Operator,
        metadata: &Metadata,
    ) -> Result<Vec<AvailableTransition>, ServiceError> {
        let (definition, instance) = self.load_or_start(target).await?;
        let entity = self
            .store
            .get_entity(target.entity_type, target.entity_id)
            .await?
            .unwrap_or_default();
        Ok(self
            .engine(&definition)
            .available_transitions(&instance, operator, &entity, metadata))
    }

    /// Apply an event, creating the instance on first use.
    ///
    /// A refused transition persists nothing, not even a new instance.
    pub async fn transition(
        &self,
        target: Target<'_>,
        request: &TransitionRequest,
    ) -> Result<TransitionOutcome, ServiceError> {
        let definition = self.active_definition(target.workflow).await?;
        let engine = self.engine(&definition);

        let existing = self
            .store
            .find_by_entity(target.entity_type, target.entity_id)
            .await?;
        let is_new = existing.is_none();
        let current = match existing {
            Some(instance) => instance,
            None => engine.start(target.entity_type, target.entity_id)?,
        };
        let mut entity = self
            .store
            .get_entity(target.entity_type, target.entity_id)
            .await?
            .unwrap_or_default();

        let mut next = current.clone();
        let receipt = engine.execute(&mut next, request, &mut entity)?;

        if is_new {
            self.store.create_instance(current.clone()).await?;
            tracing::debug!(instance = %current.id, workflow = %definition.code, "instance created");
        }
        self.store
            .save_instance(next.clone(), current.version, Some(entity))
            .await?;

        Ok(TransitionOutcome {
            instance: next,
            receipt,
        })
    }

    /// Roll back to `to`, or reverse the most recent transition when `None`.
    pub async fn rollback(
        &self,
        target: Target<'_>,
        to: Option<&StateKey>,
        operator: &Operator,
        reason: &str,
    ) -> Result<WorkflowInstance, ServiceError> {
        let definition = self.active_definition(target.workflow).await?;
        let engine = self.engine(&definition);
        let current = self.instance(target).await?;

        let mut next = current.clone();
        match to {
            Some(state) => engine.rollback(&mut next, state, operator, reason)?,
            None => engine.rollback_last(&mut next, operator, reason)?,
        };
        self.store
            .save_instance(next.clone(), current.version, None)
            .await?;
        Ok(next)
    }

    // ── Definition management ────────────────────────────────────────────────

    pub async fn create_definition(
        &self,
        mut definition: WorkflowDefinition,
        author: &str,
    ) -> Result<(WorkflowDefinition, ValidationReport), ServiceError> {
        let report = validate(&definition)?;
        definition.id.clear();
        definition.is_active = false;
        definition.created_by = author.to_string();
        definition.updated_by = author.to_string();
        let stored = self.store.create_definition(definition).await?;
        tracing::info!(id = %stored.id, code = %stored.code, author, "workflow definition created");
        Ok((stored, report))
    }

    pub async fn update_definition(
        &self,
        id: &str,
        mut definition: WorkflowDefinition,
        author: &str,
    ) -> Result<(WorkflowDefinition, ValidationReport), ServiceError> {
        let report = validate(&definition)?;
        definition.updated_by = author.to_string();
        let stored = self.store.update_definition(id, definition).await?;
        tracing::info!(id = %stored.id, version = stored.version, author, "workflow definition updated");
        Ok((stored, report))
    }

    pub async fn get_definition(&self, id: &str) -> Result<WorkflowDefinition, ServiceError> {
        Ok(self.store.get_definition(id).await?)
    }

    pub async fn list_definitions(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<WorkflowDefinition>, u64), ServiceError> {
        Ok(self.store.list_definitions(page, page_size).await?)
    }

    pub async fn delete_definition(&self, id: &str) -> Result<(), ServiceError> {
        self.store.delete_definition(id).await?;
        tracing::info!(id, "workflow definition deleted");
        Ok(())
    }

    /// Activate after re-validating; only valid definitions can go live.
    pub async fn activate(&self, id: &str) -> Result<(), ServiceError> {
        let definition = self.store.get_definition(id).await?;
        validate(&definition)?;
        self.store.activate(id).await?;
        tracing::info!(id, code = %definition.code, "workflow definition activated");
        Ok(())
    }

    pub async fn deactivate(&self, id: &str) -> Result<(), ServiceError> {
        self.store.deactivate(id).await?;
        tracing::info!(id, "workflow definition deactivated");
        Ok(())
    }

    /// Store `definition` and make it the active one for its code.
    pub async fn install(
        &self,
        definition: WorkflowDefinition,
        author: &str,
    ) -> Result<WorkflowDefinition, ServiceError> {
        let (stored, _) = self.create_definition(definition, author).await?;
        self.activate(&stored.id).await?;
        Ok(self.store.get_definition(&stored.id).await?)
    }

    fn engine<'a>(&'a self, definition: &'a WorkflowDefinition) -> Engine<'a> {
        Engine::new(definition).with_delegate(self.delegate.as_ref())
    }

    async fn load_or_start(
        &self,
        target: Target<'_>,
    ) -> Result<(WorkflowDefinition, WorkflowInstance), ServiceError> {
        let definition = self.active_definition(target.workflow).await?;
        let instance = match self
            .store
            .find_by_entity(target.entity_type, target.entity_id)
            .await?
        {
            Some(instance) => instance,
            None => self
                .engine(&definition)
                .start(target.entity_type, target.entity_id)?,
        };
        Ok((definition, instance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use bobbin_workflow::{templates, EntityState};
    use serde_json::json;

    const ORDER: Target<'static> = Target {
        workflow: templates::BASIC_ORDER,
        entity_type: "order",
        entity_id: "PO-1",
    };

    async fn service() -> WorkflowService<MemoryStore> {
        let service = WorkflowService::new(Arc::new(MemoryStore::new()));
        service
            .install(templates::basic_order(), "test")
            .await
            .unwrap();
        service
    }

    fn clerk() -> Operator {
        Operator::new("clerk", ["sales"])
    }

    #[tokio::test]
    async fn first_transition_creates_instance() {
        let service = service().await;
        assert!(matches!(
            service.instance(ORDER).await,
            Err(ServiceError::InstanceNotFound { .. })
        ));
        assert_eq!(
            service.current_state(ORDER).await.unwrap(),
            StateKey::numeric(0)
        );

        let outcome = service
            .transition(ORDER, &TransitionRequest::new("submit_order", clerk()))
            .await
            .unwrap();
        assert_eq!(outcome.instance.current_state, StateKey::numeric(1));
        assert_eq!(outcome.instance.version, 1);

        let stored = service.instance(ORDER).await.unwrap();
        assert_eq!(stored, outcome.instance);
    }

    #[tokio::test]
    async fn refused_transition_persists_nothing() {
        let service = service().await;
        service
            .transition(ORDER, &TransitionRequest::new("submit_order", clerk()))
            .await
            .unwrap();
        let before = service.instance(ORDER).await.unwrap();

        let err = service
            .transition(ORDER, &TransitionRequest::new("cancel", clerk()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
        assert_eq!(service.instance(ORDER).await.unwrap(), before);
    }

    #[tokio::test]
    async fn entities_with_overlapping_ids_stay_distinct() {
        let service = service().await;
        let colon_type = Target {
            entity_type: "order:rush",
            entity_id: "7",
            ..ORDER
        };
        let err = service
            .transition(colon_type, &TransitionRequest::new("submit_order", clerk()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "malformed_input");

        let colon_id = Target {
            entity_id: "rush:7",
            ..ORDER
        };
        let outcome = service
            .transition(colon_id, &TransitionRequest::new("submit_order", clerk()))
            .await
            .unwrap();
        assert_eq!(outcome.instance.id, "order:rush:7");
        assert_eq!(outcome.instance.entity_id, "rush:7");
    }

    #[tokio::test]
    async fn refused_first_transition_creates_no_instance() {
        let service = service().await;
        let err = service
            .transition(ORDER, &TransitionRequest::new("cancel", clerk()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
        assert!(matches!(
            service.instance(ORDER).await,
            Err(ServiceError::InstanceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn stale_writer_gets_conflict() {
        let service = service().await;
        service
            .transition(ORDER, &TransitionRequest::new("submit_order", clerk()))
            .await
            .unwrap();

        // A second writer read version 1 and saves after the first writer moved on.
        let definition = service.active_definition(ORDER.workflow).await.unwrap();
        let stale = service.instance(ORDER).await.unwrap();
        service
            .transition(ORDER, &TransitionRequest::new("start_cutting", clerk()))
            .await
            .unwrap();

        let mut next = stale.clone();
        Engine::new(&definition)
            .execute(
                &mut next,
                &TransitionRequest::new("start_production", clerk()),
                &mut EntityState::new(),
            )
            .unwrap();
        let err: ServiceError = service
            .store()
            .save_instance(next, stale.version, None)
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, ServiceError::Conflict { .. }));
    }

    #[tokio::test]
    async fn rollback_without_target_reverses_last_step() {
        let service = service().await;
        for event in ["submit_order", "start_production"] {
            service
                .transition(ORDER, &TransitionRequest::new(event, clerk()))
                .await
                .unwrap();
        }

        let instance = service
            .rollback(ORDER, None, &clerk(), "material shortage")
            .await
            .unwrap();
        assert_eq!(instance.current_state, StateKey::numeric(1));
        let rollbacks = instance.recent_rollbacks(10);
        assert_eq!(rollbacks[0].original_event, "start_production");
    }

    #[tokio::test]
    async fn entity_updates_are_saved_with_the_instance() {
        let store = Arc::new(MemoryStore::new());
        let service = WorkflowService::new(Arc::clone(&store));
        let mut def = templates::basic_order();
        def.transitions[0]
            .actions
            .push(bobbin_workflow::Action::update_field("submitted", json!(true)));
        service.install(def, "test").await.unwrap();

        service
            .transition(ORDER, &TransitionRequest::new("submit_order", clerk()))
            .await
            .unwrap();
        let entity = store.get_entity("order", "PO-1").await.unwrap().unwrap();
        assert_eq!(entity.get("submitted"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn invalid_definitions_are_not_stored() {
        let service = WorkflowService::new(Arc::new(MemoryStore::new()));
        let mut def = templates::basic_order();
        def.states.retain(|s| s.code != StateKey::numeric(0));
        let err = service.create_definition(def, "test").await.unwrap_err();
        assert_eq!(err.kind(), "invalid_definition");
        let (items, total) = service.list_definitions(1, 10).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 0);
    }
}
