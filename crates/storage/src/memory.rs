//! In-memory backend.
//!
//! All maps sit behind one `tokio::sync::RwLock`, so every trait call is a
//! single atomic step. Nothing survives the process.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bobbin_workflow::{EntityState, WorkflowDefinition, WorkflowInstance};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::traits::{DefinitionStore, InstanceStore};

#[derive(Debug, Default)]
struct Inner {
    instances: BTreeMap<String, WorkflowInstance>,
    entities: BTreeMap<(String, String), EntityState>,
    /// Creation order.
    definitions: Vec<WorkflowDefinition>,
    next_definition: u64,
}

impl Inner {
    fn definition_mut(&mut self, id: &str) -> Result<&mut WorkflowDefinition, StorageError> {
        self.definitions
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StorageError::DefinitionNotFound { id: id.to_string() })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn entity_key(entity_type: &str, entity_id: &str) -> (String, String) {
    (entity_type.to_string(), entity_id.to_string())
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn create_instance(&self, instance: WorkflowInstance) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        if inner.instances.contains_key(&instance.id) {
            return Err(StorageError::AlreadyInitialized {
                instance_id: instance.id,
            });
        }
        inner.instances.insert(instance.id.clone(), instance);
        Ok(())
    }

    async fn get_instance(&self, instance_id: &str) -> Result<WorkflowInstance, StorageError> {
        self.inner
            .read()
            .await
            .instances
            .get(instance_id)
            .cloned()
            .ok_or_else(|| StorageError::InstanceNotFound {
                instance_id: instance_id.to_string(),
            })
    }

    async fn find_by_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<WorkflowInstance>, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .instances
            .values()
            .find(|i| i.entity_type == entity_type && i.entity_id == entity_id)
            .cloned())
    }

    async fn save_instance(
        &self,
        instance: WorkflowInstance,
        expected_version: u64,
        entity: Option<EntityState>,
    ) -> Result<u64, StorageError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .instances
            .get(&instance.id)
            .ok_or_else(|| StorageError::InstanceNotFound {
                instance_id: instance.id.clone(),
            })?;
        if stored.version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                instance_id: instance.id.clone(),
                expected_version,
                actual_version: stored.version,
            });
        }

        let new_version = instance.version;
        if let Some(entity) = entity {
            inner
                .entities
                .insert(entity_key(&instance.entity_type, &instance.entity_id), entity);
        }
        inner.instances.insert(instance.id.clone(), instance);
        Ok(new_version)
    }

    async fn get_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<EntityState>, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .entities
            .get(&entity_key(entity_type, entity_id))
            .cloned())
    }

    async fn put_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
        entity: EntityState,
    ) -> Result<(), StorageError> {
        self.inner
            .write()
            .await
            .entities
            .insert(entity_key(entity_type, entity_id), entity);
        Ok(())
    }
}

#[async_trait]
impl DefinitionStore for MemoryStore {
    async fn create_definition(
        &self,
        mut definition: WorkflowDefinition,
    ) -> Result<WorkflowDefinition, StorageError> {
        let mut inner = self.inner.write().await;
        if definition.id.is_empty() {
            inner.next_definition += 1;
            definition.id = format!("wf-{}", inner.next_definition);
        }
        if inner.definitions.iter().any(|d| d.id == definition.id) {
            return Err(StorageError::DefinitionExists { id: definition.id });
        }

        let now = now_unix();
        definition.version = definition.version.max(1);
        definition.created_at = now;
        definition.updated_at = now;
        if definition.updated_by.is_empty() {
            definition.updated_by = definition.created_by.clone();
        }
        inner.definitions.push(definition.clone());
        Ok(definition)
    }

    async fn update_definition(
        &self,
        id: &str,
        mut definition: WorkflowDefinition,
    ) -> Result<WorkflowDefinition, StorageError> {
        let mut inner = self.inner.write().await;
        let stored = inner.definition_mut(id)?;

        definition.id = stored.id.clone();
        definition.version = stored.version + 1;
        definition.is_active = stored.is_active;
        definition.created_at = stored.created_at;
        definition.created_by = stored.created_by.clone();
        definition.updated_at = now_unix();
        *stored = definition.clone();
        Ok(definition)
    }

    async fn get_definition(&self, id: &str) -> Result<WorkflowDefinition, StorageError> {
        self.inner
            .read()
            .await
            .definitions
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| StorageError::DefinitionNotFound { id: id.to_string() })
    }

    async fn get_active_by_code(&self, code: &str) -> Result<WorkflowDefinition, StorageError> {
        self.inner
            .read()
            .await
            .definitions
            .iter()
            .find(|d| d.code == code && d.is_active)
            .cloned()
            .ok_or_else(|| StorageError::NoActiveDefinition {
                code: code.to_string(),
            })
    }

    async fn list_definitions(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<WorkflowDefinition>, u64), StorageError> {
        let inner = self.inner.read().await;
        let page = page.max(1) as usize;
        let page_size = page_size.max(1) as usize;
        let items = inner
            .definitions
            .iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .cloned()
            .collect();
        Ok((items, inner.definitions.len() as u64))
    }

    async fn delete_definition(&self, id: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let before = inner.definitions.len();
        inner.definitions.retain(|d| d.id != id);
        if inner.definitions.len() == before {
            return Err(StorageError::DefinitionNotFound { id: id.to_string() });
        }
        Ok(())
    }

    async fn activate(&self, id: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let code = inner.definition_mut(id)?.code.clone();
        let now = now_unix();
        for d in inner.definitions.iter_mut().filter(|d| d.code == code) {
            let active = d.id == id;
            if d.is_active != active {
                d.is_active = active;
                d.updated_at = now;
            }
        }
        Ok(())
    }

    async fn deactivate(&self, id: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let definition = inner.definition_mut(id)?;
        definition.is_active = false;
        definition.updated_at = now_unix();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::run_conformance_suite;

    #[tokio::test]
    async fn memory_store_conformance() {
        let report = run_conformance_suite(|| async { MemoryStore::new() }).await;
        assert!(report.failed == 0, "{report}");
        assert!(report.total > 0);
    }
}
