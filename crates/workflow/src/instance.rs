use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::definition::{Metadata, WorkflowDefinition};
use crate::key::StateKey;

/// Caller-owned document the workflow acts upon (e.g. an order).
pub type EntityState = Map<String, Value>;

/// Values accumulated on an instance from transition metadata.
pub type Variables = BTreeMap<String, Value>;

/// Event name recorded on rollback entries.
pub const ROLLBACK_EVENT: &str = "rollback";

pub(crate) fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Marks a history entry as the reversal of an earlier transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackDetails {
    pub original_event: String,
    pub rolled_back_from: StateKey,
}

/// One applied transition or rollback. History is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub from_state: StateKey,
    pub to_state: StateKey,
    pub event: String,
    pub operator: String,
    #[serde(default)]
    pub reason: String,
    /// Unix seconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackDetails>,
}

impl HistoryEntry {
    pub fn is_rollback(&self) -> bool {
        self.rollback.is_some()
    }
}

/// Flat view of a rollback entry, as listed by the order API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub rollback_from: StateKey,
    pub rollback_to: StateKey,
    pub original_event: String,
    pub reason: String,
    pub operator: String,
    pub timestamp: i64,
}

impl RollbackRecord {
    fn from_entry(entry: &HistoryEntry) -> Option<Self> {
        let details = entry.rollback.as_ref()?;
        Some(Self {
            rollback_from: details.rolled_back_from.clone(),
            rollback_to: entry.to_state.clone(),
            original_event: details.original_event.clone(),
            reason: entry.reason.clone(),
            operator: entry.operator.clone(),
            timestamp: entry.timestamp,
        })
    }
}

/// A running workflow bound to one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: String,
    #[serde(default)]
    pub workflow_id: String,
    pub workflow_code: String,
    pub entity_type: String,
    pub entity_id: String,
    pub current_state: StateKey,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub variables: Variables,
    /// Incremented on every applied transition or rollback.
    #[serde(default)]
    pub version: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl WorkflowInstance {
    pub(crate) fn new(
        definition: &WorkflowDefinition,
        entity_type: &str,
        entity_id: &str,
        start: StateKey,
    ) -> Self {
        let now = now_unix();
        Self {
            id: Self::key_for(entity_type, entity_id),
            workflow_id: definition.id.clone(),
            workflow_code: definition.code.clone(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            current_state: start,
            history: Vec::new(),
            variables: Variables::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Instance id for an entity. One instance exists per entity.
    ///
    /// Unambiguous because entity types never contain `:`.
    pub fn key_for(entity_type: &str, entity_id: &str) -> String {
        format!("{entity_type}:{entity_id}")
    }

    /// Entries produced by transitions, oldest first.
    pub fn forward_history(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> {
        self.history.iter().filter(|e| !e.is_rollback())
    }

    /// Rollback records, oldest first.
    pub fn rollbacks(&self) -> impl DoubleEndedIterator<Item = RollbackRecord> + '_ {
        self.history.iter().filter_map(RollbackRecord::from_entry)
    }

    /// Up to `limit` entries, newest first.
    pub fn recent_history(&self, limit: usize) -> Vec<&HistoryEntry> {
        self.history.iter().rev().take(limit).collect()
    }

    /// Up to `limit` rollback records, newest first.
    pub fn recent_rollbacks(&self, limit: usize) -> Vec<RollbackRecord> {
        self.rollbacks().rev().take(limit).collect()
    }

    /// Append `entry` and move to its target state.
    pub(crate) fn apply(&mut self, entry: HistoryEntry) {
        self.variables.extend(
            entry
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self.current_state = entry.to_state.clone();
        self.updated_at = entry.timestamp;
        self.version += 1;
        self.history.push(entry);
    }
}
