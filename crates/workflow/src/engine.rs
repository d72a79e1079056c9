//! Transition engine.
//!
//! Executing an event follows:
//! 1. Transition selection by `(current_state, event)`
//! 2. Role check
//! 3. Guard evaluation
//! 4. Action planning
//! 5. Commit: entity updates, history, state, version
//!
//! Steps 1-4 only read. Nothing is written until every check has passed, so
//! a refused event leaves both the instance and the entity untouched.

use bobbin_access::{roles_satisfy, Requirement, RoleSet};
use serde::Serialize;
use serde_json::Value;

use crate::condition::{self, ConditionDelegate, NoDelegate, Scope};
use crate::definition::{Action, Directive, Metadata, Transition, WorkflowDefinition};
use crate::error::WorkflowError;
use crate::instance::{
    now_unix, EntityState, HistoryEntry, RollbackDetails, WorkflowInstance, ROLLBACK_EVENT,
};
use crate::key::StateKey;

static NO_DELEGATE: NoDelegate = NoDelegate;

// ──────────────────────────────────────────────
// Request and result types
// ──────────────────────────────────────────────

/// Who is driving a transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Operator {
    pub id: String,
    pub roles: RoleSet,
}

impl Operator {
    pub fn new<I, S>(id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Operator with no roles, used for automated callers.
    pub fn system() -> Self {
        Self {
            id: "system".to_string(),
            roles: RoleSet::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionRequest {
    pub event: String,
    pub operator: Operator,
    pub reason: String,
    /// Evaluated before entity fields and merged into instance variables on
    /// success.
    pub metadata: Metadata,
}

impl TransitionRequest {
    pub fn new(event: impl Into<String>, operator: Operator) -> Self {
        Self {
            event: event.into(),
            operator,
            reason: String::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// An outgoing transition annotated with whether it could fire right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailableTransition {
    pub transition: Transition,
    pub role_satisfied: bool,
    pub conditions_hold: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_condition: Option<String>,
}

impl AvailableTransition {
    pub fn is_executable(&self) -> bool {
        self.role_satisfied && self.conditions_hold
    }
}

/// Result of an applied transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionReceipt {
    pub entry: HistoryEntry,
    /// Entity fields written by `update_field` actions.
    pub updated_fields: Vec<String>,
    /// Non-engine actions for the caller to carry out.
    pub directives: Vec<Directive>,
}

/// Planned effects of a transition, checked before anything is written.
struct Effects<'t> {
    updates: Vec<(&'t str, &'t Value)>,
    directives: Vec<Directive>,
}

// ──────────────────────────────────────────────
// Engine
// ──────────────────────────────────────────────

/// Interprets one workflow definition.
///
/// The engine holds no instance state; instances and entities are passed in
/// and mutated only on success.
#[derive(Clone, Copy)]
pub struct Engine<'a> {
    definition: &'a WorkflowDefinition,
    delegate: &'a dyn ConditionDelegate,
}

impl<'a> Engine<'a> {
    pub fn new(definition: &'a WorkflowDefinition) -> Self {
        Self {
            definition,
            delegate: &NO_DELEGATE,
        }
    }

    /// Use `delegate` for `script` and `custom` guards.
    pub fn with_delegate(mut self, delegate: &'a dyn ConditionDelegate) -> Self {
        self.delegate = delegate;
        self
    }

    pub fn definition(&self) -> &'a WorkflowDefinition {
        self.definition
    }

    /// New instance at the start state with empty history.
    ///
    /// `entity_type` may not contain `:`, which separates it from the
    /// entity id in the instance id.
    pub fn start(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<WorkflowInstance, WorkflowError> {
        if entity_type.is_empty() || entity_id.is_empty() {
            return Err(WorkflowError::malformed(
                "entity type and id must be non-empty",
            ));
        }
        if entity_type.contains(':') {
            return Err(WorkflowError::malformed(format!(
                "entity type '{entity_type}' may not contain ':'"
            )));
        }
        let start = self
            .definition
            .start_state()
            .ok_or_else(|| WorkflowError::NoStartState {
                workflow: self.definition.code.clone(),
            })?;
        Ok(WorkflowInstance::new(
            self.definition,
            entity_type,
            entity_id,
            start.code.clone(),
        ))
    }

    /// Outgoing transitions of the current state, annotated for `operator`.
    ///
    /// Read-only: repeated calls return identical results.
    pub fn available_transitions(
        &self,
        instance: &WorkflowInstance,
        operator: &Operator,
        entity: &EntityState,
        metadata: &Metadata,
    ) -> Vec<AvailableTransition> {
        let scope = Scope::new(metadata, entity, &instance.variables);
        self.definition
            .transitions
            .iter()
            .filter(|t| t.from_state == instance.current_state)
            .map(|t| {
                let failed_condition = self.first_failed_condition(t, &scope).map(|(c, _)| c);
                AvailableTransition {
                    transition: t.clone(),
                    role_satisfied: roles_satisfy(&operator.roles, &t.role_requirement()),
                    conditions_hold: failed_condition.is_none(),
                    failed_condition,
                }
            })
            .collect()
    }

    /// Apply `request.event` to `instance`, updating `entity` per the
    /// transition's actions.
    pub fn execute(
        &self,
        instance: &mut WorkflowInstance,
        request: &TransitionRequest,
        entity: &mut EntityState,
    ) -> Result<TransitionReceipt, WorkflowError> {
        self.check_instance(instance)?;
        if request.event.is_empty() {
            return Err(WorkflowError::malformed("event must be non-empty"));
        }

        let transition = self
            .definition
            .find_transition(&instance.current_state, &request.event)
            .ok_or_else(|| WorkflowError::NoMatchingTransition {
                state: instance.current_state.clone(),
                event: request.event.clone(),
            })?;

        if let Some(role) = transition.require_role.as_deref() {
            if !roles_satisfy(&request.operator.roles, &Requirement::one(role)) {
                return Err(WorkflowError::Unauthorized {
                    event: request.event.clone(),
                    required_role: role.to_string(),
                    operator: request.operator.id.clone(),
                });
            }
        }

        let scope = Scope::new(&request.metadata, entity, &instance.variables);
        if let Some((condition, reason)) = self.first_failed_condition(transition, &scope) {
            return Err(WorkflowError::ConditionNotMet {
                event: request.event.clone(),
                condition,
                reason,
            });
        }

        let effects = plan(transition)?;

        // Commit.
        let mut updated_fields = Vec::with_capacity(effects.updates.len());
        for (field, value) in effects.updates {
            entity.insert(field.to_string(), value.clone());
            updated_fields.push(field.to_string());
        }

        let entry = HistoryEntry {
            from_state: instance.current_state.clone(),
            to_state: transition.to_state.clone(),
            event: request.event.clone(),
            operator: request.operator.id.clone(),
            reason: request.reason.clone(),
            timestamp: now_unix(),
            metadata: request.metadata.clone(),
            rollback: None,
        };
        instance.apply(entry.clone());

        tracing::info!(
            workflow = %self.definition.code,
            instance = %instance.id,
            from = %entry.from_state,
            to = %entry.to_state,
            event = %entry.event,
            operator = %entry.operator,
            "transition applied"
        );

        Ok(TransitionReceipt {
            entry,
            updated_fields,
            directives: effects.directives,
        })
    }

    /// Return to `target`, which must be the origin of a recorded transition
    /// into the current state.
    pub fn rollback(
        &self,
        instance: &mut WorkflowInstance,
        target: &StateKey,
        operator: &Operator,
        reason: &str,
    ) -> Result<HistoryEntry, WorkflowError> {
        self.check_instance(instance)?;
        let current = instance.current_state.clone();
        let refuse = |why: &str| WorkflowError::InvalidRollbackTarget {
            current: current.clone(),
            target: target.clone(),
            reason: why.to_string(),
        };

        if self.definition.is_terminal(&current) {
            return Err(refuse("the current state is terminal"));
        }
        if *target == current {
            return Err(refuse("target is the current state"));
        }

        let original_event = instance
            .forward_history()
            .rev()
            .find(|e| e.to_state == current && e.from_state == *target)
            .map(|e| e.event.clone())
            .ok_or_else(|| refuse("no recorded transition from the target into the current state"))?;

        let entry = HistoryEntry {
            from_state: current.clone(),
            to_state: target.clone(),
            event: ROLLBACK_EVENT.to_string(),
            operator: operator.id.clone(),
            reason: reason.to_string(),
            timestamp: now_unix(),
            metadata: Metadata::new(),
            rollback: Some(RollbackDetails {
                original_event,
                rolled_back_from: current.clone(),
            }),
        };
        instance.apply(entry.clone());

        tracing::info!(
            workflow = %self.definition.code,
            instance = %instance.id,
            from = %current,
            to = %target,
            operator = %operator.id,
            "rollback applied"
        );

        Ok(entry)
    }

    /// Reverse the most recent transition that led into the current state.
    /// Self-loops are skipped.
    pub fn rollback_last(
        &self,
        instance: &mut WorkflowInstance,
        operator: &Operator,
        reason: &str,
    ) -> Result<HistoryEntry, WorkflowError> {
        let current = instance.current_state.clone();
        let target = instance
            .forward_history()
            .rev()
            .find(|e| e.to_state == current && e.from_state != current)
            .map(|e| e.from_state.clone());

        match target {
            Some(target) => self.rollback(instance, &target, operator, reason),
            None if self.definition.is_terminal(&current) => {
                Err(WorkflowError::InvalidRollbackTarget {
                    current: current.clone(),
                    target: current.clone(),
                    reason: "the current state is terminal".to_string(),
                })
            }
            None => Err(WorkflowError::InvalidRollbackTarget {
                current: current.clone(),
                target: current.clone(),
                reason: "no transition to reverse".to_string(),
            }),
        }
    }

    fn check_instance(&self, instance: &WorkflowInstance) -> Result<(), WorkflowError> {
        if instance.workflow_code != self.definition.code {
            return Err(WorkflowError::malformed(format!(
                "instance {} belongs to workflow '{}', not '{}'",
                instance.id, instance.workflow_code, self.definition.code
            )));
        }
        if self.definition.state(instance.current_state.as_str()).is_none() {
            return Err(WorkflowError::malformed(format!(
                "instance {} is at undeclared state '{}'",
                instance.id, instance.current_state
            )));
        }
        Ok(())
    }

    /// `(summary, reason)` of the first guard that does not hold.
    fn first_failed_condition(
        &self,
        transition: &Transition,
        scope: &Scope<'_>,
    ) -> Option<(String, String)> {
        transition.conditions.iter().find_map(|c| {
            condition::check(c, scope, self.delegate)
                .err()
                .map(|reason| (c.summary(), reason))
        })
    }
}

fn plan(transition: &Transition) -> Result<Effects<'_>, WorkflowError> {
    let mut effects = Effects {
        updates: Vec::new(),
        directives: Vec::new(),
    };
    for action in &transition.actions {
        match action {
            Action::UpdateField { field, value, .. } => {
                if field.is_empty() {
                    return Err(WorkflowError::malformed(format!(
                        "update_field action on event '{}' names no field",
                        transition.event
                    )));
                }
                effects.updates.push((field, value));
            }
            Action::Directive(d) => {
                if d.kind.is_empty() {
                    return Err(WorkflowError::malformed(format!(
                        "action on event '{}' has an empty type",
                        transition.event
                    )));
                }
                effects.directives.push(d.clone());
            }
        }
    }
    Ok(effects)
}
