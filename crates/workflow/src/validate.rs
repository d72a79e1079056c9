//! Structural validation of workflow definitions.
//!
//! Hard errors stop at the first problem found, in this order: identity,
//! states, start/end kinds, transition references, guards and actions.
//! Shape problems that still leave the definition executable are reported
//! as warnings.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use serde::Serialize;

use crate::definition::{Action, Condition, StateKind, WorkflowDefinition};
use crate::error::DefinitionError;
use crate::key::StateKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    /// Several transitions share `(from_state, event)`; only the first fires.
    AmbiguousTransition {
        from_state: StateKey,
        event: String,
        count: usize,
    },
    /// No path from the start state reaches this state.
    UnreachableState { state: StateKey },
    /// A non-end state with no outgoing transitions.
    DeadEnd { state: StateKey },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::AmbiguousTransition {
                from_state,
                event,
                count,
            } => write!(
                f,
                "{count} transitions for event '{event}' from '{from_state}'; the first declared wins"
            ),
            ValidationWarning::UnreachableState { state } => {
                write!(f, "state '{state}' is unreachable from the start state")
            }
            ValidationWarning::DeadEnd { state } => {
                write!(f, "state '{state}' is not an end state but has no outgoing transitions")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Validate `definition`, returning warnings on success.
pub fn validate(definition: &WorkflowDefinition) -> Result<ValidationReport, DefinitionError> {
    if definition.name.trim().is_empty() {
        return Err(DefinitionError::MissingName);
    }
    if definition.code.trim().is_empty() {
        return Err(DefinitionError::MissingCode);
    }
    if definition.states.is_empty() {
        return Err(DefinitionError::NoStates);
    }

    let mut declared: BTreeSet<&StateKey> = BTreeSet::new();
    for (index, state) in definition.states.iter().enumerate() {
        if state.code.is_empty() {
            return Err(DefinitionError::EmptyStateCode { index });
        }
        if !declared.insert(&state.code) {
            return Err(DefinitionError::DuplicateState {
                code: state.code.clone(),
            });
        }
    }

    let starts = definition
        .states
        .iter()
        .filter(|s| s.kind == StateKind::Start)
        .count();
    if starts != 1 {
        return Err(DefinitionError::StartStateCount { count: starts });
    }
    if definition.terminal_states().next().is_none() {
        return Err(DefinitionError::NoEndState);
    }

    for (index, transition) in definition.transitions.iter().enumerate() {
        for state in [&transition.from_state, &transition.to_state] {
            if !declared.contains(state) {
                return Err(DefinitionError::UnknownState {
                    transition: transition.describe(index),
                    state: state.clone(),
                });
            }
        }
        if transition.event.trim().is_empty() {
            return Err(DefinitionError::EmptyEvent {
                transition: transition.describe(index),
            });
        }
        for condition in &transition.conditions {
            check_condition(condition).map_err(|message| DefinitionError::MalformedCondition {
                transition: transition.describe(index),
                message,
            })?;
        }
        for action in &transition.actions {
            check_action(action).map_err(|message| DefinitionError::MalformedAction {
                transition: transition.describe(index),
                message,
            })?;
        }
    }

    let mut report = ValidationReport::default();
    report.warnings.extend(ambiguities(definition));
    report.warnings.extend(unreachable(definition));
    report.warnings.extend(dead_ends(definition));
    Ok(report)
}

fn check_condition(condition: &Condition) -> Result<(), String> {
    match condition {
        Condition::Field { field, .. } if field.trim().is_empty() => {
            Err("field condition names no field".to_string())
        }
        Condition::Script { script, .. } if script.trim().is_empty() => {
            Err("script condition carries no script".to_string())
        }
        _ => Ok(()),
    }
}

fn check_action(action: &Action) -> Result<(), String> {
    match action {
        Action::UpdateField { field, .. } if field.trim().is_empty() => {
            Err("update_field action names no field".to_string())
        }
        Action::Directive(d) if d.kind.trim().is_empty() => {
            Err("action has an empty type".to_string())
        }
        _ => Ok(()),
    }
}

fn ambiguities(definition: &WorkflowDefinition) -> Vec<ValidationWarning> {
    let mut counts: BTreeMap<(&StateKey, &str), usize> = BTreeMap::new();
    for t in &definition.transitions {
        *counts.entry((&t.from_state, t.event.as_str())).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|((from_state, event), count)| ValidationWarning::AmbiguousTransition {
            from_state: from_state.clone(),
            event: event.to_string(),
            count,
        })
        .collect()
}

fn unreachable(definition: &WorkflowDefinition) -> Vec<ValidationWarning> {
    let Some(start) = definition.start_state() else {
        return Vec::new();
    };

    let mut seen: BTreeSet<&StateKey> = BTreeSet::from([&start.code]);
    let mut queue = VecDeque::from([&start.code]);
    while let Some(state) = queue.pop_front() {
        for t in definition.transitions.iter().filter(|t| t.from_state == *state) {
            if seen.insert(&t.to_state) {
                queue.push_back(&t.to_state);
            }
        }
    }

    definition
        .states
        .iter()
        .filter(|s| !seen.contains(&s.code))
        .map(|s| ValidationWarning::UnreachableState {
            state: s.code.clone(),
        })
        .collect()
}

fn dead_ends(definition: &WorkflowDefinition) -> Vec<ValidationWarning> {
    definition
        .states
        .iter()
        .filter(|s| s.kind != StateKind::End)
        .filter(|s| !definition.transitions.iter().any(|t| t.from_state == s.code))
        .map(|s| ValidationWarning::DeadEnd {
            state: s.code.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Directive, StateNode, Transition};
    use crate::templates;

    fn minimal() -> WorkflowDefinition {
        WorkflowDefinition::new("mini", "Mini")
            .with_state(StateNode::new("open", "Open", StateKind::Start))
            .with_state(StateNode::new("closed", "Closed", StateKind::End))
            .with_transition(Transition::new("open", "close", "closed"))
    }

    #[test]
    fn minimal_definition_is_clean() {
        let report = validate(&minimal()).unwrap();
        assert!(report.is_clean(), "{:?}", report.warnings);
    }

    #[test]
    fn templates_validate() {
        for def in templates::all() {
            validate(&def).unwrap_or_else(|e| panic!("{}: {e}", def.code));
        }
    }

    #[test]
    fn missing_identity_is_rejected() {
        let mut def = minimal();
        def.name.clear();
        assert_eq!(validate(&def), Err(DefinitionError::MissingName));

        let mut def = minimal();
        def.code = "  ".into();
        assert_eq!(validate(&def), Err(DefinitionError::MissingCode));
    }

    #[test]
    fn start_state_must_be_unique() {
        let none = WorkflowDefinition::new("x", "X")
            .with_state(StateNode::new("a", "A", StateKind::Normal))
            .with_state(StateNode::new("b", "B", StateKind::End));
        assert_eq!(
            validate(&none),
            Err(DefinitionError::StartStateCount { count: 0 })
        );

        let two = minimal().with_state(StateNode::new("again", "Again", StateKind::Start));
        assert_eq!(
            validate(&two),
            Err(DefinitionError::StartStateCount { count: 2 })
        );
    }

    #[test]
    fn end_state_is_required() {
        let def = WorkflowDefinition::new("x", "X")
            .with_state(StateNode::new("a", "A", StateKind::Start));
        assert_eq!(validate(&def), Err(DefinitionError::NoEndState));
    }

    #[test]
    fn duplicate_codes_are_rejected_across_forms() {
        let def = minimal()
            .with_state(StateNode::new(7u64, "Seven", StateKind::Normal))
            .with_state(StateNode::new("7", "Seven again", StateKind::Normal));
        assert!(matches!(
            validate(&def),
            Err(DefinitionError::DuplicateState { .. })
        ));
    }

    #[test]
    fn unknown_states_are_rejected() {
        let def = minimal().with_transition(Transition::new("open", "jump", "nowhere"));
        match validate(&def) {
            Err(DefinitionError::UnknownState { state, .. }) => assert_eq!(state, "nowhere"),
            other => panic!("expected UnknownState, got {other:?}"),
        }
    }

    #[test]
    fn malformed_guards_and_actions_are_rejected() {
        let def = minimal().with_transition(
            Transition::new("open", "check", "closed").with_condition(Condition::Script {
                script: String::new(),
                description: String::new(),
            }),
        );
        assert!(matches!(
            validate(&def),
            Err(DefinitionError::MalformedCondition { .. })
        ));

        let def = minimal().with_transition(
            Transition::new("open", "notify", "closed")
                .with_action(Action::Directive(Directive::default())),
        );
        assert!(matches!(
            validate(&def),
            Err(DefinitionError::MalformedAction { .. })
        ));
    }

    #[test]
    fn warnings_cover_ambiguity_reachability_and_dead_ends() {
        let def = minimal()
            .with_transition(Transition::new("open", "close", "open"))
            .with_state(StateNode::new("orphan", "Orphan", StateKind::Normal));
        let report = validate(&def).unwrap();

        assert!(report.warnings.contains(&ValidationWarning::AmbiguousTransition {
            from_state: "open".into(),
            event: "close".into(),
            count: 2,
        }));
        assert!(report.warnings.contains(&ValidationWarning::UnreachableState {
            state: "orphan".into(),
        }));
        assert!(report.warnings.contains(&ValidationWarning::DeadEnd {
            state: "orphan".into(),
        }));
    }
}
