//! Built-in workflow templates.

use serde_json::json;

use crate::definition::{
    Condition, ConditionOperator, StateKind, StateNode, Transition, WorkflowDefinition,
};

pub const BASIC_ORDER: &str = "basic_order";

/// Garment order lifecycle with numbered states:
/// `0 draft -> 1 ordered -> 2 production -> 3 completed`, plus `4 cancelled`.
///
/// `complete` requires `progress >= 1`; `cancel` requires `admin`.
pub fn basic_order() -> WorkflowDefinition {
    let mut def = WorkflowDefinition::new(BASIC_ORDER, "Basic order workflow")
        .with_state(StateNode::new(0u64, "Draft", StateKind::Start).with_color("#909399"))
        .with_state(StateNode::new(1u64, "Ordered", StateKind::Normal).with_color("#409EFF"))
        .with_state(StateNode::new(2u64, "In production", StateKind::Normal).with_color("#E6A23C"))
        .with_state(StateNode::new(3u64, "Completed", StateKind::End).with_color("#67C23A"))
        .with_state(StateNode::new(4u64, "Cancelled", StateKind::End).with_color("#F56C6C"))
        .with_transition(Transition::new(0u64, "submit_order", 1u64).named("Submit order"))
        .with_transition(Transition::new(1u64, "start_cutting", 2u64).named("Start cutting"))
        .with_transition(Transition::new(1u64, "start_production", 2u64).named("Start production"))
        .with_transition(Transition::new(2u64, "update_progress", 2u64).named("Update progress"))
        .with_transition(
            Transition::new(2u64, "complete", 3u64)
                .named("Complete")
                .with_condition(Condition::Field {
                    field: "progress".to_string(),
                    operator: ConditionOperator::Gte,
                    value: json!(1),
                    description: "progress >= 100%".to_string(),
                }),
        );

    for from in [0u64, 1, 2] {
        def = def.with_transition(
            Transition::new(from, "cancel", 4u64)
                .named("Cancel")
                .requiring_role("admin"),
        );
    }

    def.description = "Draft, order, produce and complete a garment order".to_string();
    def.is_active = true;
    def
}

/// Every built-in template.
pub fn all() -> Vec<WorkflowDefinition> {
    vec![basic_order()]
}

/// Look a template up by code.
pub fn by_code(code: &str) -> Option<WorkflowDefinition> {
    all().into_iter().find(|t| t.code == code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::StateKey;

    #[test]
    fn basic_order_shape() {
        let def = basic_order();
        assert_eq!(def.states.len(), 5);
        assert_eq!(def.start_state().map(|s| &s.code), Some(&StateKey::numeric(0)));
        assert_eq!(def.terminal_states().count(), 2);
        assert_eq!(
            def.transitions_from(&StateKey::numeric(2))
                .map(|t| t.event.as_str())
                .collect::<Vec<_>>(),
            vec!["update_progress", "complete", "cancel"]
        );
    }

    #[test]
    fn lookup_by_code() {
        assert!(by_code(BASIC_ORDER).is_some());
        assert!(by_code("nope").is_none());
    }
}
