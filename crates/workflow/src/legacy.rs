//! Read-only projections of a definition for existing front-ends: the
//! compact definition payload, a Mermaid diagram and a flat rule table.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::definition::{StateKind, StateNode, Transition, WorkflowDefinition};
use crate::key::StateKey;

/// `{states, events, transitions}` in the shape of the original order API.
pub fn definition_view(def: &WorkflowDefinition) -> Value {
    let states: Vec<Value> = def
        .states
        .iter()
        .map(|s| {
            json!({
                "id": s.code.to_json(),
                "name": s.label(),
                "type": s.kind.as_str(),
                "color": s.color.as_deref().unwrap_or_default(),
            })
        })
        .collect();

    let events: Vec<Value> = def
        .events()
        .into_iter()
        .map(|event| {
            let matching: Vec<&Transition> =
                def.transitions.iter().filter(|t| t.event == event).collect();
            let mut view = Map::new();
            view.insert("name".into(), json!(event));
            let label = matching.first().map(|t| t.label()).unwrap_or(event);
            view.insert("label".into(), json!(label));
            if matching.iter().any(|t| !t.conditions.is_empty()) {
                view.insert("requireCondition".into(), json!(true));
            }
            if let Some(role) = matching.iter().find_map(|t| t.require_role.as_deref()) {
                view.insert("requireRole".into(), json!(role));
            }
            Value::Object(view)
        })
        .collect();

    let transitions: Vec<Value> = def
        .transitions
        .iter()
        .map(|t| {
            let mut view = Map::new();
            view.insert("from".into(), t.from_state.to_json());
            view.insert("to".into(), t.to_state.to_json());
            view.insert("event".into(), json!(t.event));
            if !t.conditions.is_empty() {
                view.insert("hasCondition".into(), json!(true));
                view.insert("conditionDesc".into(), json!(condition_text(t)));
            }
            if let Some(role) = &t.require_role {
                view.insert("requireRole".into(), json!(role));
                view.insert("roleDesc".into(), json!(format!("requires role {role}")));
            }
            Value::Object(view)
        })
        .collect();

    json!({
        "states": states,
        "events": events,
        "transitions": transitions,
    })
}

/// One row of the transition rule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionRule {
    pub from: StateKey,
    pub from_name: String,
    pub to: StateKey,
    pub to_name: String,
    pub event: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub has_condition: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_role: Option<String>,
}

pub fn transition_rules(def: &WorkflowDefinition) -> Vec<TransitionRule> {
    def.transitions
        .iter()
        .map(|t| TransitionRule {
            from: t.from_state.clone(),
            from_name: def.state_label(&t.from_state).to_string(),
            to: t.to_state.clone(),
            to_name: def.state_label(&t.to_state).to_string(),
            event: t.event.clone(),
            has_condition: !t.conditions.is_empty(),
            require_role: t.require_role.clone(),
        })
        .collect()
}

/// Mermaid `graph LR` rendering. Role-gated transitions are dashed; end
/// states are drawn as stadiums.
pub fn mermaid(def: &WorkflowDefinition) -> String {
    let mut out = String::from("graph LR\n");
    out.push_str("    Start([start])\n");
    for state in &def.states {
        let (open, close) = match state.kind {
            StateKind::End => ("([", "])"),
            _ => ("[", "]"),
        };
        let _ = writeln!(
            out,
            "    {}{open}{}{close}",
            node_id(&state.code),
            escape(state.label())
        );
    }
    out.push('\n');

    if let Some(start) = def.start_state() {
        let _ = writeln!(out, "    Start --> {}", node_id(&start.code));
    }
    for t in &def.transitions {
        let mut label = escape(t.label());
        if !t.conditions.is_empty() {
            let _ = write!(label, "<br/>{}", escape(&condition_text(t)));
        }
        let arrow = match &t.require_role {
            Some(role) => {
                let _ = write!(label, "<br/>requires {}", escape(role));
                "-.->"
            }
            None => "-->",
        };
        let _ = writeln!(
            out,
            "    {} {arrow}|{label}| {}",
            node_id(&t.from_state),
            node_id(&t.to_state)
        );
    }

    let styled: Vec<&StateNode> = def.states.iter().filter(|s| s.color.is_some()).collect();
    if !styled.is_empty() {
        out.push('\n');
        for state in styled {
            if let Some(color) = &state.color {
                let _ = writeln!(
                    out,
                    "    style {} fill:{color},color:#fff",
                    node_id(&state.code)
                );
            }
        }
    }
    out
}

fn condition_text(t: &Transition) -> String {
    t.conditions
        .iter()
        .map(|c| c.summary())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Mermaid node ids must be identifiers.
fn node_id(key: &StateKey) -> String {
    let sanitized: String = key
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("S_{sanitized}")
}

fn escape(text: &str) -> String {
    text.replace('"', "#quot;")
        .replace('|', "#124;")
        .replace('[', "#91;")
        .replace(']', "#93;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::basic_order;

    #[test]
    fn view_keeps_numeric_ids() {
        let view = definition_view(&basic_order());
        assert_eq!(view["states"][0]["id"], json!(0));
        assert_eq!(view["states"][0]["type"], "start");
        assert_eq!(view["states"][3]["type"], "end");
        assert_eq!(view["transitions"][0], json!({"from": 0, "to": 1, "event": "submit_order"}));
    }

    #[test]
    fn view_flags_conditions_and_roles() {
        let view = definition_view(&basic_order());
        let events = view["events"].as_array().unwrap();
        let complete = events.iter().find(|e| e["name"] == "complete").unwrap();
        let cancel = events.iter().find(|e| e["name"] == "cancel").unwrap();
        assert_eq!(complete["requireCondition"], true);
        assert_eq!(cancel["requireRole"], "admin");
        assert!(cancel.get("requireCondition").is_none());
        assert_eq!(events.len(), 6);
    }

    #[test]
    fn rules_carry_state_names() {
        let rules = transition_rules(&basic_order());
        let complete = rules.iter().find(|r| r.event == "complete").unwrap();
        assert_eq!(complete.from_name, "In production");
        assert_eq!(complete.to_name, "Completed");
        assert!(complete.has_condition);

        let json = serde_json::to_value(&rules[0]).unwrap();
        assert!(json.get("has_condition").is_none());
        assert_eq!(json["from"], 0);
    }

    #[test]
    fn mermaid_dashes_role_gated_edges() {
        let diagram = mermaid(&basic_order());
        assert!(diagram.starts_with("graph LR\n"));
        assert!(diagram.contains("Start --> S_0"));
        assert!(diagram.contains("S_0 -->|Submit order| S_1"));
        assert!(diagram.contains("S_1 -.->|Cancel<br/>requires admin| S_4"));
        assert!(diagram.contains("S_3([Completed])"));
        assert!(diagram.contains("style S_2 fill:#E6A23C,color:#fff"));
    }
}
