//! Workflow definition model.
//!
//! A definition is a directed graph of named states joined by event-labelled
//! transitions. Definitions are data: they load from JSON or TOML and are
//! interpreted by [`crate::Engine`].

use std::fmt;
use std::path::Path;

use bobbin_access::Requirement;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::DefinitionError;
use crate::key::StateKey;

/// Free-form key/value bag attached to definitions, states and history.
pub type Metadata = Map<String, Value>;

// ──────────────────────────────────────────────
// States
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Start,
    #[default]
    Normal,
    End,
}

impl StateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StateKind::Start => "start",
            StateKind::Normal => "normal",
            StateKind::End => "end",
        }
    }
}

/// Canvas position used by the visual designer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node of the workflow graph.
///
/// Deserializes from either `code` or `id`; when both are present `code`
/// identifies the state and `id` is kept as designer metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStateNode")]
pub struct StateNode {
    pub code: StateKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<StateKey>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StateKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Metadata,
}

impl StateNode {
    pub fn new(code: impl Into<StateKey>, name: impl Into<String>, kind: StateKind) -> Self {
        Self {
            code: code.into(),
            id: None,
            name: name.into(),
            kind,
            color: None,
            description: String::new(),
            position: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Display name, falling back to the code.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            self.code.as_str()
        } else {
            &self.name
        }
    }
}

#[derive(Deserialize)]
struct RawStateNode {
    #[serde(default)]
    code: Option<StateKey>,
    #[serde(default)]
    id: Option<StateKey>,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    kind: StateKind,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    position: Option<Position>,
    #[serde(default, deserialize_with = "nullable")]
    metadata: Metadata,
}

impl TryFrom<RawStateNode> for StateNode {
    type Error = String;

    fn try_from(raw: RawStateNode) -> Result<Self, Self::Error> {
        let code = raw
            .code
            .filter(|c| !c.is_empty())
            .or_else(|| raw.id.clone())
            .ok_or_else(|| "state requires a 'code' or 'id'".to_string())?;
        Ok(StateNode {
            code,
            id: raw.id,
            name: raw.name,
            kind: raw.kind,
            color: raw.color.filter(|c| !c.is_empty()),
            description: raw.description,
            position: raw.position,
            metadata: raw.metadata,
        })
    }
}

// ──────────────────────────────────────────────
// Conditions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Contains,
}

impl ConditionOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionOperator::Eq => "eq",
            ConditionOperator::Ne => "ne",
            ConditionOperator::Gt => "gt",
            ConditionOperator::Gte => "gte",
            ConditionOperator::Lt => "lt",
            ConditionOperator::Lte => "lte",
            ConditionOperator::In => "in",
            ConditionOperator::Contains => "contains",
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guard attached to a transition. All guards of a transition must hold.
///
/// Only `field` guards are interpreted by the engine; `script` and `custom`
/// guards go to a [`crate::ConditionDelegate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Field {
        #[serde(default)]
        field: String,
        operator: ConditionOperator,
        #[serde(default)]
        value: Value,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        description: String,
    },
    Script {
        #[serde(default)]
        script: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        description: String,
    },
    Custom {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        description: String,
        #[serde(
            default,
            deserialize_with = "nullable",
            skip_serializing_if = "Map::is_empty"
        )]
        metadata: Metadata,
    },
}

impl Condition {
    pub fn field(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Condition::Field {
            field: field.into(),
            operator,
            value,
            description: String::new(),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Condition::Field { description, .. }
            | Condition::Script { description, .. }
            | Condition::Custom { description, .. } => description,
        }
    }

    /// Human readable summary used in errors and diagrams.
    pub fn summary(&self) -> String {
        if !self.description().is_empty() {
            return self.description().to_string();
        }
        match self {
            Condition::Field {
                field,
                operator,
                value,
                ..
            } => format!("{field} {operator} {value}"),
            Condition::Script { script, .. } => format!("script `{script}`"),
            Condition::Custom { .. } => "custom condition".to_string(),
        }
    }
}

// ──────────────────────────────────────────────
// Actions
// ──────────────────────────────────────────────

/// Side-effect description carried verbatim to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub script: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Map::is_empty"
    )]
    pub metadata: Metadata,
}

pub const UPDATE_FIELD: &str = "update_field";

/// Effect of a transition. `update_field` is applied to the entity by the
/// engine; anything else is handed back as a [`Directive`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Directive", into = "Directive")]
pub enum Action {
    UpdateField {
        field: String,
        value: Value,
        description: String,
    },
    Directive(Directive),
}

impl Action {
    pub fn update_field(field: impl Into<String>, value: Value) -> Self {
        Action::UpdateField {
            field: field.into(),
            value,
            description: String::new(),
        }
    }
}

impl From<Directive> for Action {
    fn from(d: Directive) -> Self {
        if d.kind == UPDATE_FIELD {
            Action::UpdateField {
                field: d.field,
                value: d.value,
                description: d.description,
            }
        } else {
            Action::Directive(d)
        }
    }
}

impl From<Action> for Directive {
    fn from(action: Action) -> Self {
        match action {
            Action::UpdateField {
                field,
                value,
                description,
            } => Directive {
                kind: UPDATE_FIELD.to_string(),
                field,
                value,
                description,
                ..Directive::default()
            },
            Action::Directive(d) => d,
        }
    }
}

// ──────────────────────────────────────────────
// Transitions
// ──────────────────────────────────────────────

/// Edge of the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(alias = "from")]
    pub from_state: StateKey,
    #[serde(alias = "to")]
    pub to_state: StateKey,
    #[serde(default)]
    pub event: String,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub conditions: Vec<Condition>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub actions: Vec<Action>,
    /// `None` and the empty string both mean unrestricted.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub require_role: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Map::is_empty"
    )]
    pub metadata: Metadata,
}

impl Transition {
    pub fn new(
        from_state: impl Into<StateKey>,
        event: impl Into<String>,
        to_state: impl Into<StateKey>,
    ) -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            from_state: from_state.into(),
            to_state: to_state.into(),
            event: event.into(),
            conditions: Vec::new(),
            actions: Vec::new(),
            require_role: None,
            description: String::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn requiring_role(mut self, role: impl Into<String>) -> Self {
        let role = role.into();
        self.require_role = (!role.is_empty()).then_some(role);
        self
    }

    pub fn role_requirement(&self) -> Requirement {
        Requirement::from(self.require_role.as_deref())
    }

    /// Display label: the transition name, else the event.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.event
        } else {
            &self.name
        }
    }

    pub(crate) fn describe(&self, index: usize) -> String {
        format!(
            "#{index} ({} --{}--> {})",
            self.from_state, self.event, self.to_state
        )
    }
}

// ──────────────────────────────────────────────
// Definition
// ──────────────────────────────────────────────

fn first_version() -> u32 {
    1
}

/// A complete workflow: states, transitions and audit fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "first_version")]
    pub version: u32,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub states: Vec<StateNode>,
    #[serde(default, deserialize_with = "nullable")]
    pub transitions: Vec<Transition>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Map::is_empty"
    )]
    pub metadata: Metadata,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub updated_by: String,
}

impl WorkflowDefinition {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            code: code.into(),
            description: String::new(),
            version: first_version(),
            is_active: false,
            states: Vec::new(),
            transitions: Vec::new(),
            metadata: Metadata::new(),
            created_at: 0,
            updated_at: 0,
            created_by: String::new(),
            updated_by: String::new(),
        }
    }

    pub fn with_state(mut self, state: StateNode) -> Self {
        self.states.push(state);
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn from_json(source: &str) -> Result<Self, DefinitionError> {
        serde_json::from_str(source).map_err(|e| DefinitionError::Parse {
            format: "JSON",
            message: e.to_string(),
        })
    }

    pub fn from_toml(source: &str) -> Result<Self, DefinitionError> {
        toml::from_str(source).map_err(|e| DefinitionError::Parse {
            format: "TOML",
            message: e.to_string(),
        })
    }

    /// Load a `.json` or `.toml` definition file.
    pub fn load(path: &Path) -> Result<Self, DefinitionError> {
        let source = std::fs::read_to_string(path).map_err(|e| DefinitionError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&source),
            Some("toml") => Self::from_toml(&source),
            _ => Err(DefinitionError::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, DefinitionError> {
        serde_json::to_string_pretty(self).map_err(|e| DefinitionError::Parse {
            format: "JSON",
            message: e.to_string(),
        })
    }

    /// The first state of kind `start`.
    pub fn start_state(&self) -> Option<&StateNode> {
        self.states.iter().find(|s| s.kind == StateKind::Start)
    }

    pub fn state(&self, code: &str) -> Option<&StateNode> {
        self.states.iter().find(|s| s.code == code)
    }

    /// Display name of a state, or its code when undeclared or unnamed.
    pub fn state_label<'a>(&'a self, code: &'a StateKey) -> &'a str {
        self.state(code.as_str())
            .map(StateNode::label)
            .unwrap_or(code.as_str())
    }

    pub fn is_terminal(&self, code: &StateKey) -> bool {
        self.state(code.as_str())
            .is_some_and(|s| s.kind == StateKind::End)
    }

    pub fn terminal_states(&self) -> impl Iterator<Item = &StateNode> {
        self.states.iter().filter(|s| s.kind == StateKind::End)
    }

    /// Outgoing transitions of `state`, in declaration order.
    pub fn transitions_from<'a>(
        &'a self,
        state: &'a StateKey,
    ) -> impl Iterator<Item = &'a Transition> + 'a {
        self.transitions
            .iter()
            .filter(move |t| t.from_state == *state)
    }

    /// The first declared transition for `(state, event)`.
    ///
    /// Additional matches are ignored and logged.
    pub fn find_transition(&self, state: &StateKey, event: &str) -> Option<&Transition> {
        let mut matches = self
            .transitions
            .iter()
            .filter(|t| t.from_state == *state && t.event == event);
        let first = matches.next()?;
        let shadowed = matches.count();
        if shadowed > 0 {
            tracing::warn!(
                workflow = %self.code,
                state = %state,
                event,
                shadowed,
                "ambiguous transition; using the first declared"
            );
        }
        Some(first)
    }

    /// Distinct event names in declaration order.
    pub fn events(&self) -> Vec<&str> {
        let mut events: Vec<&str> = Vec::new();
        for t in &self.transitions {
            if !events.contains(&t.event.as_str()) {
                events.push(&t.event);
            }
        }
        events
    }
}

// ──────────────────────────────────────────────
// Serde helpers
// ──────────────────────────────────────────────

/// Treat an explicit `null` like a missing field.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> WorkflowDefinition {
        WorkflowDefinition::new("sample", "Sample")
            .with_state(StateNode::new("a", "A", StateKind::Start))
            .with_state(StateNode::new("b", "B", StateKind::End))
            .with_transition(Transition::new("a", "go", "b").named("first"))
            .with_transition(Transition::new("a", "go", "a").named("second"))
    }

    #[test]
    fn first_declared_transition_wins() {
        let def = sample();
        let t = def.find_transition(&"a".into(), "go").unwrap();
        assert_eq!(t.name, "first");
        assert!(def.find_transition(&"b".into(), "go").is_none());
    }

    #[test]
    fn state_accepts_id_or_code() {
        let legacy: StateNode =
            serde_json::from_value(json!({"id": 0, "name": "Draft", "type": "start"})).unwrap();
        assert_eq!(legacy.code, StateKey::numeric(0));
        assert_eq!(legacy.kind, StateKind::Start);

        let designer: StateNode = serde_json::from_value(
            json!({"id": "state_1", "code": "draft", "name": "Draft", "type": "start", "color": ""}),
        )
        .unwrap();
        assert_eq!(designer.code, "draft");
        assert_eq!(designer.id, Some(StateKey::code("state_1")));
        assert_eq!(designer.color, None);

        assert!(serde_json::from_value::<StateNode>(json!({"name": "nameless"})).is_err());
    }

    #[test]
    fn nulls_and_empty_role_are_tolerated() {
        let t: Transition = serde_json::from_value(json!({
            "from_state": "a",
            "to_state": "b",
            "event": "go",
            "conditions": null,
            "actions": null,
            "require_role": ""
        }))
        .unwrap();
        assert!(t.conditions.is_empty());
        assert!(t.actions.is_empty());
        assert_eq!(t.require_role, None);
        assert!(t.role_requirement().is_none());
    }

    #[test]
    fn legacy_transition_shape_decodes() {
        let t: Transition =
            serde_json::from_value(json!({"from": 1, "to": 2, "event": "start_cutting"})).unwrap();
        assert_eq!(t.from_state, StateKey::numeric(1));
        assert_eq!(t.to_state, "2");
    }

    #[test]
    fn actions_split_into_updates_and_directives() {
        let actions: Vec<Action> = serde_json::from_value(json!([
            {"type": "update_field", "field": "status_note", "value": "sent", "script": ""},
            {"type": "send_notification", "field": "", "value": {"to": "qc"}, "script": ""}
        ]))
        .unwrap();
        assert_eq!(actions[0], Action::update_field("status_note", json!("sent")));
        match &actions[1] {
            Action::Directive(d) => {
                assert_eq!(d.kind, "send_notification");
                assert_eq!(d.value, json!({"to": "qc"}));
            }
            other => panic!("expected directive, got {other:?}"),
        }

        let back = serde_json::to_value(&actions[0]).unwrap();
        assert_eq!(back["type"], "update_field");
    }

    #[test]
    fn conditions_decode_by_type() {
        let conditions: Vec<Condition> = serde_json::from_value(json!([
            {"type": "field", "field": "progress", "operator": "gte", "value": 1.0, "script": ""},
            {"type": "script", "script": "order.paid"},
            {"type": "custom", "description": "credit check"}
        ]))
        .unwrap();
        assert!(matches!(
            conditions[0],
            Condition::Field { operator: ConditionOperator::Gte, .. }
        ));
        assert_eq!(conditions[1].summary(), "script `order.paid`");
        assert_eq!(conditions[2].summary(), "credit check");
    }

    #[test]
    fn toml_definitions_load() {
        let def = WorkflowDefinition::from_toml(
            r#"
            name = "Sample"
            code = "sample"

            [[states]]
            code = "a"
            name = "A"
            type = "start"

            [[states]]
            code = "b"
            name = "B"
            type = "end"

            [[transitions]]
            from_state = "a"
            to_state = "b"
            event = "go"
            require_role = "admin"

            [[transitions.conditions]]
            type = "field"
            field = "progress"
            operator = "gte"
            value = 1
            "#,
        )
        .unwrap();
        assert_eq!(def.version, 1);
        assert_eq!(def.transitions[0].require_role.as_deref(), Some("admin"));
        assert_eq!(def.transitions[0].conditions.len(), 1);
    }

    #[test]
    fn events_are_distinct_in_order() {
        let def = sample().with_transition(Transition::new("a", "stop", "b"));
        assert_eq!(def.events(), vec!["go", "stop"]);
    }
}
