//! Guard evaluation.
//!
//! Numbers compare as `rust_decimal::Decimal`, never through `f64`. Strings
//! compare lexicographically. Anything else, including a type mismatch or a
//! missing field, makes the guard fail instead of erroring.

use std::cmp::Ordering;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Number, Value};

use crate::definition::{Condition, ConditionOperator, Metadata};
use crate::instance::{EntityState, Variables};

/// Interprets `script` and `custom` guards.
///
/// `None` means the guard cannot be evaluated, which counts as not met.
pub trait ConditionDelegate: Send + Sync {
    fn evaluate(&self, condition: &Condition, scope: &Scope<'_>) -> Option<bool>;
}

/// Delegate that cannot evaluate anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelegate;

impl ConditionDelegate for NoDelegate {
    fn evaluate(&self, _condition: &Condition, _scope: &Scope<'_>) -> Option<bool> {
        None
    }
}

/// Layered lookup for guard fields: request metadata, then entity state,
/// then instance variables.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    metadata: &'a Metadata,
    entity: &'a EntityState,
    variables: &'a Variables,
}

impl<'a> Scope<'a> {
    pub fn new(metadata: &'a Metadata, entity: &'a EntityState, variables: &'a Variables) -> Self {
        Self {
            metadata,
            entity,
            variables,
        }
    }

    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.metadata
            .get(field)
            .or_else(|| self.entity.get(field))
            .or_else(|| self.variables.get(field))
    }
}

/// Check one guard. `Err` carries why it did not hold.
pub fn check(
    condition: &Condition,
    scope: &Scope<'_>,
    delegate: &dyn ConditionDelegate,
) -> Result<(), String> {
    match condition {
        Condition::Field {
            field,
            operator,
            value,
            ..
        } => {
            let actual = scope
                .get(field)
                .ok_or_else(|| format!("field '{field}' is not set"))?;
            if compare(actual, *operator, value)? {
                Ok(())
            } else {
                Err(format!("{field} is {actual}"))
            }
        }
        Condition::Script { .. } | Condition::Custom { .. } => {
            match delegate.evaluate(condition, scope) {
                Some(true) => Ok(()),
                Some(false) => Err("rejected by condition delegate".to_string()),
                None => Err("condition cannot be evaluated".to_string()),
            }
        }
    }
}

/// Apply `operator` to `actual` and `expected`.
///
/// `Err` reports an operand pairing the operator does not support.
pub fn compare(actual: &Value, operator: ConditionOperator, expected: &Value) -> Result<bool, String> {
    let mismatch = || format!("cannot apply '{operator}' to {actual} and {expected}");
    match operator {
        ConditionOperator::Eq => equals(actual, expected).ok_or_else(mismatch),
        ConditionOperator::Ne => equals(actual, expected).map(|eq| !eq).ok_or_else(mismatch),
        ConditionOperator::Gt => order(actual, expected)
            .map(Ordering::is_gt)
            .ok_or_else(mismatch),
        ConditionOperator::Gte => order(actual, expected)
            .map(Ordering::is_ge)
            .ok_or_else(mismatch),
        ConditionOperator::Lt => order(actual, expected)
            .map(Ordering::is_lt)
            .ok_or_else(mismatch),
        ConditionOperator::Lte => order(actual, expected)
            .map(Ordering::is_le)
            .ok_or_else(mismatch),
        ConditionOperator::In => match expected {
            Value::Array(items) => Ok(items
                .iter()
                .any(|item| equals(actual, item) == Some(true))),
            _ => Err(format!("'in' expects an array, got {expected}")),
        },
        ConditionOperator::Contains => match (actual, expected) {
            (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
            _ => Err(mismatch()),
        },
    }
}

/// Equality within one JSON type. `None` for mixed types.
fn equals(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Some(decimal(x)? == decimal(y)?),
        (Value::String(x), Value::String(y)) => Some(x == y),
        (Value::Bool(x), Value::Bool(y)) => Some(x == y),
        (Value::Null, Value::Null) => Some(true),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => Some(a == b),
        _ => None,
    }
}

/// Ordering for numbers and strings only.
fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Some(decimal(x)?.cmp(&decimal(y)?)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn decimal(n: &Number) -> Option<Decimal> {
    if let Some(i) = n.as_i64() {
        return Some(Decimal::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Some(Decimal::from(u));
    }
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cmp(actual: Value, op: ConditionOperator, expected: Value) -> Result<bool, String> {
        compare(&actual, op, &expected)
    }

    #[test]
    fn numbers_compare_exactly() {
        use ConditionOperator::*;
        assert_eq!(cmp(json!(1.0), Gte, json!(1)), Ok(true));
        assert_eq!(cmp(json!(0.5), Gte, json!(1.0)), Ok(false));
        assert_eq!(cmp(json!(0.3), Eq, json!(0.3)), Ok(true));
        assert_eq!(cmp(json!(10), Gt, json!(9.99)), Ok(true));
        assert_eq!(cmp(json!(2), Lte, json!(2)), Ok(true));
        assert_eq!(cmp(json!(2), Lt, json!(2)), Ok(false));
        assert_eq!(cmp(json!(3), Ne, json!(3.0)), Ok(false));
    }

    #[test]
    fn strings_compare_lexicographically() {
        use ConditionOperator::*;
        assert_eq!(cmp(json!("b"), Gt, json!("a")), Ok(true));
        assert_eq!(cmp(json!("10"), Lt, json!("9")), Ok(true));
        assert_eq!(cmp(json!("cotton blend"), Contains, json!("cotton")), Ok(true));
    }

    #[test]
    fn mismatched_types_fail() {
        use ConditionOperator::*;
        assert!(cmp(json!("1"), Eq, json!(1)).is_err());
        assert!(cmp(json!(true), Gt, json!(false)).is_err());
        assert!(cmp(json!(null), Gte, json!(1)).is_err());
        assert!(cmp(json!(5), Contains, json!("5")).is_err());
        assert!(cmp(json!("a"), In, json!("abc")).is_err());
    }

    #[test]
    fn membership_uses_same_equality() {
        use ConditionOperator::In;
        assert_eq!(cmp(json!(2.0), In, json!([1, 2, 3])), Ok(true));
        assert_eq!(cmp(json!("vip"), In, json!(["vip", "gold"])), Ok(true));
        assert_eq!(cmp(json!("vip"), In, json!([1, "gold"])), Ok(false));
    }

    #[test]
    fn scope_prefers_metadata_then_entity_then_variables() {
        let metadata = json!({"progress": 1.0}).as_object().cloned().unwrap();
        let entity = json!({"progress": 0.2, "customer": "acme"})
            .as_object()
            .cloned()
            .unwrap();
        let variables = Variables::from([
            ("customer".to_string(), json!("other")),
            ("priority".to_string(), json!("high")),
        ]);
        let scope = Scope::new(&metadata, &entity, &variables);

        assert_eq!(scope.get("progress"), Some(&json!(1.0)));
        assert_eq!(scope.get("customer"), Some(&json!("acme")));
        assert_eq!(scope.get("priority"), Some(&json!("high")));
        assert_eq!(scope.get("missing"), None);
    }

    #[test]
    fn opaque_conditions_need_a_delegate() {
        struct Approve;
        impl ConditionDelegate for Approve {
            fn evaluate(&self, _c: &Condition, _s: &Scope<'_>) -> Option<bool> {
                Some(true)
            }
        }

        let empty = Metadata::new();
        let entity = EntityState::new();
        let variables = Variables::new();
        let scope = Scope::new(&empty, &entity, &variables);
        let script = Condition::Script {
            script: "credit_ok".into(),
            description: String::new(),
        };

        assert!(check(&script, &scope, &NoDelegate).is_err());
        assert!(check(&script, &scope, &Approve).is_ok());
    }

    #[test]
    fn missing_field_fails() {
        let empty = Metadata::new();
        let entity = EntityState::new();
        let variables = Variables::new();
        let scope = Scope::new(&empty, &entity, &variables);
        let cond = Condition::field("progress", ConditionOperator::Gte, json!(1));
        let err = check(&cond, &scope, &NoDelegate).unwrap_err();
        assert!(err.contains("progress"));
    }
}
