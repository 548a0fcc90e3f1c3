//! Condition evaluation for branching nodes.

use serde_json::Value;

use crate::definition::{Condition, ConditionNode, Operator};
use crate::path::get_value_from_path;

/// Loose numeric view: numbers as-is, numeric strings parsed.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Editors send every comparison value as typed by the user, so `"5"` and
/// `5` must compare equal.
fn loosely_equal(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => a == b,
        _ => match (left, right) {
            (Value::String(a), b) | (b, Value::String(a)) if !b.is_object() && !b.is_array() => {
                *a == scalar_text(b)
            }
            _ => false,
        },
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Evaluate a single condition against the data bag.
pub fn evaluate_condition(condition: &Condition, data: &Value) -> bool {
    let field = get_value_from_path(data, &condition.field);
    match condition.operator {
        Operator::Exists => field.is_some_and(|v| !v.is_null()),
        Operator::Equals => field.is_some_and(|v| loosely_equal(v, &condition.value)),
        Operator::NotEquals => !field.is_some_and(|v| loosely_equal(v, &condition.value)),
        Operator::Gt => match (field.and_then(as_number), as_number(&condition.value)) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        },
        Operator::Lt => match (field.and_then(as_number), as_number(&condition.value)) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        },
        Operator::Unknown => false,
    }
}

impl ConditionNode {
    /// All conditions combined with AND. An empty list is true.
    pub fn evaluate(&self, data: &Value) -> bool {
        self.conditions.iter().all(|c| evaluate_condition(c, data))
    }

    /// The successor list selected by `outcome`.
    pub fn branch(&self, outcome: bool) -> &[String] {
        if outcome {
            &self.true_next
        } else {
            &self.false_next
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(field: &str, operator: Operator, value: Value) -> Condition {
        Condition {
            field: field.into(),
            operator,
            value,
        }
    }

    fn node(conditions: Vec<Condition>) -> ConditionNode {
        ConditionNode {
            conditions,
            true_next: vec!["yes".into()],
            false_next: vec!["no".into()],
        }
    }

    #[test]
    fn gt_selects_branch_strictly() {
        let n = node(vec![cond("x", Operator::Gt, json!(5))]);
        assert_eq!(n.branch(n.evaluate(&json!({ "x": 10 }))), ["yes".to_string()]);
        assert_eq!(n.branch(n.evaluate(&json!({ "x": 3 }))), ["no".to_string()]);
        assert_eq!(n.branch(n.evaluate(&json!({ "x": 5 }))), ["no".to_string()]);
    }

    #[test]
    fn conditions_are_anded() {
        let n = node(vec![
            cond("status", Operator::Equals, json!("active")),
            cond("score", Operator::Lt, json!("100")),
        ]);
        assert!(n.evaluate(&json!({ "status": "active", "score": 50 })));
        assert!(!n.evaluate(&json!({ "status": "active", "score": 150 })));
        assert!(!n.evaluate(&json!({ "status": "lead", "score": 50 })));
    }

    #[test]
    fn equality_is_loose_across_strings_and_numbers() {
        let data = json!({ "httpStatus": 404, "flag": true });
        assert!(evaluate_condition(&cond("httpStatus", Operator::Equals, json!("404")), &data));
        assert!(evaluate_condition(&cond("flag", Operator::Equals, json!("true")), &data));
        assert!(evaluate_condition(&cond("httpStatus", Operator::NotEquals, json!(200)), &data));
        assert!(evaluate_condition(&cond("missing", Operator::NotEquals, json!(1)), &data));
    }

    #[test]
    fn exists_and_unknown_operators() {
        let data = json!({ "contact": { "id": 1 }, "gone": null });
        assert!(evaluate_condition(&cond("contact.id", Operator::Exists, Value::Null), &data));
        assert!(!evaluate_condition(&cond("gone", Operator::Exists, Value::Null), &data));
        assert!(!evaluate_condition(&cond("contact.id", Operator::Unknown, json!(1)), &data));
    }
}
