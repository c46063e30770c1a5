// SPDX-License-Identifier: MIT

//! Condition expression evaluator
//!
//! Conditions are evaluated against the JSON view of a run state. Missing
//! fields compare equal to `null` and fail every ordering comparison.

use super::ast::{CompareOp, Expression, Literal};
use serde_json::Value;

/// Evaluate a condition expression against a JSON document
pub fn evaluate(expr: &Expression, doc: &Value) -> bool {
    match expr {
        Expression::Const(b) => *b,
        Expression::Truthy(path) => lookup(doc, path) == Some(&Value::Bool(true)),
        Expression::Compare { path, op, value } => compare(lookup(doc, path), *op, value),
        Expression::And(left, right) => evaluate(left, doc) && evaluate(right, doc),
        Expression::Or(left, right) => evaluate(left, doc) || evaluate(right, doc),
        Expression::Not(inner) => !evaluate(inner, doc),
    }
}

/// Resolve a dot-separated path inside a JSON document
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(doc, |current, segment| current.get(segment))
}

fn compare(left: Option<&Value>, op: CompareOp, right: &Literal) -> bool {
    match op {
        CompareOp::Eq => equals(left, right),
        CompareOp::NotEq => !equals(left, right),
        CompareOp::Gt => numeric(left, right).is_some_and(|(a, b)| a > b),
        CompareOp::Gte => numeric(left, right).is_some_and(|(a, b)| a >= b),
        CompareOp::Lt => numeric(left, right).is_some_and(|(a, b)| a < b),
        CompareOp::Lte => numeric(left, right).is_some_and(|(a, b)| a <= b),
        CompareOp::Contains => contains(left, right),
    }
}

fn equals(left: Option<&Value>, right: &Literal) -> bool {
    match (left.unwrap_or(&Value::Null), right) {
        (Value::Null, Literal::Null) => true,
        (Value::String(s), Literal::String(r)) => s == r,
        (Value::Bool(b), Literal::Boolean(r)) => b == r,
        (Value::Number(n), Literal::Number(r)) => {
            n.as_f64().is_some_and(|f| (f - r).abs() < f64::EPSILON)
        }
        _ => false,
    }
}

fn numeric(left: Option<&Value>, right: &Literal) -> Option<(f64, f64)> {
    match (left?, right) {
        (Value::Number(n), Literal::Number(r)) => n.as_f64().map(|f| (f, *r)),
        _ => None,
    }
}

fn contains(left: Option<&Value>, right: &Literal) -> bool {
    match (left, right) {
        (Some(Value::String(s)), Literal::String(needle)) => s.contains(needle.as_str()),
        (Some(Value::Array(items)), literal) => items.iter().any(|v| equals(Some(v), literal)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::condition::parser::parse;
    use serde_json::json;

    fn check(condition: &str, doc: &Value) -> bool {
        evaluate(&parse(condition).unwrap(), doc)
    }

    #[test]
    fn test_string_equality() {
        let doc = json!({"policy_decision": "retry"});
        assert!(check("policy_decision == 'retry'", &doc));
        assert!(!check("policy_decision == 'approve'", &doc));
        assert!(check("policy_decision != 'approve'", &doc));
    }

    #[test]
    fn test_number_comparison() {
        let doc = json!({"retry_count": 2});
        assert!(check("retry_count < 3", &doc));
        assert!(check("retry_count <= 2", &doc));
        assert!(!check("retry_count > 2", &doc));
        assert!(check("retry_count >= 2", &doc));
        assert!(check("retry_count == 2", &doc));
    }

    #[test]
    fn test_boolean_and_truthy() {
        let doc = json!({"human_approval": true, "draft": false});
        assert!(check("human_approval == true", &doc));
        assert!(check("human_approval", &doc));
        assert!(!check("draft", &doc));
        assert!(check("not draft", &doc));
    }

    #[test]
    fn test_missing_field_is_null() {
        let doc = json!({"present": null});
        assert!(check("present == null", &doc));
        assert!(check("missing == null", &doc));
        assert!(!check("missing == 'value'", &doc));
        assert!(!check("missing > 0", &doc));
        assert!(!check("missing", &doc));
    }

    #[test]
    fn test_nested_path() {
        let doc = json!({"validation_report": {"passed": false, "error": "syntax"}});
        assert!(check("validation_report.passed == false", &doc));
        assert!(check("validation_report.error contains 'syn'", &doc));
        assert!(!check("validation_report.rows_flagged > 0", &doc));
    }

    #[test]
    fn test_contains_array() {
        let doc = json!({"audit_log": ["Guard: retry", "Validator: ok"], "ids": [1, 2]});
        assert!(check("audit_log contains 'Validator: ok'", &doc));
        assert!(!check("audit_log contains 'missing'", &doc));
        assert!(check("ids contains 2", &doc));
    }

    #[test]
    fn test_compound_expression() {
        let doc = json!({"policy_decision": "reject", "retry_count": 3});
        assert!(check(
            "policy_decision == 'approve' or policy_decision == 'reject'",
            &doc
        ));
        assert!(check(
            "(policy_decision == 'retry' or retry_count >= 3) and not policy_decision == 'approve'",
            &doc
        ));
    }

    #[test]
    fn test_lookup() {
        let doc = json!({"a": {"b": {"c": 42}}});
        assert_eq!(lookup(&doc, "a.b.c"), Some(&json!(42)));
        assert_eq!(lookup(&doc, "a.x"), None);
    }
}
