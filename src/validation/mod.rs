//! Response validation. [`evaluate`] is a total function: every rule yields a
//! verdict, and a response that cannot satisfy a rule's preconditions (no
//! status code, non-JSON body, malformed pattern) fails that rule with an
//! explanatory message instead of aborting the evaluation pass.

use serde_json::Value;

use crate::models::{RuleKind, RuleVerdict, ValidationRule};

/// The slice of a request outcome that rules are allowed to see. Transport
/// failures present as `status_code: None` with an empty body.
#[derive(Debug, Clone, Copy)]
pub struct ResponseView<'a> {
    pub status_code: Option<u16>,
    pub body: &'a str,
}

/// Evaluates every rule in order and folds the overall pass flag: the logical
/// AND of all verdicts, vacuously true for an empty rule set.
pub fn evaluate_all(rules: &[ValidationRule], response: &ResponseView<'_>) -> (Vec<RuleVerdict>, bool) {
    let verdicts: Vec<RuleVerdict> = rules.iter().map(|rule| evaluate(rule, response)).collect();
    let passed = verdicts.iter().all(|v| v.passed);
    (verdicts, passed)
}

pub fn evaluate(rule: &ValidationRule, response: &ResponseView<'_>) -> RuleVerdict {
    let (passed, message) = match rule.kind {
        RuleKind::Exists => {
            let needle = expected_text(&rule.value);
            if response.body.contains(&needle) {
                (true, format!("String '{needle}' found in response"))
            } else {
                (false, format!("String '{needle}' not found in response"))
            }
        }
        RuleKind::NotExists => {
            let needle = expected_text(&rule.value);
            if response.body.contains(&needle) {
                (false, format!("String '{needle}' unexpectedly found in response"))
            } else {
                (true, format!("String '{needle}' correctly not found in response"))
            }
        }
        RuleKind::StatusCode => match (expected_status(&rule.value), response.status_code) {
            (None, _) => (
                false,
                format!("Expected status code '{}' is not an integer", rule.value),
            ),
            (Some(expected), None) => (
                false,
                format!("No status code to compare against expected {expected}: request produced no response"),
            ),
            (Some(expected), Some(actual)) if i64::from(actual) == expected => {
                (true, format!("Status code matches expected {expected}"))
            }
            (Some(expected), Some(actual)) => (
                false,
                format!("Status code {actual} does not match expected {expected}"),
            ),
        },
        RuleKind::Regex => {
            let pattern = expected_text(&rule.value);
            match regex::Regex::new(&pattern) {
                Err(err) => (false, format!("Invalid regex pattern '{pattern}': {err}")),
                Ok(re) if re.is_match(response.body) => {
                    (true, format!("Regex pattern '{pattern}' matched"))
                }
                Ok(_) => (false, format!("Regex pattern '{pattern}' did not match")),
            }
        }
        RuleKind::JsonPath => evaluate_json_path(rule, response),
    };

    RuleVerdict {
        rule: rule.clone(),
        passed,
        message,
    }
}

/// Walks a dot-separated key path from the JSON root. Keys only, no array
/// indexing; existence of the terminal key is the pass condition.
fn evaluate_json_path(rule: &ValidationRule, response: &ResponseView<'_>) -> (bool, String) {
    let Some(path) = rule.field_path.as_deref().filter(|p| !p.is_empty()) else {
        return (false, "json_path rule is missing field_path".to_string());
    };

    let root: Value = match serde_json::from_str(response.body) {
        Ok(value) => value,
        Err(err) => return (false, format!("Response body is not valid JSON: {err}")),
    };

    let mut current = &root;
    for key in path.split('.') {
        match current.get(key) {
            Some(next) => current = next,
            None => {
                return (
                    false,
                    format!("JSON path '{path}' not found: missing key '{key}'"),
                )
            }
        }
    }
    (true, format!("JSON path '{path}' found in response"))
}

/// String form of the expected value: JSON strings are used verbatim, other
/// values in their JSON rendering.
fn expected_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn expected_status(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}
