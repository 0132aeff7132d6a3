use crate::ConditionOperator;
use serde_json::Value;

/// Textual form of an event value for comparison and interpolation.
///
/// Strings render unquoted; other scalars and collections render as compact
/// JSON. Comparing against collections is not a supported rule pattern but
/// yields a stable result.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Applies a comparison operator to the looked-up event value.
///
/// All comparisons are case-insensitive over stringified values. An absent or
/// null actual value satisfies no operator, including `notEquals`: an absent
/// value matches no concrete expectation, negatively or otherwise.
pub fn apply(op: ConditionOperator, actual: Option<&Value>, expected: &str) -> bool {
    let actual = actual.filter(|v| !v.is_null());
    match op {
        ConditionOperator::Exists => actual.is_some(),
        ConditionOperator::Equals => match actual {
            Some(v) => stringify(v).to_lowercase() == expected.to_lowercase(),
            None => false,
        },
        ConditionOperator::NotEquals => match actual {
            Some(v) => stringify(v).to_lowercase() != expected.to_lowercase(),
            None => false,
        },
        ConditionOperator::Contains => match actual {
            Some(v) => stringify(v)
                .to_lowercase()
                .contains(&expected.to_lowercase()),
            None => false,
        },
    }
}
