use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::FilterOp;

/// Document matching for `filter` conditions.
///
/// A condition is either a plain value (equality) or an object of operators,
/// e.g. `{ "comments": { "$gte": 5 } }`. `$and`/`$or` take arrays of nested
/// conditions at the top level.
pub struct FilterWhere;

impl FilterWhere {
    pub fn validate(filter: &Map<String, Value>) -> Result<(), FilterError> {
        for (key, value) in filter {
            if key.starts_with('$') {
                Self::validate_logical(key, value)?;
            } else {
                Self::validate_field(key, value)?;
            }
        }
        Ok(())
    }

    fn validate_logical(key: &str, value: &Value) -> Result<(), FilterError> {
        let op = FilterOp::parse(key).ok_or_else(|| FilterError::UnsupportedOperator(key.to_string()))?;
        if !op.is_logical() {
            return Err(FilterError::InvalidFilter(format!("{} must be applied to a field", key)));
        }
        let Value::Array(branches) = value else {
            return Err(FilterError::InvalidOperatorData(format!("{} expects an array", key)));
        };
        for branch in branches {
            let Value::Object(branch) = branch else {
                return Err(FilterError::InvalidOperatorData(format!("{} expects an array of objects", key)));
            };
            Self::validate(branch)?;
        }
        Ok(())
    }

    fn validate_field(field: &str, condition: &Value) -> Result<(), FilterError> {
        let Some(ops) = Self::operators(condition) else {
            return Ok(());
        };
        if ops.keys().any(|k| !k.starts_with('$')) {
            return Err(FilterError::InvalidOperatorData(format!(
                "condition for \"{}\" mixes operators and fields",
                field
            )));
        }
        for key in ops.keys() {
            let op = FilterOp::parse(key).ok_or_else(|| FilterError::UnsupportedOperator(key.to_string()))?;
            if op.is_logical() {
                return Err(FilterError::InvalidFilter(format!("{} cannot be applied to \"{}\"", key, field)));
            }
        }
        Ok(())
    }

    /// The operator map of a condition, if it is written with operators
    fn operators(condition: &Value) -> Option<&Map<String, Value>> {
        match condition {
            Value::Object(obj) if obj.keys().any(|k| k.starts_with('$')) => Some(obj),
            _ => None,
        }
    }

    pub fn matches(document: &Map<String, Value>, filter: &Map<String, Value>) -> bool {
        filter.iter().all(|(key, condition)| {
            if key.starts_with('$') {
                Self::matches_logical(document, key, condition)
            } else {
                Self::matches_field(lookup(document, key), condition)
            }
        })
    }

    fn matches_logical(document: &Map<String, Value>, key: &str, branches: &Value) -> bool {
        let branches: Vec<&Map<String, Value>> = match branches {
            Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
            _ => return false,
        };
        match FilterOp::parse(key) {
            Some(FilterOp::And) => branches.iter().all(|b| Self::matches(document, b)),
            Some(FilterOp::Or) => branches.iter().any(|b| Self::matches(document, b)),
            _ => false,
        }
    }

    fn matches_field(actual: Option<&Value>, condition: &Value) -> bool {
        let Some(ops) = Self::operators(condition) else {
            return equals(actual, condition);
        };
        ops.iter().all(|(key, operand)| match FilterOp::parse(key) {
            Some(FilterOp::Eq) => equals(actual, operand),
            Some(FilterOp::Ne) => !equals(actual, operand),
            Some(FilterOp::Gt) => ordered(actual, operand, |o| o == Ordering::Greater),
            Some(FilterOp::Gte) => ordered(actual, operand, |o| o != Ordering::Less),
            Some(FilterOp::Lt) => ordered(actual, operand, |o| o == Ordering::Less),
            Some(FilterOp::Lte) => ordered(actual, operand, |o| o != Ordering::Greater),
            Some(FilterOp::In) => one_of(operand).any(|v| equals(actual, v)),
            Some(FilterOp::NIn) => !one_of(operand).any(|v| equals(actual, v)),
            Some(FilterOp::Exists) => {
                let present = actual.map_or(false, |v| !v.is_null());
                present == truthy(operand)
            }
            _ => false,
        })
    }
}

/// Resolve a dotted path (`magic.wands`) inside a document
pub fn lookup<'a>(document: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Order two scalar values of the same kind; mixed kinds are unordered
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn same(a: &Value, b: &Value) -> bool {
    match compare_values(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None | Some(Value::Null) => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => items.iter().any(|item| same(item, expected)),
        Some(value) => same(value, expected),
    }
}

fn ordered(actual: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    actual
        .and_then(|value| compare_values(value, operand))
        .map_or(false, accept)
}

fn one_of(operand: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match operand {
        Value::Array(items) => Box::new(items.iter()),
        single => Box::new(std::iter::once(single)),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => !matches!(s.as_str(), "" | "false" | "0"),
        Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0),
        Value::Null => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn equality_and_nested_paths() {
        let d = doc(json!({ "title": "a", "comments": 10, "magic": { "wands": 1500 }, "tags": ["x", "y"] }));
        assert!(FilterWhere::matches(&d, &doc(json!({ "comments": 10 }))));
        assert!(FilterWhere::matches(&d, &doc(json!({ "comments": 10.0 }))));
        assert!(!FilterWhere::matches(&d, &doc(json!({ "comments": 5 }))));
        assert!(FilterWhere::matches(&d, &doc(json!({ "magic.wands": 1500 }))));
        assert!(FilterWhere::matches(&d, &doc(json!({ "tags": "y" }))));
        assert!(FilterWhere::matches(&d, &doc(json!({ "missing": null }))));
    }

    #[test]
    fn operators() {
        let d = doc(json!({ "comments": 10, "title": "b" }));
        assert!(FilterWhere::matches(&d, &doc(json!({ "comments": { "$gt": 5, "$lte": 10 } }))));
        assert!(!FilterWhere::matches(&d, &doc(json!({ "comments": { "$lt": 10 } }))));
        assert!(FilterWhere::matches(&d, &doc(json!({ "title": { "$in": ["a", "b"] } }))));
        assert!(FilterWhere::matches(&d, &doc(json!({ "title": { "$nin": "a" } }))));
        assert!(FilterWhere::matches(&d, &doc(json!({ "title": { "$ne": "a" } }))));
        assert!(FilterWhere::matches(&d, &doc(json!({ "deleted": { "$exists": false } }))));
        assert!(FilterWhere::matches(
            &d,
            &doc(json!({ "$or": [{ "comments": 1 }, { "title": "b" }] }))
        ));
        assert!(!FilterWhere::matches(
            &d,
            &doc(json!({ "$and": [{ "comments": 10 }, { "title": "a" }] }))
        ));
    }

    #[test]
    fn validation() {
        assert!(FilterWhere::validate(&doc(json!({ "a": { "$gt": 1 } }))).is_ok());
        assert!(FilterWhere::validate(&doc(json!({ "a": { "b": 1 } }))).is_ok());
        assert_eq!(
            FilterWhere::validate(&doc(json!({ "a": { "$regex": "x" } }))),
            Err(FilterError::UnsupportedOperator("$regex".into()))
        );
        assert!(FilterWhere::validate(&doc(json!({ "a": { "$gt": 1, "b": 2 } }))).is_err());
        assert!(FilterWhere::validate(&doc(json!({ "$or": { "a": 1 } }))).is_err());
        assert!(FilterWhere::validate(&doc(json!({ "$gt": [] }))).is_err());
    }
}
