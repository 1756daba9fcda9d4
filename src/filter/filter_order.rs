use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter_where::{compare_values, lookup};
use super::types::{FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        match order {
            Value::String(s) => Self::parse_order_string(s),
            Value::Array(arr) => {
                // ["comments", "-title"]
                let mut out = Vec::new();
                for v in arr {
                    match v {
                        Value::String(s) => out.extend(Self::parse_order_string(s)?),
                        other => return Err(FilterError::InvalidSort(other.to_string())),
                    }
                }
                Ok(out)
            }
            Value::Object(obj) => {
                // { "comments": "asc", "title": "-1" }
                let mut out = Vec::new();
                for (k, v) in obj {
                    let raw = match v {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        other => return Err(FilterError::InvalidSort(other.to_string())),
                    };
                    let sort = SortDirection::parse(&raw)
                        .ok_or_else(|| FilterError::InvalidSort(format!("{} {}", k, raw)))?;
                    out.push(FilterOrderInfo { column: k.clone(), sort });
                }
                Ok(out)
            }
            Value::Null => Ok(vec![]),
            other => Err(FilterError::InvalidSort(other.to_string())),
        }
    }

    // "comments -title" or "comments,-title"
    fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let mut out = Vec::new();
        for token in s.split(|c: char| c == ',' || c.is_whitespace()) {
            if token.is_empty() { continue; }
            let (column, sort) = match token.strip_prefix('-') {
                Some(column) => (column, SortDirection::Desc),
                None => (token.strip_prefix('+').unwrap_or(token), SortDirection::Asc),
            };
            if column.is_empty() {
                return Err(FilterError::InvalidSort(token.to_string()));
            }
            out.push(FilterOrderInfo { column: column.to_string(), sort });
        }
        Ok(out)
    }

    /// Compare two documents by the sort keys in order. Missing values sort first.
    pub fn compare(a: &Map<String, Value>, b: &Map<String, Value>, infos: &[FilterOrderInfo]) -> Ordering {
        for info in infos {
            let ordering = match (lookup(a, &info.column), lookup(b, &info.column)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            };
            let ordering = match info.sort {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Project a document to the selected fields. `id` is always kept unless
    /// explicitly excluded; `-field` entries exclude instead of include.
    pub fn project(document: &Map<String, Value>, select: &[String]) -> Map<String, Value> {
        if select.is_empty() {
            return document.clone();
        }
        if select.iter().all(|f| f.starts_with('-')) {
            let mut out = document.clone();
            for field in select {
                remove_path(&mut out, &field[1..]);
            }
            return out;
        }

        let mut out = Map::new();
        if let Some(id) = document.get("id") {
            out.insert("id".to_string(), id.clone());
        }
        for field in select {
            if let Some(value) = lookup(document, field) {
                insert_path(&mut out, field, value.clone());
            }
        }
        out
    }
}

fn insert_path(target: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            target.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}

fn remove_path(target: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            target.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(child)) = target.get_mut(head) {
                remove_path(child, rest);
            }
        }
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
    fn parses_all_sort_forms() {
        let from_object = FilterOrder::validate_and_parse(&json!({ "comments": "asc" })).unwrap();
        assert_eq!(from_object[0].sort, SortDirection::Asc);

        let from_string = FilterOrder::validate_and_parse(&json!("comments -title")).unwrap();
        assert_eq!(from_string.len(), 2);
        assert_eq!(from_string[1], FilterOrderInfo { column: "title".into(), sort: SortDirection::Desc });

        assert!(FilterOrder::validate_and_parse(&json!({ "comments": "sideways" })).is_err());
    }

    #[test]
    fn compares_with_direction() {
        let a = doc(json!({ "comments": 5 }));
        let b = doc(json!({ "comments": 10 }));
        let asc = [FilterOrderInfo { column: "comments".into(), sort: SortDirection::Asc }];
        let desc = [FilterOrderInfo { column: "comments".into(), sort: SortDirection::Desc }];
        assert_eq!(FilterOrder::compare(&a, &b, &asc), Ordering::Less);
        assert_eq!(FilterOrder::compare(&a, &b, &desc), Ordering::Greater);
    }

    #[test]
    fn projection() {
        let d = doc(json!({ "id": "1", "title": "t", "comments": 5, "magic": { "wands": 1200, "hats": 1 } }));
        assert_eq!(
            FilterOrder::project(&d, &["comments".into(), "magic.wands".into()]),
            doc(json!({ "id": "1", "comments": 5, "magic": { "wands": 1200 } }))
        );
        assert_eq!(
            FilterOrder::project(&d, &["-title".into(), "-magic".into()]),
            doc(json!({ "id": "1", "comments": 5 }))
        );
    }
}
