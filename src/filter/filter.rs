use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::FilterData;

/// Reads `filter`, `sort`, `skip`, `limit` and `select` out of a parsed query
pub struct Filter;

impl Filter {
    pub fn from_query(query: &Value) -> Result<FilterData, FilterError> {
        let mut data = FilterData::default();
        let Some(query) = query.as_object() else {
            return Ok(data);
        };

        if let Some(filter) = query.get("filter") {
            data.filter = Self::filter(filter)?;
        }
        if let Some(sort) = query.get("sort") {
            data.sort = FilterOrder::validate_and_parse(sort)?;
        }
        if let Some(skip) = query.get("skip") {
            data.skip = Some(Self::count(skip).ok_or_else(|| FilterError::InvalidSkip(skip.to_string()))?);
        }
        if let Some(limit) = query.get("limit") {
            data.limit = Some(Self::count(limit).ok_or_else(|| FilterError::InvalidLimit(limit.to_string()))?);
        }
        if let Some(select) = query.get("select") {
            data.select = Some(Self::select(select)?);
        }
        Ok(data)
    }

    fn filter(raw: &Value) -> Result<Map<String, Value>, FilterError> {
        let filter = match raw {
            Value::Object(obj) => obj.clone(),
            // filter={"comments":10} as JSON text
            Value::String(s) if s.trim().is_empty() => Map::new(),
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(Value::Object(obj)) => obj,
                _ => return Err(FilterError::InvalidFilter(format!("expected an object, got {}", s))),
            },
            Value::Null => Map::new(),
            other => return Err(FilterError::InvalidFilter(format!("expected an object, got {}", other))),
        };
        FilterWhere::validate(&filter)?;
        Ok(filter)
    }

    fn count(raw: &Value) -> Option<usize> {
        match raw {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            _ => None,
        }
    }

    fn select(raw: &Value) -> Result<Vec<String>, FilterError> {
        let fields: Vec<String> = match raw {
            Value::String(s) => s
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| FilterError::InvalidSelect(item.to_string()))
                })
                .collect::<Result<_, _>>()?,
            other => return Err(FilterError::InvalidSelect(other.to_string())),
        };

        let excluded = fields.iter().filter(|f| f.starts_with('-')).count();
        if excluded != 0 && excluded != fields.len() {
            return Err(FilterError::InvalidSelect(
                "cannot mix inclusion and exclusion".to_string(),
            ));
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::parse_query;
    use crate::filter::{FilterOrderInfo, SortDirection};
    use serde_json::json;

    #[test]
    fn reads_all_options() {
        let query = parse_query("filter[comments]=10&sort[comments]=desc&skip=1&limit=5&select=title,comments");
        let data = Filter::from_query(&query).unwrap();
        assert_eq!(data.filter, json!({ "comments": "10" }).as_object().cloned().unwrap());
        assert_eq!(
            data.sort,
            vec![FilterOrderInfo { column: "comments".into(), sort: SortDirection::Desc }]
        );
        assert_eq!(data.skip, Some(1));
        assert_eq!(data.limit, Some(5));
        assert_eq!(data.select, Some(vec!["title".to_string(), "comments".to_string()]));
    }

    #[test]
    fn json_filter_text() {
        let query = json!({ "filter": "{\"comments\": 10}" });
        let data = Filter::from_query(&query).unwrap();
        assert_eq!(data.filter.get("comments"), Some(&json!(10)));
    }

    #[test]
    fn rejects_bad_numbers_and_operators() {
        assert!(matches!(
            Filter::from_query(&json!({ "limit": "lots" })),
            Err(FilterError::InvalidLimit(_))
        ));
        assert!(matches!(
            Filter::from_query(&json!({ "skip": "-1" })),
            Err(FilterError::InvalidSkip(_))
        ));
        assert!(matches!(
            Filter::from_query(&json!({ "filter": { "comments": { "$near": "1" } } })),
            Err(FilterError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            Filter::from_query(&json!({ "select": "title -comments" })),
            Err(FilterError::InvalidSelect(_))
        ));
    }

    #[test]
    fn missing_query_is_empty() {
        assert_eq!(Filter::from_query(&json!({})).unwrap(), FilterData::default());
        assert_eq!(Filter::from_query(&Value::Null).unwrap(), FilterData::default());
    }
}
