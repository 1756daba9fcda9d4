//! Bracket-style query strings (`filter[comments]=10&sort[title]=asc`).
//!
//! Values are kept as strings; casting to the right type is left to the
//! model schema, which knows what each field holds.

use serde_json::{Map, Value};

/// Parse a raw query (or urlencoded body) into a nested JSON object.
///
/// - `a=1` sets a string, a repeated `a` becomes an array
/// - `a[b][c]=1` nests objects
/// - `a[]=1&a[]=2` appends to an array
pub fn parse_query(raw: &str) -> Value {
    let mut root = Map::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        if key.is_empty() {
            continue;
        }
        let path = split_key(&key);
        insert(&mut root, &path, Value::String(value.into_owned()));
    }
    Value::Object(root)
}

fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    if open == 0 {
        return vec![key.to_string()];
    }

    let mut path = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while !rest.is_empty() {
        let Some(inner) = rest.strip_prefix('[') else {
            return vec![key.to_string()];
        };
        let Some(close) = inner.find(']') else {
            return vec![key.to_string()];
        };
        path.push(inner[..close].to_string());
        rest = &inner[close + 1..];
    }
    path
}

fn insert(map: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };

    if rest.is_empty() {
        match map.get_mut(head) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) if existing.is_string() => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            _ => {
                map.insert(head.clone(), value);
            }
        }
        return;
    }

    if rest[0].is_empty() {
        let entry = map
            .entry(head.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        match entry {
            Value::Array(items) => items.push(value),
            other => *other = Value::Array(vec![value]),
        }
        return;
    }

    let entry = map
        .entry(head.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(child) = entry {
        insert(child, rest, value);
    }
}
