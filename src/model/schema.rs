use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use super::{Document, ModelError};
use crate::filter::{lookup, FilterOp};

/// Fields maintained by the model itself
pub const SYSTEM_FIELDS: &[&str] = &["id", "createdAt", "updatedAt", "deleted", "deletedAt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    Mixed,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "String",
            FieldKind::Number => "Number",
            FieldKind::Boolean => "Boolean",
            FieldKind::Date => "Date",
            FieldKind::Mixed => "Mixed",
        }
    }

    /// Coerce a value to this kind, e.g. the query string `"10"` to `10`
    pub fn cast(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (FieldKind::Mixed, v) => Some(v.clone()),
            (FieldKind::String, Value::String(_)) => Some(value.clone()),
            (FieldKind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (FieldKind::String, Value::Bool(b)) => Some(Value::String(b.to_string())),

            (FieldKind::Number, Value::Number(_)) => Some(value.clone()),
            (FieldKind::Number, Value::String(s)) => parse_number(s.trim()),
            (FieldKind::Number, Value::Bool(b)) => Some(Value::from(u8::from(*b))),

            (FieldKind::Boolean, Value::Bool(_)) => Some(value.clone()),
            (FieldKind::Boolean, Value::String(s)) => match s.trim() {
                "true" | "1" | "yes" => Some(Value::Bool(true)),
                "false" | "0" | "no" => Some(Value::Bool(false)),
                _ => None,
            },
            (FieldKind::Boolean, Value::Number(n)) => match n.as_f64() {
                Some(x) if x == 1.0 => Some(Value::Bool(true)),
                Some(x) if x == 0.0 => Some(Value::Bool(false)),
                _ => None,
            },

            (FieldKind::Date, Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| Value::String(dt.with_timezone(&Utc).to_rfc3339())),
            (FieldKind::Date, Value::Number(n)) => n
                .as_i64()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
                .map(|dt| Value::String(dt.to_rfc3339())),

            _ => None,
        }
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Value::from(int));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

#[derive(Debug, Clone)]
pub struct Field {
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<Value>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub unique: bool,
    pub trim: bool,
}

impl Field {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            default: None,
            min: None,
            max: None,
            unique: false,
            trim: false,
        }
    }

    pub fn string() -> Self { Self::new(FieldKind::String) }
    pub fn number() -> Self { Self::new(FieldKind::Number) }
    pub fn boolean() -> Self { Self::new(FieldKind::Boolean) }
    pub fn date() -> Self { Self::new(FieldKind::Date) }
    pub fn mixed() -> Self { Self::new(FieldKind::Mixed) }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn trim(mut self) -> Self {
        self.trim = true;
        self
    }
}

/// One failed field, serialized into the `data` of a 400 envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub kind: String,
    pub message: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Schema validation failure: a message plus one entry per failed path
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ValidationErrors {
    message: String,
    errors: BTreeMap<String, FieldError>,
}

impl ValidationErrors {
    pub fn new(model: &str) -> Self {
        Self {
            message: format!("{} validation failed", model),
            errors: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, error: FieldError) {
        self.errors.insert(error.path.clone(), error);
    }

    pub fn with(mut self, error: FieldError) -> Self {
        self.add(error);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn errors(&self) -> &BTreeMap<String, FieldError> {
        &self.errors
    }

    /// `{ "<path>": { kind, message, path, value? } }`
    pub fn to_fields(&self) -> Map<String, Value> {
        self.errors
            .iter()
            .map(|(path, error)| {
                let value = serde_json::to_value(error).unwrap_or(Value::Null);
                (path.clone(), value)
            })
            .collect()
    }
}

/// Field definitions for a model. Paths may be dotted (`magic.wands`).
#[derive(Debug, Clone)]
pub struct Schema {
    fields: BTreeMap<String, Field>,
    timestamps: bool,
    safe: bool,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            timestamps: true,
            safe: false,
        }
    }

    pub fn field(mut self, path: impl Into<String>, field: Field) -> Self {
        self.fields.insert(path.into(), field);
        self
    }

    /// Maintain `createdAt` and `updatedAt` (on by default)
    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Soft delete: removal flags documents as `deleted` instead of dropping them
    pub fn safe(mut self, enabled: bool) -> Self {
        self.safe = enabled;
        self
    }

    pub fn has_timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Field)> {
        self.fields.iter()
    }

    pub fn unique_paths(&self) -> impl Iterator<Item = &String> {
        self.fields.iter().filter(|(_, f)| f.unique).map(|(path, _)| path)
    }

    /// Drop unknown fields, apply defaults, cast, and check constraints.
    /// The document is updated in place with cast values.
    pub fn validate(&self, model: &str, document: &mut Document) -> Result<(), ValidationErrors> {
        self.strip_unknown(document);

        let mut errors = ValidationErrors::new(model);
        for (path, field) in &self.fields {
            let current = lookup(document, path).filter(|v| !v.is_null()).cloned();
            let value = match (current, &field.default) {
                (Some(value), _) => Some(value),
                (None, Some(default)) => Some(default.clone()),
                (None, None) => None,
            };

            let value = match value {
                None => None,
                Some(raw) => match field.kind.cast(&raw) {
                    Some(cast) => Some(cast),
                    None => {
                        errors.add(FieldError {
                            kind: field.kind.name().to_string(),
                            message: format!(
                                "Cast to {} failed for value {} at path \"{}\"",
                                field.kind.name(),
                                raw,
                                path
                            ),
                            path: path.clone(),
                            value: Some(raw),
                        });
                        continue;
                    }
                },
            };

            let value = match value {
                Some(Value::String(s)) if field.trim => Some(Value::String(s.trim().to_string())),
                other => other,
            };

            let missing = match &value {
                None => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            };
            if field.required && missing {
                errors.add(FieldError {
                    kind: "required".to_string(),
                    message: format!("Path `{}` is required.", path),
                    path: path.clone(),
                    value: None,
                });
                continue;
            }

            if let Some(number) = value.as_ref().and_then(Value::as_f64) {
                if let Some(min) = field.min.filter(|min| number < *min) {
                    errors.add(FieldError {
                        kind: "min".to_string(),
                        message: format!(
                            "Path `{}` ({}) is less than minimum allowed value ({}).",
                            path, number, min
                        ),
                        path: path.clone(),
                        value: value.clone(),
                    });
                    continue;
                }
                if let Some(max) = field.max.filter(|max| number > *max) {
                    errors.add(FieldError {
                        kind: "max".to_string(),
                        message: format!(
                            "Path `{}` ({}) is more than maximum allowed value ({}).",
                            path, number, max
                        ),
                        path: path.clone(),
                        value: value.clone(),
                    });
                    continue;
                }
            }

            if let Some(value) = value {
                set_path(document, path, value);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn strip_unknown(&self, document: &mut Document) {
        let roots: BTreeSet<&str> = self
            .fields
            .keys()
            .map(|path| path.split('.').next().unwrap_or(path))
            .chain(SYSTEM_FIELDS.iter().copied())
            .collect();
        document.retain(|key, _| roots.contains(key.as_str()));
    }

    /// Cast filter operands to the field kinds they are compared against
    pub fn cast_filter(&self, filter: &Map<String, Value>) -> Result<Map<String, Value>, ModelError> {
        let mut out = Map::new();
        for (key, condition) in filter {
            let cast = if key.starts_with('$') {
                match condition {
                    Value::Array(branches) => Value::Array(
                        branches
                            .iter()
                            .map(|branch| match branch {
                                Value::Object(obj) => self.cast_filter(obj).map(Value::Object),
                                other => Ok(other.clone()),
                            })
                            .collect::<Result<_, _>>()?,
                    ),
                    other => other.clone(),
                }
            } else {
                self.cast_condition(key, condition)?
            };
            out.insert(key.clone(), cast);
        }
        Ok(out)
    }

    fn cast_condition(&self, path: &str, condition: &Value) -> Result<Value, ModelError> {
        let kind = match path {
            "deleted" => FieldKind::Boolean,
            "createdAt" | "updatedAt" | "deletedAt" => FieldKind::Date,
            "id" => FieldKind::String,
            _ => match self.fields.get(path) {
                Some(field) => field.kind,
                None => return Ok(condition.clone()),
            },
        };

        let cast_one = |value: &Value| -> Result<Value, ModelError> {
            if value.is_null() {
                return Ok(Value::Null);
            }
            kind.cast(value).ok_or_else(|| ModelError::Cast {
                kind: kind.name().to_string(),
                value: value.clone(),
                path: path.to_string(),
            })
        };

        match condition {
            Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                let mut cast = Map::new();
                for (op, operand) in ops {
                    let value = match FilterOp::parse(op) {
                        Some(FilterOp::Exists) => operand.clone(),
                        Some(FilterOp::In) | Some(FilterOp::NIn) => match operand {
                            Value::Array(items) => {
                                Value::Array(items.iter().map(cast_one).collect::<Result<_, _>>()?)
                            }
                            single => cast_one(single)?,
                        },
                        _ => cast_one(operand)?,
                    };
                    cast.insert(op.clone(), value);
                }
                Ok(Value::Object(cast))
            }
            Value::Array(items) if kind != FieldKind::Mixed => {
                Ok(Value::Array(items.iter().map(cast_one).collect::<Result<_, _>>()?))
            }
            other => cast_one(other),
        }
    }
}

/// Write a value at a dotted path, creating intermediate objects
pub(crate) fn set_path(document: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            document.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = document
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}
