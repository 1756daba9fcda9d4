//! Default CRUD routes derived from a resource name.
//!
//! For `example` these answer with `{ examples: [...] }`, `{ count }` and
//! `{ example: ... }` payloads.

use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use super::context::RequestContext;
use super::naming::plural;
use super::route::{Method, Route};
use crate::error::{ApiError, ConfigError};
use crate::filter::Filter;
use crate::model::schema::SYSTEM_FIELDS;
use crate::model::Document;

pub const INVALID_ID: &str = "Request did not contain a valid id.";

fn keyed(key: &str, value: Value) -> Value {
    let mut out = Map::new();
    out.insert(key.to_string(), value);
    Value::Object(out)
}

fn id_param(name: &str) -> String {
    format!("{}Id", name)
}

fn require_id(ctx: &RequestContext, param: &str) -> Result<String, ApiError> {
    match ctx.param(param) {
        Some(id) if Uuid::parse_str(id).is_ok() => Ok(id.to_string()),
        _ => Err(ApiError::bad_request(INVALID_ID)),
    }
}

fn missing_id(name: &str, id: &str) -> ApiError {
    ApiError::not_found(format!("Model {} did not have an item with the id \"{}\".", name, id))
}

/// The seven default routes, in registration order
pub fn routes(name: &str) -> Result<Vec<Route>, ConfigError> {
    Ok(vec![
        find(name)?,
        count(name)?,
        find_one(name)?,
        find_by_id(name)?,
        create(name)?,
        update(name)?,
        remove(name)?,
    ])
}

pub fn find(name: &str) -> Result<Route, ConfigError> {
    let key = plural(name);
    Route::new("find", Method::Get, "/", move |ctx: Arc<RequestContext>| {
        let key = key.clone();
        async move {
            let query = Filter::from_query(&ctx.query).map_err(ApiError::from)?;
            let found = ctx.model.find(&query).await?;
            Ok(keyed(&key, Value::Array(found.into_iter().map(Value::Object).collect())))
        }
    })
}

pub fn count(_name: &str) -> Result<Route, ConfigError> {
    Route::new("count", Method::Get, "/count", |ctx: Arc<RequestContext>| async move {
        let query = Filter::from_query(&ctx.query).map_err(ApiError::from)?;
        let count = ctx.model.count(&query.filter).await?;
        Ok(keyed("count", Value::from(count)))
    })
}

pub fn find_one(name: &str) -> Result<Route, ConfigError> {
    let name = name.to_string();
    Route::new("findOne", Method::Get, "/one", move |ctx: Arc<RequestContext>| {
        let name = name.clone();
        async move {
            let query = Filter::from_query(&ctx.query).map_err(ApiError::from)?;
            let found = ctx.model.find_one(&query).await?.ok_or_else(|| {
                ApiError::not_found(format!(
                    "Model {} did not have an item with the given parameters.",
                    name
                ))
            })?;
            Ok(keyed(&name, Value::Object(found)))
        }
    })
}

pub fn find_by_id(name: &str) -> Result<Route, ConfigError> {
    let name = name.to_string();
    let param = id_param(&name);
    Route::new("findById", Method::Get, format!("/:{}", param), move |ctx: Arc<RequestContext>| {
        let name = name.clone();
        let param = param.clone();
        async move {
            let id = require_id(&ctx, &param)?;
            let query = Filter::from_query(&ctx.query).map_err(ApiError::from)?;
            let found = ctx
                .model
                .find_by_id(&id, query.select.as_deref())
                .await?
                .ok_or_else(|| missing_id(&name, &id))?;
            Ok(keyed(&name, Value::Object(found)))
        }
    })
}

pub fn create(name: &str) -> Result<Route, ConfigError> {
    let name = name.to_string();
    Route::new("create", Method::Post, "/", move |ctx: Arc<RequestContext>| {
        let name = name.clone();
        async move {
            let created = ctx.model.create(ctx.body.clone()).await?;
            Ok(keyed(&name, Value::Object(created)))
        }
    })
}

pub fn update(name: &str) -> Result<Route, ConfigError> {
    let name = name.to_string();
    let param = id_param(&name);
    Route::new("update", Method::Patch, format!("/:{}", param), move |ctx: Arc<RequestContext>| {
        let name = name.clone();
        let param = param.clone();
        async move {
            let id = require_id(&ctx, &param)?;
            let mut document: Document = ctx
                .model
                .find_by_id(&id, None)
                .await?
                .ok_or_else(|| missing_id(&name, &id))?;
            if let Value::Object(changes) = &ctx.body {
                for (key, value) in changes {
                    if SYSTEM_FIELDS.contains(&key.as_str()) {
                        continue;
                    }
                    document.insert(key.clone(), value.clone());
                }
            }
            let saved = ctx.model.save(document).await?;
            Ok(keyed(&name, Value::Object(saved)))
        }
    })
}

pub fn remove(name: &str) -> Result<Route, ConfigError> {
    let name = name.to_string();
    let param = id_param(&name);
    Route::new("remove", Method::Delete, format!("/:{}", param), move |ctx: Arc<RequestContext>| {
        let name = name.clone();
        let param = param.clone();
        async move {
            let id = require_id(&ctx, &param)?;
            ctx.model.remove(&id).await?;
            Ok(keyed(&name, Value::Null))
        }
    })
}
