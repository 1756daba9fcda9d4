use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use axum::http::HeaderMap;
use serde_json::{Map, Value};

use crate::auth::Claims;
use crate::model::Model;

/// Per-request scratch map shared by the hooks, permissions and handler of
/// one request. Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct Scratch(Arc<Mutex<Map<String, Value>>>);

impl Scratch {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Map<String, Value>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.lock().insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.lock().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.lock().clone()
    }
}

impl fmt::Debug for Scratch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Scratch").field(&self.snapshot()).finish()
    }
}

/// Everything a handler, hook or permission sees about one request
#[derive(Clone)]
pub struct RequestContext {
    /// Id of the route being served
    pub route: String,
    pub params: HashMap<String, String>,
    pub query: Value,
    pub body: Value,
    pub headers: HeaderMap,
    pub auth: Option<Claims>,
    pub user: Option<Value>,
    pub model: Arc<dyn Model>,
    pub context: Scratch,
    /// The handler result, set only for after-hooks
    pub data: Option<Value>,
}

impl RequestContext {
    pub fn new(route: impl Into<String>, model: Arc<dyn Model>) -> Self {
        Self {
            route: route.into(),
            params: HashMap::new(),
            query: Value::Object(Map::new()),
            body: Value::Object(Map::new()),
            headers: HeaderMap::new(),
            auth: None,
            user: None,
            model,
            context: Scratch::new(),
            data: None,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Copy of this context carrying the handler result. The scratch map is
    /// shared with the original.
    pub fn with_data(&self, data: Value) -> Self {
        Self {
            data: Some(data),
            ..self.clone()
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("route", &self.route)
            .field("params", &self.params)
            .field("query", &self.query)
            .field("body", &self.body)
            .field("auth", &self.auth)
            .field("user", &self.user)
            .field("model", &self.model.name())
            .field("context", &self.context)
            .field("data", &self.data)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MemoryModel, Schema};
    use serde_json::json;

    #[test]
    fn data_copy_shares_scratch() {
        let model = Arc::new(MemoryModel::new("Example", Schema::new()));
        let ctx = RequestContext::new("find", model);
        ctx.context.insert("seen", true);

        let after = ctx.with_data(json!({ "examples": [] }));
        after.context.insert("after", 1);

        assert_eq!(ctx.context.get("after"), Some(json!(1)));
        assert_eq!(after.context.get("seen"), Some(json!(true)));
        assert!(ctx.data.is_none());
        assert_eq!(after.data, Some(json!({ "examples": [] })));
    }
}
