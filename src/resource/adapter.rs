use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, Request};
use axum::http::{header, request::Parts, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};

use super::context::{RequestContext, Scratch};
use super::hooks::HookPipeline;
use crate::api::{parse_query, Envelope};
use crate::auth::Claims;
use crate::error::ApiError;
use crate::middleware::auth::CurrentUser;
use crate::model::Model;

/// The transport-facing form of a compiled route
pub type Dispatch = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Builds a `RequestContext` from an axum request, runs the pipeline and
/// writes the outcome as an envelope.
pub struct RequestAdapter {
    route: String,
    model: Arc<dyn Model>,
    pipeline: HookPipeline,
    debug: bool,
    body_limit: usize,
    param_names: Vec<String>,
}

impl RequestAdapter {
    pub fn new(route: impl Into<String>, model: Arc<dyn Model>, pipeline: HookPipeline) -> Self {
        Self {
            route: route.into(),
            model,
            pipeline,
            debug: false,
            body_limit: 2 * 1024 * 1024,
            param_names: Vec::new(),
        }
    }

    /// Include the error chain of 500 responses under `stack`
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Names for the path captures, in order. The transport may match under
    /// different names when routes of the same shape share one entry.
    pub fn param_names(mut self, names: Vec<String>) -> Self {
        self.param_names = names;
        self
    }

    pub fn into_dispatch(self) -> Dispatch {
        let adapter = Arc::new(self);
        Arc::new(move |request: Request| {
            let adapter = adapter.clone();
            async move { adapter.handle(request).await }.boxed()
        })
    }

    pub async fn handle(&self, request: Request) -> Response {
        let outcome = AssertUnwindSafe(self.run(request)).catch_unwind().await;
        let result = match outcome {
            Ok(result) => result,
            Err(panic) => Err(ApiError::internal(panic_message(panic))),
        };

        match result {
            Ok(data) => Envelope::success(data).into_response(),
            Err(err) => {
                let envelope = err.to_envelope(self.debug);
                if envelope.status_code().is_server_error() {
                    tracing::error!("Route {} failed with {}: {}", self.route, envelope.code, err);
                } else {
                    tracing::warn!("Route {} rejected with {}: {}", self.route, envelope.code, err);
                }
                envelope.into_response()
            }
        }
    }

    async fn run(&self, request: Request) -> Result<Value, ApiError> {
        let ctx = self.context(request).await?;
        tracing::debug!("Dispatching route {}", self.route);
        self.pipeline.run(Arc::new(ctx)).await
    }

    async fn context(&self, request: Request) -> Result<RequestContext, ApiError> {
        let (mut parts, body) = request.into_parts();

        let captured = match Path::<Vec<(String, String)>>::from_request_parts(&mut parts, &()).await {
            Ok(Path(captured)) => captured,
            Err(_) => Vec::new(),
        };
        let params = rename_params(&self.param_names, captured);
        let query = parts
            .uri
            .query()
            .map(parse_query)
            .unwrap_or_else(|| Value::Object(Map::new()));

        let bytes = axum::body::to_bytes(body, self.body_limit)
            .await
            .map_err(|_| ApiError::Response {
                code: StatusCode::PAYLOAD_TOO_LARGE,
                message: "Request body is too large.".to_string(),
                data: None,
            })?;
        let body = parse_body(&parts, &bytes)?;

        Ok(RequestContext {
            route: self.route.clone(),
            params,
            query,
            body,
            auth: parts.extensions.get::<Claims>().cloned(),
            user: parts.extensions.get::<CurrentUser>().map(|user| user.0.clone()),
            headers: parts.headers,
            model: self.model.clone(),
            context: Scratch::new(),
            data: None,
        })
    }
}

fn rename_params(names: &[String], captured: Vec<(String, String)>) -> HashMap<String, String> {
    if names.len() != captured.len() {
        return captured.into_iter().collect();
    }
    names
        .iter()
        .cloned()
        .zip(captured.into_iter().map(|(_, value)| value))
        .collect()
}

fn parse_body(parts: &Parts, bytes: &[u8]) -> Result<Value, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    let form = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |value| value.starts_with("application/x-www-form-urlencoded"));
    if form {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ApiError::bad_request("Request body is not valid UTF-8."))?;
        return Ok(parse_query(text));
    }

    serde_json::from_slice(bytes).map_err(|err| ApiError::bad_request(format!("Request body is not valid JSON: {}", err)))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "Request handler panicked.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::permission::PermissionGate;
    use crate::resource::route::Route;
    use crate::model::{MemoryModel, Schema};
    use axum::body::Body;
    use serde_json::json;

    fn adapter(route: Route, debug: bool) -> RequestAdapter {
        let model = Arc::new(MemoryModel::new("Example", Schema::new()));
        let pipeline = HookPipeline::new(PermissionGate::new(&route, true), &route);
        RequestAdapter::new(route.id().to_string(), model, pipeline).debug(debug)
    }

    async fn envelope(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn parses_query_and_body() {
        let route = Route::new("echo", "post", "/", |ctx: Arc<RequestContext>| async move {
            Ok(json!({ "query": ctx.query, "body": ctx.body }))
        })
        .unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/?filter[comments]=10")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"title":"hi"}"#))
            .unwrap();
        let (status, value) = envelope(adapter(route, false).handle(request).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            value,
            json!({
                "status": "success",
                "code": 200,
                "data": {
                    "query": { "filter": { "comments": "10" } },
                    "body": { "title": "hi" }
                }
            })
        );
    }

    #[test]
    fn captures_take_the_route_names() {
        let names = vec!["id".to_string()];
        let params = rename_params(&names, vec![("p1".into(), "abc".into())]);
        assert_eq!(params.get("id").map(String::as_str), Some("abc"));
        assert!(params.get("p1").is_none());

        let params = rename_params(&[], vec![("p1".into(), "abc".into())]);
        assert_eq!(params.get("p1").map(String::as_str), Some("abc"));
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let route = Route::new("echo", "post", "/", |_| async { Ok(Value::Null) }).unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, value) = envelope(adapter(route, false).handle(request).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["status"], json!("fail"));
    }

    #[tokio::test]
    async fn panics_become_internal_errors() {
        let route = Route::new("boom", "get", "/", |_| async {
            if true {
                panic!("handler exploded");
            }
            Ok(Value::Null)
        })
        .unwrap();

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, value) = envelope(adapter(route.clone(), false).handle(request).await).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(value["status"], json!("error"));
        assert!(value.get("stack").is_none());

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (_, value) = envelope(adapter(route, true).handle(request).await).await;
        assert_eq!(value["message"], json!("handler exploded"));
    }

    #[tokio::test]
    async fn redirect_codes_become_internal_errors() {
        let route = Route::new("moved", "get", "/", |_| async {
            Err::<Value, _>(anyhow::Error::new(ApiError::Response {
                code: StatusCode::FOUND,
                message: "moved".into(),
                data: None,
            }))
        })
        .unwrap();

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, value) = envelope(adapter(route, false).handle(request).await).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(value, json!({ "status": "error", "code": 500, "message": "moved" }));
    }

    #[tokio::test]
    async fn debug_exposes_stack() {
        let route = Route::new("boom", "get", "/", |_| async {
            Err::<Value, _>(anyhow::anyhow!("disk on fire").context("while reading"))
        })
        .unwrap();

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (_, quiet) = envelope(adapter(route.clone(), false).handle(request).await).await;
        assert!(quiet.get("stack").is_none());

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (_, loud) = envelope(adapter(route, true).handle(request).await).await;
        assert!(loud["stack"].as_str().unwrap().contains("disk on fire"));
    }
}
