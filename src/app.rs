//! Attach compiled resources to one axum router.

use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{AppConfig, SecurityConfig};
use crate::error::{ApiError, ConfigError};
use crate::middleware::{populate_auth, populate_user, ApiResponse, AuthState};
use crate::model::Model;
use crate::resource::{check_duplicates, route_table, CompiledResource};

pub const UNKNOWN_ADDRESS: &str = "Request address does not exist on the api.";

pub struct App;

impl App {
    /// Start an app that verifies tokens with `secret`
    pub fn builder(secret: impl Into<String>) -> AppBuilder {
        AppBuilder {
            secret: secret.into(),
            resources: Vec::new(),
            users: None,
            environment: "development".to_string(),
            cors: Some(CorsLayer::permissive()),
            request_logging: true,
        }
    }
}

pub struct AppBuilder {
    secret: String,
    resources: Vec<CompiledResource>,
    users: Option<Arc<dyn Model>>,
    environment: String,
    cors: Option<CorsLayer>,
    request_logging: bool,
}

impl AppBuilder {
    pub fn resource(mut self, resource: CompiledResource) -> Self {
        self.resources.push(resource);
        self
    }

    /// Model used to load `user` from the token's `userId`
    pub fn user_model(mut self, users: Arc<dyn Model>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn cors(mut self, cors: Option<CorsLayer>) -> Self {
        self.cors = cors;
        self
    }

    /// Trace every request with `tower-http`
    pub fn request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }

    /// Environment name, CORS policy and request logging from configuration
    pub fn config(self, config: &AppConfig) -> Self {
        let cors = cors_layer(&config.security);
        self.environment(config.environment.to_string())
            .cors(cors)
            .request_logging(config.api.enable_request_logging)
    }

    pub fn build(self) -> Result<Router, ConfigError> {
        if self.secret.trim().is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        check_duplicates(self.resources.iter().flat_map(|r| r.routes()))?;
        if let Some(route) = self
            .resources
            .iter()
            .flat_map(|r| r.routes())
            .find(|route| route.registered_path() == "/")
        {
            return Err(ConfigError::ConflictingRoute {
                first: "health".to_string(),
                second: route.id().to_string(),
                path: "/".to_string(),
            });
        }

        for resource in &self.resources {
            tracing::info!("Attaching resource {} at {}", resource.name(), resource.address());
        }

        let state = AuthState {
            secret: Arc::from(self.secret.as_str()),
            users: self.users,
        };

        let mut router = Router::new()
            .route("/", get(health).fallback(unknown_address))
            .with_state(self.environment)
            .merge(route_table(self.resources.iter().flat_map(|r| r.routes())))
            .fallback(unknown_address)
            .layer(from_fn_with_state(state.clone(), populate_user))
            .layer(from_fn_with_state(state, populate_auth));

        if let Some(cors) = self.cors {
            router = router.layer(cors);
        }
        if self.request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }
        Ok(router)
    }
}

async fn health(State(environment): State<String>) -> ApiResponse<Value> {
    ApiResponse::success(json!({ "environment": environment }))
}

pub(crate) async fn unknown_address() -> ApiError {
    ApiError::not_found(UNKNOWN_ADDRESS)
}

/// `*` allows any origin; otherwise only the listed ones
pub fn cors_layer(security: &SecurityConfig) -> Option<CorsLayer> {
    if !security.enable_cors {
        return None;
    }
    if security.cors_origins.iter().any(|origin| origin == "*") {
        return Some(CorsLayer::permissive());
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{generate_token, Claims};
    use crate::model::{Field, MemoryModel, Schema};
    use crate::resource::{is_user, ResourceBuilder, ResourceOptions};
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    async fn send(router: &Router, request: Request) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn examples() -> CompiledResource {
        let model = Arc::new(MemoryModel::new(
            "Example",
            Schema::new().field("title", Field::string().required()),
        ));
        let mut builder = ResourceBuilder::new("example", model).unwrap();
        builder.add_permission("find", is_user()).unwrap();
        builder.compile().unwrap()
    }

    #[test]
    fn requires_a_secret() {
        assert_eq!(App::builder("  ").build().err(), Some(ConfigError::MissingSecret));
    }

    #[test]
    fn rejects_overlapping_resources() {
        let err = App::builder("shh")
            .resource(examples())
            .resource(examples())
            .build()
            .err();
        assert!(matches!(err, Some(ConfigError::DuplicateRoute { .. })));
    }

    #[test]
    fn config_controls_request_logging() {
        use crate::config::Environment;

        let production = AppConfig::for_environment(Environment::Production);
        let builder = App::builder("shh").config(&production);
        assert!(!builder.request_logging);
        assert_eq!(builder.environment, "production");

        let development = AppConfig::for_environment(Environment::Development);
        assert!(App::builder("shh").config(&development).request_logging);
    }

    #[test]
    fn root_address_conflicts_with_health() {
        let model = Arc::new(MemoryModel::new("Example", Schema::new()));
        let options = ResourceOptions {
            address: Some("/".into()),
            ..ResourceOptions::default()
        };
        let resource = ResourceBuilder::with_options("example", model, options)
            .unwrap()
            .compile()
            .unwrap();
        let err = App::builder("shh").resource(resource).build().err();
        assert!(
            matches!(err, Some(ConfigError::ConflictingRoute { ref first, ref path, .. }) if first == "health" && path == "/"),
            "{:?}",
            err
        );
    }

    #[tokio::test]
    async fn unregistered_method_on_root_gets_an_envelope() {
        let router = App::builder("shh").build().unwrap();
        let request = Request::builder().method("DELETE").uri("/").body(Body::empty()).unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "status": "fail", "code": 404, "message": UNKNOWN_ADDRESS }));
    }

    #[tokio::test]
    async fn health_and_fallback() {
        let router = App::builder("shh").environment("staging").build().unwrap();

        let (status, body) = send(&router, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "status": "success", "code": 200, "data": { "environment": "staging" } })
        );

        let (status, body) = send(&router, get("/nowhere")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "status": "fail", "code": 404, "message": UNKNOWN_ADDRESS }));
    }

    #[tokio::test]
    async fn token_and_user_reach_permissions() {
        let users = Arc::new(MemoryModel::new("User", Schema::new().field("name", Field::string())));
        let user = users.create(json!({ "name": "ada" })).await.unwrap();
        let user_id = user["id"].as_str().unwrap().to_string();

        let router = App::builder("shh")
            .resource(examples())
            .user_model(users)
            .build()
            .unwrap();

        let (status, _) = send(&router, get("/examples")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let bad = Request::builder()
            .uri("/examples")
            .header("authorization", "Bearer not-a-token")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&router, bad).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], json!("fail"));

        let token = generate_token(&Claims::new("t1", Some(user_id), 1), "shh").unwrap();
        let good = Request::builder()
            .uri("/examples")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&router, good).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"], json!({ "examples": [] }));
    }
}
