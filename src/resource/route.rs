use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::MethodFilter;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use super::context::RequestContext;
use crate::error::ConfigError;

pub type Handler = Arc<dyn Fn(Arc<RequestContext>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;
pub type Hook = Arc<dyn Fn(Arc<RequestContext>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
pub type Permission = Arc<dyn Fn(Arc<RequestContext>) -> BoxFuture<'static, bool> + Send + Sync>;
pub type Middleware = Arc<dyn Fn(Request, Next) -> BoxFuture<'static, Response> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Patch => "patch",
            Method::Put => "put",
            Method::Delete => "delete",
        }
    }

    pub fn filter(&self) -> MethodFilter {
        match self {
            Method::Get => MethodFilter::GET,
            Method::Post => MethodFilter::POST,
            Method::Patch => MethodFilter::PATCH,
            Method::Put => MethodFilter::PUT,
            Method::Delete => MethodFilter::DELETE,
        }
    }
}

impl FromStr for Method {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" => Err(ConfigError::EmptyField { field: "method" }),
            "get" => Ok(Method::Get),
            "post" => Ok(Method::Post),
            "patch" => Ok(Method::Patch),
            "put" => Ok(Method::Put),
            "delete" => Ok(Method::Delete),
            _ => Err(ConfigError::InvalidMethod(s.to_string())),
        }
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

pub(crate) fn boxed_handler<F, Fut>(handler: F) -> Handler
where
    F: Fn(Arc<RequestContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |ctx: Arc<RequestContext>| handler(ctx).boxed())
}

pub(crate) fn boxed_hook<F, Fut>(hook: F) -> Hook
where
    F: Fn(Arc<RequestContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx: Arc<RequestContext>| hook(ctx).boxed())
}

pub(crate) fn boxed_permission<F, Fut>(permission: F) -> Permission
where
    F: Fn(Arc<RequestContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Arc::new(move |ctx: Arc<RequestContext>| permission(ctx).boxed())
}

pub(crate) fn boxed_middleware<F, Fut>(middleware: F) -> Middleware
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |request: Request, next: Next| middleware(request, next).boxed())
}

/// One endpoint: identity, method, path, handler, and the lists of
/// middleware, permissions and hooks wrapped around it.
///
/// ```
/// use rest_resource::resource::Route;
/// use serde_json::json;
///
/// let route = Route::new("smacktalk", "GET", "/smacktalk", |_ctx| async {
///     Ok(json!({ "attach": "hello" }))
/// })
/// .unwrap()
/// .open();
/// assert_eq!(route.path(), "/smacktalk");
/// assert!(route.is_open());
/// ```
#[derive(Clone)]
pub struct Route {
    pub(crate) id: String,
    pub(crate) path: String,
    pub(crate) method: Method,
    pub(crate) handler: Handler,
    pub(crate) open: bool,
    pub(crate) middlewares: Vec<Middleware>,
    pub(crate) permissions: Vec<Permission>,
    pub(crate) befores: Vec<Hook>,
    pub(crate) afters: Vec<Hook>,
}

impl Route {
    pub fn new<F, Fut>(
        id: impl Into<String>,
        method: impl AsRef<str>,
        path: impl Into<String>,
        handler: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(Arc<RequestContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::from_handler(id, method, path, boxed_handler(handler))
    }

    pub fn from_handler(
        id: impl Into<String>,
        method: impl AsRef<str>,
        path: impl Into<String>,
        handler: Handler,
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        let path = path.into();
        if id.trim().is_empty() {
            return Err(ConfigError::EmptyField { field: "id" });
        }
        if path.trim().is_empty() {
            return Err(ConfigError::EmptyField { field: "path" });
        }
        if !path.starts_with('/') {
            return Err(ConfigError::InvalidPath(path));
        }
        let method = method.as_ref().parse()?;

        Ok(Self {
            id,
            path,
            method,
            handler,
            open: false,
            middlewares: Vec::new(),
            permissions: Vec::new(),
            befores: Vec::new(),
            afters: Vec::new(),
        })
    }

    /// Skip the permission gate for this route
    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }

    pub fn middleware<F, Fut>(mut self, middleware: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.middlewares.push(boxed_middleware(middleware));
        self
    }

    pub fn permission<F, Fut>(mut self, permission: F) -> Self
    where
        F: Fn(Arc<RequestContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.permissions.push(boxed_permission(permission));
        self
    }

    pub fn before<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<RequestContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.befores.push(boxed_hook(hook));
        self
    }

    pub fn after<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<RequestContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.afters.push(boxed_hook(hook));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn permission_count(&self) -> usize {
        self.permissions.len()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("open", &self.open)
            .field("middlewares", &self.middlewares.len())
            .field("permissions", &self.permissions.len())
            .field("befores", &self.befores.len())
            .field("afters", &self.afters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn ok(_ctx: Arc<RequestContext>) -> anyhow::Result<Value> {
        Ok(json!(null))
    }

    #[test]
    fn methods_are_case_insensitive() {
        assert_eq!("GET".parse::<Method>(), Ok(Method::Get));
        assert_eq!(" Delete ".parse::<Method>(), Ok(Method::Delete));
        assert_eq!(
            "options".parse::<Method>(),
            Err(ConfigError::InvalidMethod("options".into()))
        );
        assert_eq!(Method::Patch.to_string(), "PATCH");
    }

    #[test]
    fn construction_names_the_bad_field() {
        assert_eq!(
            Route::new("", "get", "/", ok).unwrap_err(),
            ConfigError::EmptyField { field: "id" }
        );
        assert_eq!(
            Route::new("find", "get", "", ok).unwrap_err(),
            ConfigError::EmptyField { field: "path" }
        );
        assert_eq!(
            Route::new("find", "", "/", ok).unwrap_err(),
            ConfigError::EmptyField { field: "method" }
        );
        assert_eq!(
            Route::new("find", "get", "count", ok).unwrap_err(),
            ConfigError::InvalidPath("count".into())
        );
    }

    #[test]
    fn attachments_accumulate() {
        let route = Route::new("find", "get", "/", ok)
            .unwrap()
            .permission(|_| async { false })
            .permission(|_| async { true })
            .before(|_| async { Ok(()) })
            .after(|_| async { Ok(()) })
            .after(|_| async { Ok(()) });
        assert_eq!(route.permissions.len(), 2);
        assert_eq!(route.befores.len(), 1);
        assert_eq!(route.afters.len(), 2);
        assert!(!route.is_open());
    }
}
