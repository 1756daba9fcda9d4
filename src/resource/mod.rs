//! Declarative REST resources.
//!
//! A [`ResourceBuilder`] starts out with the default CRUD routes for its
//! model and accepts extra endpoints, middleware, permissions and hooks by
//! route id. [`ResourceBuilder::compile`] consumes the builder and produces a
//! [`CompiledResource`]: an ordered dispatch table that can be turned into an
//! axum [`Router`]. Mutation is only possible before compiling:
//!
//! ```compile_fail
//! # use std::sync::Arc;
//! # use rest_resource::model::{MemoryModel, Schema};
//! # use rest_resource::resource::ResourceBuilder;
//! let builder = ResourceBuilder::new("example", Arc::new(MemoryModel::new("Example", Schema::new()))).unwrap();
//! let compiled = builder.compile().unwrap();
//! let again = builder.compile();
//! ```
//!
//! ```compile_fail
//! # use std::sync::Arc;
//! # use rest_resource::model::{MemoryModel, Schema};
//! # use rest_resource::resource::ResourceBuilder;
//! let builder = ResourceBuilder::new("example", Arc::new(MemoryModel::new("Example", Schema::new()))).unwrap();
//! let mut compiled = builder.compile().unwrap();
//! compiled.add_pre_hook("find", |_ctx| async { Ok(()) });
//! ```

pub mod adapter;
pub mod context;
pub mod defaults;
pub mod hooks;
pub mod naming;
pub mod order;
pub mod permission;
pub mod route;

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::{from_fn, Next};
use axum::response::Response;
use axum::routing::{on, MethodRouter};
use axum::Router;

use crate::app::unknown_address;
use crate::error::ConfigError;
use crate::model::Model;

pub use adapter::{Dispatch, RequestAdapter};
pub use context::{RequestContext, Scratch};
pub use hooks::HookPipeline;
pub use permission::{is_anyone, is_owner, is_tokenized, is_user, PermissionGate};
pub use route::{Handler, Hook, Method, Middleware, Permission, Route};

/// Construction options for a resource
#[derive(Debug, Clone)]
pub struct ResourceOptions {
    /// Mount point, defaults to `/` + the camel-cased plural of the name
    pub address: Option<String>,
    /// Route ids left out of the compiled table
    pub disable: Vec<String>,
    /// Routes without permissions are open instead of closed
    pub unsecure: bool,
    /// Report internal error detail under `stack`
    pub debug: bool,
    pub body_limit: usize,
}

impl Default for ResourceOptions {
    fn default() -> Self {
        Self {
            address: None,
            disable: Vec::new(),
            unsecure: false,
            debug: false,
            body_limit: 2 * 1024 * 1024,
        }
    }
}

/// A resource while its routes are still being described
pub struct ResourceBuilder {
    name: String,
    address: String,
    model: Arc<dyn Model>,
    routes: Vec<Route>,
    disabled: BTreeSet<String>,
    unsecure: bool,
    debug: bool,
    body_limit: usize,
}

impl ResourceBuilder {
    pub fn new(name: &str, model: Arc<dyn Model>) -> Result<Self, ConfigError> {
        Self::with_options(name, model, ResourceOptions::default())
    }

    pub fn with_options(
        name: &str,
        model: Arc<dyn Model>,
        options: ResourceOptions,
    ) -> Result<Self, ConfigError> {
        let resource_name = naming::camel(&naming::singular(name));
        if resource_name.is_empty() {
            return Err(ConfigError::InvalidName);
        }
        let address = match options.address {
            Some(address) if address.starts_with('/') => address,
            Some(address) => return Err(ConfigError::InvalidAddress(address)),
            None => format!("/{}", naming::camel(&naming::plural(name))),
        };

        Ok(Self {
            routes: defaults::routes(&resource_name)?,
            name: resource_name,
            address,
            model,
            disabled: options.disable.into_iter().collect(),
            unsecure: options.unsecure,
            debug: options.debug,
            body_limit: options.body_limit,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn route(&self, id: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.id == id)
    }

    pub fn route_ids(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(Route::id)
    }

    fn route_mut(&mut self, id: &str) -> Result<&mut Route, ConfigError> {
        self.routes
            .iter_mut()
            .find(|route| route.id == id)
            .ok_or_else(|| ConfigError::UnknownRoute(id.to_string()))
    }

    /// Add a route, or replace the route with the same id in place
    pub fn add_endpoint(&mut self, route: Route) -> &mut Self {
        match self.routes.iter_mut().find(|existing| existing.id == route.id) {
            Some(existing) => *existing = route,
            None => self.routes.push(route),
        }
        self
    }

    pub fn add_middleware<F, Fut>(&mut self, id: &str, middleware: F) -> Result<&mut Self, ConfigError>
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.route_mut(id)?.middlewares.push(route::boxed_middleware(middleware));
        Ok(self)
    }

    pub fn add_permission<F, Fut>(&mut self, id: &str, permission: F) -> Result<&mut Self, ConfigError>
    where
        F: Fn(Arc<RequestContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.route_mut(id)?.permissions.push(route::boxed_permission(permission));
        Ok(self)
    }

    pub fn add_pre_hook<F, Fut>(&mut self, id: &str, hook: F) -> Result<&mut Self, ConfigError>
    where
        F: Fn(Arc<RequestContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.route_mut(id)?.befores.push(route::boxed_hook(hook));
        Ok(self)
    }

    pub fn add_post_hook<F, Fut>(&mut self, id: &str, hook: F) -> Result<&mut Self, ConfigError>
    where
        F: Fn(Arc<RequestContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.route_mut(id)?.afters.push(route::boxed_hook(hook));
        Ok(self)
    }

    /// Leave a route out of the compiled table
    pub fn disable(&mut self, id: impl Into<String>) -> &mut Self {
        self.disabled.insert(id.into());
        self
    }

    pub fn compile(self) -> Result<CompiledResource, ConfigError> {
        for id in &self.disabled {
            if !self.routes.iter().any(|route| &route.id == id) {
                tracing::warn!("Resource {} cannot disable unknown route {}", self.name, id);
            }
        }

        let mut routes: Vec<Route> = self
            .routes
            .into_iter()
            .filter(|route| !self.disabled.contains(&route.id))
            .collect();
        order::sort_routes(&mut routes);

        let compiled: Vec<CompiledRoute> = routes
            .iter()
            .map(|route| {
                let mounted = mount(&self.address, &route.path);
                let gate = PermissionGate::new(route, self.unsecure);
                let pipeline = HookPipeline::new(gate, route);
                let dispatch = RequestAdapter::new(route.id.clone(), self.model.clone(), pipeline)
                    .debug(self.debug)
                    .body_limit(self.body_limit)
                    .param_names(order::param_names(&mounted))
                    .into_dispatch();
                CompiledRoute {
                    id: route.id.clone(),
                    method: route.method,
                    path: route.path.clone(),
                    registered: order::canonical_path(&mounted),
                    mounted,
                    middlewares: route.middlewares.clone(),
                    dispatch,
                }
            })
            .collect();
        check_duplicates(&compiled)?;

        tracing::info!(
            "Compiled resource {} at {} with {} routes",
            self.name,
            self.address,
            compiled.len()
        );
        for route in &compiled {
            tracing::debug!("  {} {} ({})", route.method, route.mounted, route.id);
        }

        Ok(CompiledResource {
            name: self.name,
            address: self.address,
            routes: compiled,
        })
    }
}

fn mount(address: &str, path: &str) -> String {
    let base = address.trim_end_matches('/');
    match (base.is_empty(), path == "/") {
        (true, _) => path.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{}{}", base, path),
    }
}

/// One entry of the dispatch table
#[derive(Clone)]
pub struct CompiledRoute {
    id: String,
    method: Method,
    path: String,
    mounted: String,
    registered: String,
    middlewares: Vec<Middleware>,
    dispatch: Dispatch,
}

impl CompiledRoute {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Path relative to the resource address
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mounted_path(&self) -> &str {
        &self.mounted
    }

    /// Path handed to the router, with captures renamed by position
    pub fn registered_path(&self) -> &str {
        &self.registered
    }

    pub fn middlewares(&self) -> &[Middleware] {
        &self.middlewares
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    fn method_router(&self) -> MethodRouter {
        let dispatch = self.dispatch.clone();
        let mut router = on(self.method.filter(), move |request: Request| {
            let dispatch = dispatch.clone();
            async move { dispatch(request).await }
        });
        // Layers wrap outward, so the first registered middleware goes on last
        for middleware in self.middlewares.iter().rev() {
            let middleware = middleware.clone();
            router = router.route_layer(from_fn(move |request: Request, next: Next| {
                let middleware = middleware.clone();
                async move { middleware(request, next).await }
            }));
        }
        router
    }
}

impl std::fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRoute")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("path", &self.mounted)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

/// A resource whose routes are fixed and ordered
#[derive(Clone, Debug)]
pub struct CompiledResource {
    name: String,
    address: String,
    routes: Vec<CompiledRoute>,
}

impl CompiledResource {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// The dispatch table in match order
    pub fn routes(&self) -> &[CompiledRoute] {
        &self.routes
    }

    pub fn router(&self) -> Router {
        route_table(&self.routes)
    }
}

/// Reject two routes answering the same method on paths of the same shape.
/// `/:exampleId` and `/:id` count as the same path.
pub(crate) fn check_duplicates<'a>(
    routes: impl IntoIterator<Item = &'a CompiledRoute>,
) -> Result<(), ConfigError> {
    let mut seen: Vec<&CompiledRoute> = Vec::new();
    for route in routes {
        if let Some(first) = seen
            .iter()
            .find(|other| other.method == route.method && other.registered == route.registered)
        {
            return Err(ConfigError::DuplicateRoute {
                first: first.id.clone(),
                second: route.id.clone(),
                method: route.method.to_string(),
                path: route.mounted.clone(),
            });
        }
        seen.push(route);
    }
    Ok(())
}

/// Register routes on a router in table order, one method router per path.
/// A method nobody registered on a known path gets the unknown address
/// envelope instead of an empty 405.
pub(crate) fn route_table<'a>(routes: impl IntoIterator<Item = &'a CompiledRoute>) -> Router {
    let mut grouped: Vec<(String, MethodRouter)> = Vec::new();
    for route in routes {
        let method_router = route.method_router();
        match grouped.iter_mut().find(|(path, _)| *path == route.registered) {
            Some((_, existing)) => {
                let merged = std::mem::replace(existing, MethodRouter::new()).merge(method_router);
                *existing = merged;
            }
            None => grouped.push((route.registered.clone(), method_router)),
        }
    }

    grouped.into_iter().fold(Router::new(), |router, (path, method_router)| {
        router.route(&path, method_router.fallback(unknown_address))
    })
}
