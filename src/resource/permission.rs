use std::future::{ready, Ready};
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;

use super::context::RequestContext;
use super::route::{Permission, Route};
use crate::error::ApiError;

pub const PERMISSION_DENIED: &str = "Permission denied to access route.";

/// OR-combined authorization check for one route
#[derive(Clone)]
pub struct PermissionGate {
    open: bool,
    permissions: Vec<Permission>,
}

impl PermissionGate {
    /// An open route, or a route without permissions on an unsecure
    /// resource, is always authorized.
    pub fn new(route: &Route, unsecure: bool) -> Self {
        Self {
            open: route.open || (unsecure && route.permissions.is_empty()),
            permissions: route.permissions.clone(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub async fn check(&self, ctx: Arc<RequestContext>) -> Result<(), ApiError> {
        if self.open {
            return Ok(());
        }

        let results = join_all(self.permissions.iter().map(|permission| permission(ctx.clone()))).await;
        if results.into_iter().any(|allowed| allowed) {
            Ok(())
        } else {
            tracing::debug!("Permission denied for route {}", ctx.route);
            Err(ApiError::permission_denied(PERMISSION_DENIED))
        }
    }
}

/// Anyone may access the route
pub fn is_anyone() -> impl Fn(Arc<RequestContext>) -> Ready<bool> + Clone + Send + Sync + 'static {
    |_| ready(true)
}

/// The request carried a valid token
pub fn is_tokenized() -> impl Fn(Arc<RequestContext>) -> Ready<bool> + Clone + Send + Sync + 'static {
    |ctx| ready(ctx.auth.as_ref().map_or(false, |claims| !claims.id.is_empty()))
}

/// The request token resolved to a user
pub fn is_user() -> impl Fn(Arc<RequestContext>) -> Ready<bool> + Clone + Send + Sync + 'static {
    |ctx| ready(ctx.user.is_some())
}

/// The body's `field` holds the id of the requesting user
pub fn is_owner(
    field: impl Into<String>,
) -> impl Fn(Arc<RequestContext>) -> Ready<bool> + Clone + Send + Sync + 'static {
    let field = field.into();
    move |ctx| {
        let owner = ctx.body.get(&field);
        let user_id = ctx.user.as_ref().and_then(|user| user.get("id"));
        ready(matches!((owner, user_id), (Some(owner), Some(id)) if owner == id && !id.is_null()))
    }
}
