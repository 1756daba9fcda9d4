use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;

use super::context::RequestContext;
use super::permission::PermissionGate;
use super::route::{Handler, Hook, Route};
use crate::error::ApiError;
use crate::model::{ModelError, ValidationErrors};

/// Gate, before-hooks, handler and after-hooks of one route
#[derive(Clone)]
pub struct HookPipeline {
    gate: PermissionGate,
    befores: Vec<Hook>,
    handler: Handler,
    afters: Vec<Hook>,
}

impl HookPipeline {
    pub fn new(gate: PermissionGate, route: &Route) -> Self {
        Self {
            gate,
            befores: route.befores.clone(),
            handler: route.handler.clone(),
            afters: route.afters.clone(),
        }
    }

    pub async fn run(&self, ctx: Arc<RequestContext>) -> Result<Value, ApiError> {
        self.gate.check(ctx.clone()).await?;

        try_join_all(self.befores.iter().map(|hook| hook(ctx.clone())))
            .await
            .map_err(ApiError::from_error)?;

        let result = (self.handler)(ctx.clone()).await.map_err(classify)?;

        // The handler has already committed; an after-hook failure is reported, not undone
        if !self.afters.is_empty() {
            let after = Arc::new(ctx.with_data(result.clone()));
            try_join_all(self.afters.iter().map(|hook| hook(after.clone())))
                .await
                .map_err(ApiError::from_error)?;
        }

        Ok(result)
    }
}

/// Sort a handler failure into the error taxonomy by its concrete type
pub fn classify(err: anyhow::Error) -> ApiError {
    let err = match err.downcast::<ApiError>() {
        Ok(api) => return api,
        Err(err) => err,
    };
    let err = match err.downcast::<ValidationErrors>() {
        Ok(errors) => return errors.into(),
        Err(err) => err,
    };
    match err.downcast::<ModelError>() {
        Ok(model) => model.into(),
        Err(err) => ApiError::from_error(err),
    }
}
