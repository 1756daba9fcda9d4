pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod filter;
pub mod middleware;
pub mod model;
pub mod resource;

pub use app::{App, AppBuilder};
pub use error::{ApiError, ConfigError};
pub use resource::{CompiledResource, RequestContext, ResourceBuilder, ResourceOptions, Route};
