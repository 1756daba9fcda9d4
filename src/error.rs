// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::api::format::{Envelope, Status};
use crate::model::{schema::ValidationErrors, ModelError};

/// Errors raised while describing or compiling resources. These never reach a
/// client; they surface to whoever is wiring the API together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Route {field} must be a non-empty string.")]
    EmptyField { field: &'static str },

    #[error("Route method \"{0}\" is not one of get, post, patch, put, delete.")]
    InvalidMethod(String),

    #[error("Route path \"{0}\" must begin with \"/\".")]
    InvalidPath(String),

    #[error("Route \"{0}\" is not registered on the resource.")]
    UnknownRoute(String),

    #[error("Routes \"{first}\" and \"{second}\" both handle {method} {path}.")]
    DuplicateRoute {
        first: String,
        second: String,
        method: String,
        path: String,
    },

    #[error("Routes \"{first}\" and \"{second}\" cannot share the path {path}.")]
    ConflictingRoute {
        first: String,
        second: String,
        path: String,
    },

    #[error("Resource name must contain at least one letter or digit.")]
    InvalidName,

    #[error("Resource address \"{0}\" must begin with \"/\".")]
    InvalidAddress(String),

    #[error("Status code {0} must be between 400 and 600.")]
    InvalidStatus(u16),

    #[error("A non-empty secret must be given to authenticate requests.")]
    MissingSecret,
}

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    // 400, carries the per-field error map
    #[error("{message}")]
    Validation {
        message: String,
        fields: Map<String, Value>,
    },

    // 400, uniqueness/constraint violations from the persistence layer
    #[error("{0}")]
    Persistence(String),

    // 401
    #[error("{0}")]
    PermissionDenied(String),

    // 404
    #[error("{0}")]
    NotFound(String),

    // Any other 4xx/5xx, built through `ApiError::respond`
    #[error("{message}")]
    Response {
        code: StatusCode,
        message: String,
        data: Option<Value>,
    },

    // 500
    #[error("{message}")]
    Internal {
        message: String,
        detail: Option<String>,
    },
}

impl ApiError {
    pub fn validation(message: impl Into<String>, fields: Map<String, Value>) -> Self {
        ApiError::Validation {
            message: message.into(),
            fields,
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        ApiError::Persistence(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        ApiError::PermissionDenied(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::Response {
            code: StatusCode::BAD_REQUEST,
            message: message.into(),
            data: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal {
            message: message.into(),
            detail: None,
        }
    }

    /// Build an error with an arbitrary status code. Only 4xx and 5xx codes
    /// have an envelope status, anything else is a wiring mistake.
    pub fn respond(code: u16, message: impl Into<String>) -> Result<Self, ConfigError> {
        let status = StatusCode::from_u16(code).map_err(|_| ConfigError::InvalidStatus(code))?;
        if !(status.is_client_error() || status.is_server_error()) {
            return Err(ConfigError::InvalidStatus(code));
        }
        Ok(ApiError::Response {
            code: status,
            message: message.into(),
            data: None,
        })
    }

    /// Attach field-level detail to a `Response` error; other variants keep
    /// their own data and are returned untouched.
    pub fn with_data(self, value: Value) -> Self {
        match self {
            ApiError::Response { code, message, .. } => ApiError::Response {
                code,
                message,
                data: Some(value),
            },
            other => other,
        }
    }

    /// Convert an arbitrary failure without classifying its shape: an
    /// `ApiError` passes through, everything else becomes `Internal`.
    pub fn from_error(err: anyhow::Error) -> Self {
        match err.downcast::<ApiError>() {
            Ok(api) => api,
            Err(other) => ApiError::Internal {
                message: other.to_string(),
                detail: Some(format!("{:?}", other)),
            },
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Persistence(_) => StatusCode::BAD_REQUEST,
            ApiError::PermissionDenied(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Response { code, .. } => *code,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Envelope status for this error ("fail" for 4xx, "error" for 5xx).
    /// A code outside both ranges is reported as "error".
    pub fn status(&self) -> Status {
        Status::for_failure(self.status_code().as_u16()).unwrap_or(Status::Error)
    }

    fn data(&self) -> Option<Value> {
        match self {
            ApiError::Validation { fields, .. } => Some(Value::Object(fields.clone())),
            ApiError::Response { data, .. } => data.clone(),
            _ => None,
        }
    }

    /// Format this error as a response envelope. `debug` exposes the error
    /// chain of internal failures under `stack`.
    pub fn to_envelope(&self, debug: bool) -> Envelope {
        let code = self.status_code().as_u16();
        let mut envelope = Envelope::failure(code, self.to_string(), self.data()).unwrap_or_else(|err| {
            tracing::error!("Cannot report \"{}\" as a failure: {}", self, err);
            Envelope::internal(self.to_string())
        });
        if debug {
            if let ApiError::Internal { detail, .. } = self {
                envelope.stack = detail.clone();
            }
        }
        envelope
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Validation(errors) => errors.into(),
            ModelError::Duplicate { .. } | ModelError::Cast { .. } => {
                ApiError::persistence(err.to_string())
            }
            ModelError::NotFound(_) => ApiError::not_found(err.to_string()),
            ModelError::Store(msg) => {
                tracing::error!("Model store error: {}", msg);
                ApiError::internal(msg)
            }
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::validation(errors.message().to_string(), errors.to_fields())
    }
}

impl From<crate::filter::FilterError> for ApiError {
    fn from(err: crate::filter::FilterError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        self.to_envelope(false).into_response()
    }
}
