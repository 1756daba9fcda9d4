use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// Envelope status, derived from the HTTP code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Fail,
    Error,
}

impl Status {
    /// Status for a failure code: 4xx is "fail", 5xx is "error".
    pub fn for_failure(code: u16) -> Result<Self, ConfigError> {
        match code {
            400..=499 => Ok(Status::Fail),
            500..=599 => Ok(Status::Error),
            _ => Err(ConfigError::InvalidStatus(code)),
        }
    }
}

/// The uniform response wrapper seen by API clients:
/// `{status, code, data}` on success, `{status, code, message, data?}` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: Status,
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl Envelope {
    /// 200 success envelope. `data` is always present, even when null.
    pub fn success(data: Value) -> Self {
        Self {
            status: Status::Success,
            code: StatusCode::OK.as_u16(),
            message: None,
            data: Some(data),
            stack: None,
        }
    }

    /// Success envelope with another 2xx code
    pub fn success_with(code: u16, data: Value) -> Result<Self, ConfigError> {
        if !(200..300).contains(&code) {
            return Err(ConfigError::InvalidStatus(code));
        }
        Ok(Self {
            code,
            ..Self::success(data)
        })
    }

    pub fn failure(code: u16, message: impl Into<String>, data: Option<Value>) -> Result<Self, ConfigError> {
        Ok(Self {
            status: Status::for_failure(code)?,
            code,
            message: Some(message.into()),
            data,
            stack: None,
        })
    }

    /// 500 envelope for failures that cannot be reported with their own code
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            message: Some(message.into()),
            data: None,
            stack: None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}
