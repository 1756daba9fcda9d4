use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::auth::{decode_token, Claims};
use crate::error::ApiError;
use crate::model::Model;

/// The user document loaded for the request token
#[derive(Clone, Debug)]
pub struct CurrentUser(pub Value);

/// Shared by the auth populators
#[derive(Clone)]
pub struct AuthState {
    pub secret: Arc<str>,
    pub users: Option<Arc<dyn Model>>,
}

/// Decode the request token, if any, into `Claims` on the request.
/// Requests without a token pass through untouched.
pub async fn populate_auth(State(state): State<AuthState>, mut request: Request, next: Next) -> Response {
    let token = match extract_token(request.headers()) {
        Ok(Some(token)) => token,
        Ok(None) => return next.run(request).await,
        Err(msg) => return ApiError::permission_denied(msg).into_response(),
    };

    match decode_token(&token, &state.secret) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!("Rejected request token: {}", err);
            ApiError::permission_denied("Request token is not valid.").into_response()
        }
    }
}

/// Load the user named by the token into `CurrentUser`
pub async fn populate_user(State(state): State<AuthState>, mut request: Request, next: Next) -> Response {
    let user_id = request
        .extensions()
        .get::<Claims>()
        .and_then(|claims| claims.user_id.clone());

    if let (Some(users), Some(user_id)) = (state.users.as_ref(), user_id) {
        match users.find_by_id(&user_id, None).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(CurrentUser(Value::Object(user)));
            }
            Ok(None) => tracing::debug!("Token user {} no longer exists", user_id),
            Err(err) => return ApiError::from(err).into_response(),
        }
    }

    next.run(request).await
}

/// `Authorization: <token>` or `Authorization: Bearer <token>`
fn extract_token(headers: &HeaderMap) -> Result<Option<String>, &'static str> {
    let Some(header) = headers.get("authorization") else {
        return Ok(None);
    };

    let value = header
        .to_str()
        .map_err(|_| "Invalid Authorization header format.")?
        .trim();
    let token = value.strip_prefix("Bearer").map_or(value, str::trim);
    if token.is_empty() {
        return Err("Empty authorization token.");
    }
    Ok(Some(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", value.parse().unwrap());
        headers
    }

    #[test]
    fn token_formats() {
        assert_eq!(extract_token(&HeaderMap::new()), Ok(None));
        assert_eq!(extract_token(&headers("abc.def")), Ok(Some("abc.def".into())));
        assert_eq!(extract_token(&headers("Bearer abc.def")), Ok(Some("abc.def".into())));
        assert!(extract_token(&headers("Bearer ")).is_err());
    }
}
