//! Caller identity from the fronting gateway.
//!
//! The gateway authenticates the user and forwards the name in
//! `X-Authenticated-User`. Requests without it are rejected.

use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::UserContext;

pub const USER_HEADER: &str = "X-Authenticated-User";

fn user_from_headers(headers: &HeaderMap) -> Option<UserContext> {
    let username = headers.get(USER_HEADER)?.to_str().ok()?.trim();
    if username.is_empty() {
        return None;
    }
    Some(UserContext {
        username: username.to_string(),
    })
}

/// Require an authenticated user; injects `UserContext` for handlers.
pub async fn require_user(mut req: Request<axum::body::Body>, next: Next) -> Response {
    let Some(user) = user_from_headers(req.headers()) else {
        return ApiError::Unauthorized.into_response();
    };

    tracing::debug!(
        user = %user.username,
        method = %req.method(),
        path = req.uri().path(),
        "Authenticated request"
    );
    req.extensions_mut().insert(user);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_value_is_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_static("  dr.lee "));
        assert_eq!(user_from_headers(&headers).unwrap().username, "dr.lee");
    }

    #[test]
    fn blank_or_missing_header_rejected() {
        let mut headers = HeaderMap::new();
        assert!(user_from_headers(&headers).is_none());
        headers.insert(USER_HEADER, HeaderValue::from_static("   "));
        assert!(user_from_headers(&headers).is_none());
    }
}
