//! Caller identity extraction.
//!
//! Authentication lives in the upstream web app; this service trusts the
//! `X-User-Id` header (or `user_id` cookie) it forwards and only validates
//! the identifier's shape.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::debug;

pub const HEADER_USER_ID_KEY: &str = "X-User-Id";
pub const COOKIE_USER_ID_KEY: &str = "user_id";

const MAX_USER_ID_LENGTH: usize = 64;

/// The authenticated caller, as asserted by the upstream proxy.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user_id: String,
}

pub enum IdentityExtractionError {
    AccessDenied,
}

impl IntoResponse for IdentityExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            IdentityExtractionError::AccessDenied => StatusCode::FORBIDDEN.into_response(),
        }
    }
}

fn is_valid_user_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= MAX_USER_ID_LENGTH
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn extract_from_headers(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(HEADER_USER_ID_KEY)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

async fn extract_from_cookies<S: Send + Sync>(parts: &mut Parts, state: &S) -> Option<String> {
    CookieJar::from_request_parts(parts, state)
        .await
        .ok()?
        .get(COOKIE_USER_ID_KEY)
        .map(Cookie::value)
        .map(|s| s.to_string())
}

impl<S> FromRequestParts<S> for UserIdentity
where
    S: Send + Sync,
{
    type Rejection = IdentityExtractionError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let candidate = match extract_from_headers(parts) {
            Some(candidate) => Some(candidate),
            None => extract_from_cookies(parts, state).await,
        };

        match candidate {
            Some(user_id) if is_valid_user_id(&user_id) => Ok(UserIdentity { user_id }),
            Some(user_id) => {
                debug!("Rejected malformed user id: {:?}", user_id);
                Err(IdentityExtractionError::AccessDenied)
            }
            None => {
                debug!("No user id in headers nor cookies");
                Err(IdentityExtractionError::AccessDenied)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_user_ids() {
        assert!(is_valid_user_id("user1"));
        assert!(is_valid_user_id("a"));
        assert!(is_valid_user_id("user-name_42"));
        assert!(is_valid_user_id(&"x".repeat(64)));
    }

    #[test]
    fn test_invalid_user_ids() {
        assert!(!is_valid_user_id(""));
        assert!(!is_valid_user_id(&"x".repeat(65)));
        assert!(!is_valid_user_id("user name"));
        assert!(!is_valid_user_id("user/../etc"));
        assert!(!is_valid_user_id("ユーザー"));
    }
}
