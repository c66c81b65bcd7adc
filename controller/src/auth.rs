use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use crate::{error::ApiError, SharedState};

/// Name of the cookie the web UI's session layer hands out.
pub const SESSION_COOKIE: &str = "skyshelf_session";

/// A caller that presented a known API token, either as a bearer token or as
/// the session cookie. Browsers' EventSource cannot set headers, hence the
/// cookie.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub name: String,
}

#[async_trait]
impl FromRequestParts<SharedState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, ApiError> {
        let token = bearer_token(&parts.headers)
            .or_else(|| session_cookie(&parts.headers))
            .ok_or(ApiError::Unauthenticated)?;

        state
            .api_tokens
            .get(token)
            .map(|name| AuthenticatedUser { name: name.clone() })
            .ok_or(ApiError::Unauthenticated)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
        .filter(|v| !v.is_empty())
}
