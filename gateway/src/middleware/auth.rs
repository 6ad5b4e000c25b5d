//! Client authentication from the `Authorization` header.
//!
//! Credentials use the `Token <value>` scheme, matched case-insensitively.
//! A request with no credential at all proceeds as anonymous; a malformed
//! or unknown credential is rejected. Token values map to client
//! identifiers configured as comma-separated `client-id:token-value`
//! entries.

use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use std::collections::HashMap;

/// Token value to client identifier.
pub type AuthMap = HashMap<String, String>;

const SCHEME: &str = "token";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid authorization header format")]
    InvalidHeaderFormat,
    #[error("invalid auth token format")]
    InvalidTokenFormat,
    #[error("invalid auth token")]
    UnknownToken,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthConfigError {
    #[error("invalid token format {entry:?}, token must be in \"client-id:token-value\" format")]
    InvalidEntry { entry: String },
    #[error("auth token {entry:?} has empty client ID")]
    EmptyClientId { entry: String },
    #[error("auth token value in {entry:?} cannot be empty or contain spaces")]
    InvalidTokenValue { entry: String },
    #[error("duplicate auth token value {token:?}")]
    DuplicateToken { token: String },
}

/// Parse `client-id:token-value` entries from a comma-separated list.
pub fn parse_auth_map(input: &str) -> Result<AuthMap, AuthConfigError> {
    let mut map = AuthMap::new();
    for entry in input.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((client_id, token)) = entry.split_once(':') else {
            return Err(AuthConfigError::InvalidEntry {
                entry: entry.to_string(),
            });
        };
        let client_id = client_id.trim();
        let token = token.trim();
        if client_id.is_empty() {
            return Err(AuthConfigError::EmptyClientId {
                entry: entry.to_string(),
            });
        }
        if token.is_empty() || token.contains(char::is_whitespace) {
            return Err(AuthConfigError::InvalidTokenValue {
                entry: entry.to_string(),
            });
        }
        if map.insert(token.to_string(), client_id.to_string()).is_some() {
            return Err(AuthConfigError::DuplicateToken {
                token: token.to_string(),
            });
        }
    }
    Ok(map)
}

/// Resolve the client identity for a request. Returns the empty identity
/// for requests with no credential.
pub fn authenticate(headers: &HeaderMap, auth: &AuthMap) -> Result<String, AuthError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(String::new());
    };
    let value = value.to_str().map_err(|_| AuthError::InvalidHeaderFormat)?;
    if value.trim().is_empty() {
        return Ok(String::new());
    }

    let mut fields = value.split_whitespace();
    let scheme = fields.next().unwrap_or("");
    if !scheme.eq_ignore_ascii_case(SCHEME) {
        return Err(AuthError::InvalidHeaderFormat);
    }
    let token = fields.next().ok_or(AuthError::InvalidTokenFormat)?;
    if fields.next().is_some() {
        return Err(AuthError::InvalidTokenFormat);
    }

    match auth.get(token) {
        Some(client_id) => Ok(client_id.clone()),
        None => Err(AuthError::UnknownToken),
    }
}

pub fn unauthorized_response() -> Response<Full<Bytes>> {
    let mut res = Response::new(Full::new(Bytes::from_static(
        br#"{"error": "unauthorized"}"#,
    )));
    *res.status_mut() = StatusCode::FORBIDDEN;
    res.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    res
}
