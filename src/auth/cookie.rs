use std::time::Duration;

use axum::http::{header::SET_COOKIE, HeaderMap, HeaderValue};

use crate::error::ApiError;

pub const TOKEN_COOKIE: &str = "token";

fn attributes(secure: bool) -> &'static str {
    if secure {
        "HttpOnly; Secure; SameSite=None; Path=/"
    } else {
        "HttpOnly; SameSite=Lax; Path=/"
    }
}

pub fn session_cookie(token: &str, max_age: Duration, secure: bool) -> String {
    format!(
        "{TOKEN_COOKIE}={token}; {}; Max-Age={}",
        attributes(secure),
        max_age.as_secs()
    )
}

pub fn expired_cookie(secure: bool) -> String {
    format!(
        "{TOKEN_COOKIE}=; {}; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        attributes(secure)
    )
}

pub fn set_cookie_headers(cookie: String) -> Result<HeaderMap, ApiError> {
    let value = HeaderValue::from_str(&cookie)
        .map_err(|_| ApiError::Internal("build session cookie".into()))?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, value);
    Ok(headers)
}

/// Finds the session token in a `Cookie` request header.
pub fn token_from_cookie_header(header: &str) -> Option<&str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value)
        .filter(|v| !v.is_empty())
}
