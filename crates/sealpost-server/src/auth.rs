//! Function-key gate for the encrypt endpoint.
//!
//! The deployment-level key is accepted in the `x-functions-key` header or
//! the `code` query parameter. Comparison is constant-time. An absent or
//! empty configured key disables the gate, for development deployments.

use axum::http::HeaderMap;
use subtle::ConstantTimeEq as _;

use crate::error::ApiError;

/// Header carrying the function key.
pub const FUNCTION_KEY_HEADER: &str = "x-functions-key";

/// Authorize a request against the configured function key.
pub fn authorize(
    headers: &HeaderMap,
    code_param: Option<&str>,
    expected: Option<&str>,
) -> Result<(), ApiError> {
    let expected = match expected {
        Some(value) if !value.trim().is_empty() => value.trim(),
        _ => return Ok(()),
    };

    if let Some(value) = headers.get(FUNCTION_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        if constant_time_eq(value, expected) {
            return Ok(());
        }
    }
    if let Some(code) = code_param {
        if constant_time_eq(code, expected) {
            return Ok(());
        }
    }
    Err(ApiError::Unauthorized)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
