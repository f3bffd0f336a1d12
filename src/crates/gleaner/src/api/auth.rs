//! Admin API key auth for protected endpoints.
//!
//! When no key is configured, admin routes are open: a documented
//! development-mode deployment choice.

use crate::api::error::ApiError;
use crate::config::Config;
use axum::http::HeaderMap;

/// Require a valid admin key via `X-Admin-Key: <key>` or
/// `Authorization: Bearer <key>`.
pub fn require_admin_key(config: &Config, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = config.admin_api_key.as_deref() else {
        return Ok(());
    };

    let provided = headers
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .or_else(|| {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::trim)
        });

    match provided {
        Some(key) if key == expected => Ok(()),
        _ => Err(ApiError::Unauthorized(
            "Missing or invalid admin API key. Set X-Admin-Key or Authorization: Bearer <key>."
                .to_string(),
        )),
    }
}
