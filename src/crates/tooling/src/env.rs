//! Environment variable parsing helpers.

use crate::{Result, ToolingError};
use std::env;
use std::str::FromStr;

/// Load an environment variable. Empty values are treated as unset.
pub fn get_env(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(val) => {
            let trimmed = val.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        Err(_) => None,
    }
}

/// Load and parse an environment variable.
///
/// Returns `Ok(None)` when unset, an error when set but unparseable.
pub fn get_env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_env(key) {
        Some(val) => {
            let parsed = val.parse::<T>().map_err(|e| {
                ToolingError::Env(format!("Failed to parse {}: {}", key, e))
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Load and parse an environment variable, falling back to a default.
pub fn get_env_parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    get_env(key)
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Load a boolean environment variable.
///
/// "true", "1", "yes", "on" (case-insensitive) are true; everything else,
/// including unset, is false.
pub fn get_env_bool(key: &str) -> bool {
    match get_env(key) {
        Some(val) => matches!(val.to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        None => false,
    }
}

/// Load a comma-separated environment variable as a list of trimmed,
/// non-empty entries.
pub fn get_env_list(key: &str) -> Vec<String> {
    get_env(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
