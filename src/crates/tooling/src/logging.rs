//! Tracing initialization and log-message hygiene.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`; defaults to `info` when unset. Safe to call more than
/// once (subsequent calls are no-ops).
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Truncate a message for user-facing transports. Newlines are collapsed so
/// the message stays a single chat line.
pub fn truncate_for_transport(message: &str, max_len: usize) -> String {
    let flattened: String = message
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    truncate_chars(&flattened, max_len)
}

/// Truncate a message for log output.
pub fn truncate_for_log(message: &str) -> String {
    truncate_chars(message, 1000)
}

fn truncate_chars(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    s.chars().take(max_len).collect()
}
