//! Environment variable overlays for forwarding configuration.
//!
//! Every helper returns `None` when the variable is absent so callers can
//! keep whatever value they already had:
//!
//! ```
//! use forward_types::env_utils::{env_flag, env_var};
//!
//! let strict = env_flag("MEMBER_FORWARD_STRICT_NAMING").unwrap_or(true);
//! let depth: Option<usize> = env_var("MEMBER_FORWARD_MAX_DEPTH");
//! # let _ = (strict, depth);
//! ```

use std::str::FromStr;

/// Parse an environment variable into any `FromStr` type.
///
/// Returns `None` if the variable is not set or does not parse.
pub fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Read a boolean switch.
///
/// `1`, `true`, `yes` and `on` are truthy; `0`, `false`, `no` and `off` are
/// falsy (case-insensitive). Anything else, or an unset variable, is `None`.
pub fn env_flag(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a non-empty string value.
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
