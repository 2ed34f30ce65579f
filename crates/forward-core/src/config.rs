//! Activation configuration.
//!
//! [`ForwardConfig`] controls how stubs are resolved and how their dispatch
//! routines behave. It can be built in code, read from a JSON file, or
//! overlaid from `MEMBER_FORWARD_*` environment variables.
//!
//! # Example
//!
//! ```
//! use forward_core::config::ForwardConfig;
//!
//! let config = ForwardConfig::default()
//!     .with_strict_naming(false)
//!     .with_debug(true);
//! assert!(config.fault_guard);
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use forward_resolver::ReadOnlySetterPolicy;
use forward_types::env_utils::{env_flag, env_string, env_var};
use serde::{Deserialize, Serialize};

/// Require explicit receivers to be named `__instance`.
pub const ENV_STRICT_NAMING: &str = "MEMBER_FORWARD_STRICT_NAMING";
/// Log every generated routine listing at info level.
pub const ENV_DEBUG: &str = "MEMBER_FORWARD_DEBUG";
/// Install the fault guard around each dispatch.
pub const ENV_FAULT_GUARD: &str = "MEMBER_FORWARD_FAULT_GUARD";
/// `fail` or `ignore`.
pub const ENV_READ_ONLY_SETTER: &str = "MEMBER_FORWARD_READ_ONLY_SETTER";
/// Module scanned when no scope is given.
pub const ENV_SCOPE: &str = "MEMBER_FORWARD_SCOPE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Only a first parameter named `__instance` is taken as the receiver
    /// (default: true). When off, any first parameter sharing a hierarchy
    /// with the target type is.
    pub strict_naming: bool,

    /// Trace every generated dispatch routine at info level, as if each stub
    /// carried the `Debug` annotation (default: false).
    pub debug: bool,

    /// Wrap each dispatch in the fault guard (default: true).
    pub fault_guard: bool,

    /// Behavior of setters over read-only storage (default: fail).
    pub read_only_setter: ReadOnlySetterPolicy,

    /// Module `forward_all` callers may fall back to when they have no scope
    /// of their own.
    pub default_scope: Option<String>,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            strict_naming: true,
            debug: false,
            fault_guard: true,
            read_only_setter: ReadOnlySetterPolicy::Fail,
            default_scope: None,
        }
    }
}

impl ForwardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with any `MEMBER_FORWARD_*` variables that are set.
    pub fn from_env() -> Self {
        Self::default().overlay_env()
    }

    /// Replace fields whose environment variable is set and parses.
    pub fn overlay_env(mut self) -> Self {
        if let Some(strict) = env_flag(ENV_STRICT_NAMING) {
            self.strict_naming = strict;
        }
        if let Some(debug) = env_flag(ENV_DEBUG) {
            self.debug = debug;
        }
        if let Some(guard) = env_flag(ENV_FAULT_GUARD) {
            self.fault_guard = guard;
        }
        if let Some(policy) = env_var::<ReadOnlySetterPolicy>(ENV_READ_ONLY_SETTER) {
            self.read_only_setter = policy;
        }
        if let Some(scope) = env_string(ENV_SCOPE) {
            self.default_scope = Some(scope);
        }
        self
    }

    /// Load from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("failed to parse forward config JSON")
    }

    pub fn with_strict_naming(mut self, strict: bool) -> Self {
        self.strict_naming = strict;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_fault_guard(mut self, enabled: bool) -> Self {
        self.fault_guard = enabled;
        self
    }

    pub fn with_read_only_setter(mut self, policy: ReadOnlySetterPolicy) -> Self {
        self.read_only_setter = policy;
        self
    }

    pub fn with_default_scope(mut self, scope: impl Into<String>) -> Self {
        self.default_scope = Some(scope.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ForwardConfig::default();
        assert!(config.strict_naming);
        assert!(config.fault_guard);
        assert_eq!(config.read_only_setter, ReadOnlySetterPolicy::Fail);
        assert_eq!(config.default_scope, None);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            ForwardConfig::from_json_str(r#"{"strict_naming": false, "read_only_setter": "ignore"}"#)
                .unwrap();
        assert!(!config.strict_naming);
        assert!(config.fault_guard);
        assert_eq!(config.read_only_setter, ReadOnlySetterPolicy::Ignore);
    }

    #[test]
    fn test_json_file_round_trip() {
        let config = ForwardConfig::default()
            .with_debug(true)
            .with_default_scope("Demo");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&config).unwrap()).unwrap();
        let loaded = ForwardConfig::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_bad_json_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = ForwardConfig::from_json_file(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("invalid config file"));
    }

    #[test]
    fn test_env_overlay() {
        std::env::set_var(ENV_READ_ONLY_SETTER, "ignore");
        std::env::set_var(ENV_FAULT_GUARD, "off");
        let config = ForwardConfig::from_env();
        std::env::remove_var(ENV_READ_ONLY_SETTER);
        std::env::remove_var(ENV_FAULT_GUARD);
        assert_eq!(config.read_only_setter, ReadOnlySetterPolicy::Ignore);
        assert!(!config.fault_guard);
    }
}
