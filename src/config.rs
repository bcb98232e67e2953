//! Configuration for the session store and response cache.
//!
//! Values come from `~/.convostate/config.json` (all fields optional), then
//! `CONVOSTATE_*` environment variables override individual settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, StateError};

/// Top-level configuration consumed by [`SessionStore`](crate::SessionStore)
/// and [`ResponseCache`](crate::ResponseCache).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub session: SessionConfig,
    pub cache: CacheConfig,
}

/// Session store limits and sweep policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Soft ceiling on live sessions. Exceeding it is logged, never enforced.
    pub max_sessions: usize,
    /// Message history kept per session; oldest messages are dropped first.
    pub max_messages_per_session: usize,
    /// Sessions idle longer than this are removed by a sweep.
    pub inactivity_cutoff_secs: u64,
    /// Minimum time between two sweeps.
    pub sweep_interval_secs: u64,
    /// Number of recent messages forwarded upstream as conversation context.
    pub history_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            max_messages_per_session: 50,
            inactivity_cutoff_secs: 24 * 3600,
            sweep_interval_secs: 3600,
            history_window: 10,
        }
    }
}

/// Response cache capacity and expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether the request layer should consult the cache at all.
    pub enabled: bool,
    /// Maximum number of cached responses before LRU eviction.
    pub max_size: usize,
    /// Seconds a cached response stays valid.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 1000,
            ttl_secs: 3600,
        }
    }
}

impl StateConfig {
    /// Default config location: `~/.convostate/config.json`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".convostate")
            .join("config.json")
    }

    /// Parse a JSON config file. Missing fields take their defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the default config file if present, then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from_path(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `CONVOSTATE_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        override_from_env("CONVOSTATE_MAX_SESSIONS", &mut self.session.max_sessions);
        override_from_env(
            "CONVOSTATE_MAX_MESSAGES",
            &mut self.session.max_messages_per_session,
        );
        override_from_env(
            "CONVOSTATE_INACTIVITY_CUTOFF_SECS",
            &mut self.session.inactivity_cutoff_secs,
        );
        override_from_env(
            "CONVOSTATE_SWEEP_INTERVAL_SECS",
            &mut self.session.sweep_interval_secs,
        );
        override_from_env("CONVOSTATE_CACHE_ENABLED", &mut self.cache.enabled);
        override_from_env("CONVOSTATE_CACHE_MAX_SIZE", &mut self.cache.max_size);
        override_from_env("CONVOSTATE_CACHE_TTL_SECS", &mut self.cache.ttl_secs);
    }

    /// Reject values that would make the store or cache useless.
    pub fn validate(&self) -> Result<()> {
        if self.session.max_messages_per_session == 0 {
            return Err(StateError::Config(
                "session.max_messages_per_session must be at least 1".into(),
            ));
        }
        if self.cache.max_size == 0 {
            return Err(StateError::Config(
                "cache.max_size must be at least 1".into(),
            ));
        }
        if self.cache.ttl_secs == 0 {
            return Err(StateError::Config(
                "cache.ttl_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn override_from_env<T: std::str::FromStr>(var: &str, slot: &mut T) {
    let Ok(raw) = std::env::var(var) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => warn!(var, value = %raw, "Ignoring unparseable environment override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_state_config_defaults() {
        let cfg = StateConfig::default();
        assert_eq!(cfg.session.max_sessions, 1000);
        assert_eq!(cfg.session.max_messages_per_session, 50);
        assert_eq!(cfg.session.inactivity_cutoff_secs, 86_400);
        assert_eq!(cfg.session.sweep_interval_secs, 3600);
        assert_eq!(cfg.session.history_window, 10);
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.cache.max_size, 1000);
        assert_eq!(cfg.cache.ttl_secs, 3600);
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{"cache": {"max_size": 2}}"#;
        let cfg: StateConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.cache.max_size, 2);
        assert_eq!(cfg.cache.ttl_secs, 3600); // default
        assert_eq!(cfg.session, SessionConfig::default());
    }

    #[test]
    fn test_load_from_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"session": {"max_messages_per_session": 4, "sweep_interval_secs": 60}}"#,
        )
        .unwrap();

        let cfg = StateConfig::load_from_path(&path).unwrap();
        assert_eq!(cfg.session.max_messages_per_session, 4);
        assert_eq!(cfg.session.sweep_interval_secs, 60);
        assert_eq!(cfg.session.inactivity_cutoff_secs, 86_400);
    }

    #[test]
    fn test_load_from_path_rejects_invalid() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"cache": {"ttl_secs": 0}}"#).unwrap();

        let err = StateConfig::load_from_path(&path).unwrap_err();
        assert!(matches!(err, StateError::Config(_)));
    }

    #[test]
    fn test_load_from_path_corrupt_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = StateConfig::load_from_path(&path).unwrap_err();
        assert!(matches!(err, StateError::Json(_)));
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = StateConfig::load_from_path(&tmp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, StateError::Io(_)));
    }

    #[test]
    fn test_validate_rejects_zero_history() {
        let mut cfg = StateConfig::default();
        cfg.session.max_messages_per_session = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_override_from_env_parses_and_ignores_garbage() {
        // Unique variable names so parallel tests don't race on the environment.
        let mut size = 10usize;
        std::env::set_var("CONVOSTATE_TEST_OVERRIDE_OK", "42");
        override_from_env("CONVOSTATE_TEST_OVERRIDE_OK", &mut size);
        assert_eq!(size, 42);

        std::env::set_var("CONVOSTATE_TEST_OVERRIDE_BAD", "lots");
        override_from_env("CONVOSTATE_TEST_OVERRIDE_BAD", &mut size);
        assert_eq!(size, 42);

        let mut enabled = true;
        std::env::set_var("CONVOSTATE_TEST_OVERRIDE_BOOL", "false");
        override_from_env("CONVOSTATE_TEST_OVERRIDE_BOOL", &mut enabled);
        assert!(!enabled);
    }
}
