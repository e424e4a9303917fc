#![forbid(unsafe_code)]

//! Per-thread runtime policy.
//!
//! The active [`RuntimeConfig`] lives in a thread-local cell. Install a
//! different one with [`RuntimeConfig::install`]; the returned guard restores
//! the previous policy when dropped.
//!
//! With the `config-file` feature the policy can also be loaded from TOML or
//! JSON. Missing keys keep their defaults.

use std::cell::Cell;
use std::env;
use std::marker::PhantomData;
use std::rc::Rc;

/// Default reaction budget for a single root tick.
pub const DEFAULT_MAX_TICK_REACTIONS: usize = 10_000;

thread_local! {
    static ACTIVE: Cell<RuntimeConfig> = const { Cell::new(RuntimeConfig::DEFAULT) };
}

/// Runtime policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "config-file",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct RuntimeConfig {
    /// Maximum deferred reactions drained in one root tick.
    pub max_tick_reactions: usize,
    /// Catch and log panics raised by plain event listeners.
    pub isolate_listener_panics: bool,
    /// Log action failures at debug level instead of trace.
    pub log_action_failures: bool,
}

impl RuntimeConfig {
    const DEFAULT: Self = Self {
        max_tick_reactions: DEFAULT_MAX_TICK_REACTIONS,
        isolate_listener_panics: true,
        log_action_failures: true,
    };

    /// Make this the active config on the current thread until the guard drops.
    #[must_use = "dropping the guard restores the previous config"]
    pub fn install(self) -> ConfigGuard {
        let previous = ACTIVE.with(|cell| cell.replace(self));
        ConfigGuard {
            previous,
            _not_send: PhantomData,
        }
    }

    /// Apply `EVENTIDE_*` environment overrides on top of `self`.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("EVENTIDE_MAX_TICK_REACTIONS").and_then(|v| v.trim().parse().ok()) {
            self.max_tick_reactions = v;
        }
        if let Some(v) = lookup("EVENTIDE_ISOLATE_LISTENER_PANICS").and_then(|v| parse_flag(&v)) {
            self.isolate_listener_panics = v;
        }
        if let Some(v) = lookup("EVENTIDE_LOG_ACTION_FAILURES").and_then(|v| parse_flag(&v)) {
            self.log_action_failures = v;
        }
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// The config active on the current thread.
#[must_use]
pub fn current() -> RuntimeConfig {
    ACTIVE
        .try_with(Cell::get)
        .unwrap_or(RuntimeConfig::DEFAULT)
}

/// RAII guard returned by [`RuntimeConfig::install`].
#[must_use = "dropping the guard restores the previous config"]
pub struct ConfigGuard {
    previous: RuntimeConfig,
    _not_send: PhantomData<Rc<()>>,
}

impl Drop for ConfigGuard {
    fn drop(&mut self) {
        let previous = self.previous;
        let _ = ACTIVE.try_with(|cell| cell.set(previous));
    }
}

impl std::fmt::Debug for ConfigGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigGuard")
            .field("previous", &self.previous)
            .finish()
    }
}

/// Errors from loading a config file.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(std::io::Error),
    /// TOML parse failure.
    Toml(String),
    /// JSON parse failure.
    Json(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Toml(msg) => write!(f, "invalid TOML config: {msg}"),
            Self::Json(msg) => write!(f, "invalid JSON config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(feature = "config-file")]
impl RuntimeConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Toml`] on malformed input.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Toml(e.to_string()))
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Json`] on malformed input.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Json(e.to_string()))
    }

    /// Load from a file; `.json` is parsed as JSON, anything else as TOML.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, or a parse error.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&raw)
        } else {
            Self::from_toml_str(&raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.max_tick_reactions, DEFAULT_MAX_TICK_REACTIONS);
        assert!(cfg.isolate_listener_panics);
        assert!(cfg.log_action_failures);
        assert_eq!(current(), cfg);
    }

    #[test]
    fn install_guard_restores_previous() {
        let custom = RuntimeConfig {
            max_tick_reactions: 3,
            ..RuntimeConfig::default()
        };
        {
            let _guard = custom.install();
            assert_eq!(current().max_tick_reactions, 3);
            {
                let _inner = RuntimeConfig {
                    max_tick_reactions: 7,
                    ..custom
                }
                .install();
                assert_eq!(current().max_tick_reactions, 7);
            }
            assert_eq!(current().max_tick_reactions, 3);
        }
        assert_eq!(current(), RuntimeConfig::default());
    }

    #[test]
    fn overrides_parse_known_keys() {
        let cfg = RuntimeConfig::default().with_overrides_from(|key| match key {
            "EVENTIDE_MAX_TICK_REACTIONS" => Some(" 42 ".into()),
            "EVENTIDE_ISOLATE_LISTENER_PANICS" => Some("off".into()),
            "EVENTIDE_LOG_ACTION_FAILURES" => Some("maybe".into()),
            _ => None,
        });
        assert_eq!(cfg.max_tick_reactions, 42);
        assert!(!cfg.isolate_listener_panics);
        assert!(cfg.log_action_failures, "unparseable flag keeps default");
    }

    #[test]
    fn parse_flag_variants() {
        assert_eq!(parse_flag("YES"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag(""), None);
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::Toml("expected `=`".into());
        assert!(err.to_string().contains("TOML"));
        let err = ConfigError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
