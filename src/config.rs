//! Observer defaults loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`):
//!
//! | Variable | Default |
//! |---|---|
//! | `ATOM_REQUEST_LIMIT` | `1` |
//! | `ATOM_REQUEST_RACE` | `true` |
//! | `ATOM_REQUEST_TIMEOUT_MS` | `20000` |
//! | `ATOM_REQUEST_LOADING_DELAY_MS` | `200` |
//! | `ATOM_REQUEST_PATH_PARAMS_PATTERN` | `(:[a-zA-Z_]\w*)` |

use serde_json::{Map, Value, json};

use crate::error::ConfigError;
use crate::request::DEFAULT_PATH_PARAMS_PATTERN;

/// Defaults applied to observers built with
/// [`crate::observer::RequestObserver::from_config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverConfig {
    /// Maximum concurrent `send` calls per observer.
    pub limit: usize,

    /// Whether queued calls race (latest wins) instead of queueing FIFO.
    pub race: bool,

    /// Default `timeout` option, in milliseconds.
    pub timeout_ms: u64,

    /// Default `loadingDelay` option, in milliseconds.
    pub loading_delay_ms: u64,

    /// Default `pathParamsPattern` option.
    pub path_params_pattern: String,
}

impl ObserverConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is unset or unparsable.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidLimit`] if `ATOM_REQUEST_LIMIT` is `0`
    /// and [`ConfigError::InvalidPathParamsPattern`] if
    /// `ATOM_REQUEST_PATH_PARAMS_PATTERN` does not compile.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ObserverConfig::from_env`], reading values through `lookup`.
    ///
    /// # Errors
    ///
    /// Same as [`ObserverConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let limit = parse_env(&lookup, "ATOM_REQUEST_LIMIT", defaults.limit);
        if limit == 0 {
            return Err(ConfigError::InvalidLimit(limit));
        }
        let race = parse_env_bool(&lookup, "ATOM_REQUEST_RACE", defaults.race);
        let timeout_ms = parse_env(&lookup, "ATOM_REQUEST_TIMEOUT_MS", defaults.timeout_ms);
        let loading_delay_ms =
            parse_env(&lookup, "ATOM_REQUEST_LOADING_DELAY_MS", defaults.loading_delay_ms);

        let path_params_pattern =
            lookup("ATOM_REQUEST_PATH_PARAMS_PATTERN").unwrap_or(defaults.path_params_pattern);
        if let Err(source) = regex::Regex::new(&path_params_pattern) {
            return Err(ConfigError::InvalidPathParamsPattern {
                pattern: path_params_pattern,
                source,
            });
        }

        Ok(Self {
            limit,
            race,
            timeout_ms,
            loading_delay_ms,
            path_params_pattern,
        })
    }

    /// Raw request options seeded from this configuration.
    #[must_use]
    pub fn default_options(&self) -> Map<String, Value> {
        let mut options = Map::new();
        options.insert("timeout".into(), json!(self.timeout_ms));
        options.insert("loadingDelay".into(), json!(self.loading_delay_ms));
        options.insert("pathParamsPattern".into(), json!(self.path_params_pattern));
        options
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            limit: 1,
            race: true,
            timeout_ms: 20_000,
            loading_delay_ms: 200,
            path_params_pattern: DEFAULT_PATH_PARAMS_PATTERN.to_string(),
        }
    }
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_env<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Parses a variable as a boolean. Accepts `"true"`, `"1"`, `"false"`,
/// `"0"`. Returns `default` otherwise.
fn parse_env_bool(lookup: impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).as_deref() {
        Some("true" | "TRUE" | "1") => true,
        Some("false" | "FALSE" | "0") => false,
        _ => default,
    }
}
