//! Session configuration.
//!
//! Configuration can be loaded from:
//! - the TOML file named by `BEAVER_CONFIG`
//! - the default TOML file (`~/.config/beaver/beaver.toml`)
//! - environment variables (`BEAVER_*` prefixed)
//!
//! # Example
//!
//! ```rust,no_run
//! use beaver_session::config::SessionConfig;
//!
//! // Load from BEAVER_CONFIG or the default path, or fall back to env vars
//! let config = SessionConfig::load().expect("Failed to load config");
//!
//! // Or explicitly from a file
//! let config = SessionConfig::from_file(std::path::Path::new("beaver.toml")).expect("Failed to load");
//! ```
//!
//! The file holds a single `[session]` table; `${VAR}` references are
//! replaced with the value of the environment variable before parsing.
//!
//! ```toml
//! [session]
//! lookup_concurrency = 4
//! user_library_id = 1
//! missing_source_policy = "placeholder"
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use beaver_citations::MissingSourcePolicy;
use beaver_core::defaults;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "BEAVER_CONFIG";

static ENV_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env reference pattern is valid"));

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tuning for a [`ThreadSession`](crate::ThreadSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum item lookups in flight within one resolution pass.
    pub lookup_concurrency: usize,
    /// Library ID of the user's own library; other libraries are groups.
    pub user_library_id: i64,
    /// Buffered session events per subscriber.
    pub event_bus_capacity: usize,
    /// What the cited-source list shows for items that do not resolve.
    pub missing_source_policy: MissingSourcePolicy,
    pub emit_events: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lookup_concurrency: defaults::LOOKUP_CONCURRENCY,
            user_library_id: defaults::USER_LIBRARY_ID,
            event_bus_capacity: defaults::EVENT_BUS_CAPACITY,
            missing_source_policy: MissingSourcePolicy::default(),
            emit_events: true,
        }
    }
}

impl SessionConfig {
    /// Default config file path (~/.config/beaver/beaver.toml).
    pub fn default_config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
        path.push(defaults::CONFIG_DIR_NAME);
        path.push(defaults::CONFIG_FILE_NAME);
        path
    }

    /// Load configuration from `BEAVER_CONFIG`, else the default path,
    /// falling back to environment variables when neither file exists.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(None)
    }

    /// Like [`load`](Self::load), with an explicit path taking precedence.
    pub fn load_from(explicit: Option<&Path>) -> ConfigResult<Self> {
        if let Some(path) = explicit {
            info!("Loading session config from: {}", path.display());
            return Self::from_file(path);
        }
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            info!("Loading session config from {}: {}", CONFIG_PATH_ENV, path);
            return Self::from_file(Path::new(&path));
        }

        let path = Self::default_config_path();
        if path.exists() {
            info!("Loading session config from: {}", path.display());
            Self::from_file(&path)
        } else {
            debug!(
                "Config file not found at {}, using environment variables",
                path.display()
            );
            let config = Self::from_env();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let content = Self::substitute_env_vars(&content);

        #[derive(Deserialize)]
        struct TomlRoot {
            #[serde(default)]
            session: SessionConfig,
        }

        let root: TomlRoot = toml::from_str(&content)?;
        root.session.validate()?;
        Ok(root.session)
    }

    /// Load configuration from `BEAVER_*` environment variables.
    ///
    /// Unset or unparseable variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.trim().parse().ok())
        }

        let default = Self::default();
        Self {
            lookup_concurrency: parsed(get("BEAVER_LOOKUP_CONCURRENCY"))
                .unwrap_or(default.lookup_concurrency),
            user_library_id: parsed(get("BEAVER_USER_LIBRARY_ID"))
                .unwrap_or(default.user_library_id),
            event_bus_capacity: parsed(get("BEAVER_EVENT_BUS_CAPACITY"))
                .unwrap_or(default.event_bus_capacity),
            missing_source_policy: parsed(get("BEAVER_MISSING_SOURCE_POLICY"))
                .unwrap_or(default.missing_source_policy),
            emit_events: get("BEAVER_EMIT_EVENTS")
                .map(|value| value == "true" || value == "1")
                .unwrap_or(default.emit_events),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.lookup_concurrency == 0 {
            return Err(ConfigError::Validation(
                "lookup_concurrency must be at least 1".to_string(),
            ));
        }
        if self.event_bus_capacity == 0 {
            return Err(ConfigError::Validation(
                "event_bus_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Replace `${VAR}` with the variable's value; unset variables are left as is.
    fn substitute_env_vars(content: &str) -> String {
        ENV_REFERENCE
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .to_string()
    }
}
