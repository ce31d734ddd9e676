//! Store settings loaded from the environment or a TOML file.
//!
//! # Environment Variables
//!
//! | Variable | Default |
//! |---|---|
//! | `MONGODB_URL` | `mongodb://localhost:27017` |
//! | `DATABASE_NAME` | `sports_diary` |
//! | `GEOSTORE_CONNECT_TIMEOUT_MS` | `10000` |
//! | `GEOSTORE_MAX_POOL_SIZE` | driver default |
//! | `GEOSTORE_QUERY_TIMEOUT_MS` | none |
//!
//! Values may reference other variables with `${VAR}` or `${VAR:-default}`.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials;
use crate::env::{EnvExpander, EnvSource, StdEnvSource};
use crate::error::{StoreError, StoreResult};

/// Default connection descriptor.
pub const DEFAULT_URL: &str = "mongodb://localhost:27017";
/// Default database name.
pub const DEFAULT_DATABASE: &str = "sports_diary";
/// Default connect timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Settings needed to open the store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Connection descriptor, possibly with unencoded credentials.
    pub url: String,
    /// Database name.
    pub database: String,
    /// Time allowed for the initial dial and ping.
    pub connect_timeout_ms: u64,
    /// Maximum pooled connections.
    pub max_pool_size: Option<u32>,
    /// Default per-operation deadline.
    pub query_timeout_ms: Option<u64>,
    /// Application name reported to the server.
    pub app_name: Option<String>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            max_pool_size: None,
            query_timeout_ms: None,
            app_name: None,
        }
    }
}

impl fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSettings")
            .field("url", &credentials::redact(&self.url))
            .field("database", &self.database)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("max_pool_size", &self.max_pool_size)
            .field("query_timeout_ms", &self.query_timeout_ms)
            .field("app_name", &self.app_name)
            .finish()
    }
}

impl StoreSettings {
    /// Load from the process environment.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_source(StdEnvSource)
    }

    /// Load from a custom environment source.
    pub fn from_source<S: EnvSource>(source: S) -> StoreResult<Self> {
        let env = EnvExpander::with_source(source);
        let defaults = Self::default();

        let settings = Self {
            url: env.var("MONGODB_URL")?.unwrap_or(defaults.url),
            database: env.var("DATABASE_NAME")?.unwrap_or(defaults.database),
            connect_timeout_ms: parse_var(&env, "GEOSTORE_CONNECT_TIMEOUT_MS")?
                .unwrap_or(defaults.connect_timeout_ms),
            max_pool_size: parse_var(&env, "GEOSTORE_MAX_POOL_SIZE")?,
            query_timeout_ms: parse_var(&env, "GEOSTORE_QUERY_TIMEOUT_MS")?,
            app_name: env.var("GEOSTORE_APP_NAME")?,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Parse from TOML text.
    ///
    /// ```rust
    /// use geostore_core::StoreSettings;
    ///
    /// let settings = StoreSettings::from_toml(r#"
    ///     url = "mongodb://db:27017"
    ///     database = "marketplace"
    /// "#).unwrap();
    /// assert_eq!(settings.connect_timeout_ms, 10_000);
    /// ```
    pub fn from_toml(text: &str) -> StoreResult<Self> {
        let settings: Self = toml::from_str(text)
            .map_err(|e| StoreError::config(format!("invalid settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load a TOML settings file.
    pub fn from_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StoreError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Check the settings without connecting.
    pub fn validate(&self) -> StoreResult<()> {
        if self.database.trim().is_empty() {
            return Err(StoreError::config("database name is empty"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(StoreError::config("connect timeout must be positive"));
        }
        if self.max_pool_size == Some(0) {
            return Err(StoreError::config("max pool size must be positive"));
        }
        credentials::encode(&self.url)?;
        Ok(())
    }

    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Query timeout as a duration.
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_var<S: EnvSource, T: FromStr>(env: &EnvExpander<S>, name: &str) -> StoreResult<Option<T>> {
    match env.var(name)? {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            StoreError::config(format!("{} is not a valid number: '{}'", name, raw))
        }),
    }
}
