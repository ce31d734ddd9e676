//! Logging setup.
//!
//! geostore logs through `tracing`; this module installs a subscriber when
//! asked to through the environment.
//!
//! # Environment Variables
//!
//! - `GEOSTORE_DEBUG=true|1|yes` - Enable debug logging
//! - `GEOSTORE_LOG_LEVEL=trace|debug|info|warn|error` - Set the level
//! - `GEOSTORE_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//!
//! ```rust,no_run
//! use geostore_core::logging;
//!
//! logging::init();
//! ```
//!
//! Connection descriptors are only ever logged redacted, see
//! [`crate::credentials::redact`].

use std::sync::Once;

use crate::env::{EnvSource, StdEnvSource};

static INIT: Once = Once::new();

const DEBUG_VAR: &str = "GEOSTORE_DEBUG";
const LEVEL_VAR: &str = "GEOSTORE_LOG_LEVEL";
const FORMAT_VAR: &str = "GEOSTORE_LOG_FORMAT";

/// Resolved logging settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    /// Whether any logging was requested.
    pub enabled: bool,
    /// Level name.
    pub level: &'static str,
    /// Output format name.
    pub format: &'static str,
}

impl LogSettings {
    /// Read the settings from an environment source.
    pub fn from_source(source: &impl EnvSource) -> Self {
        let debug = source
            .get(DEBUG_VAR)
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);
        let fallback = if debug { "debug" } else { "warn" };

        let level_var = source.get(LEVEL_VAR);
        let level = match level_var.as_deref().map(str::to_lowercase).as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => fallback,
        };

        let format = match source.get(FORMAT_VAR).map(|f| f.to_lowercase()).as_deref() {
            Some("pretty") => "pretty",
            Some("compact") => "compact",
            _ => "json",
        };

        Self {
            enabled: debug || level_var.is_some(),
            level,
            format,
        }
    }

    /// Filter directive covering the geostore crates.
    pub fn directive(&self) -> String {
        format!(
            "geostore={0},geostore_core={0},geostore_mongodb={0}",
            self.level
        )
    }
}

/// Whether `GEOSTORE_DEBUG` is set.
pub fn is_debug_enabled() -> bool {
    StdEnvSource
        .get(DEBUG_VAR)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Install the global subscriber. Subsequent calls are no-ops.
///
/// Nothing is installed unless `GEOSTORE_DEBUG` or `GEOSTORE_LOG_LEVEL` is set,
/// or when the `tracing-subscriber` feature is disabled.
pub fn init() {
    INIT.call_once(|| {
        let settings = LogSettings::from_source(&StdEnvSource);
        if !settings.enabled {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let filter =
                EnvFilter::try_new(settings.directive()).unwrap_or_else(|_| EnvFilter::new("warn"));

            // Another subscriber may already be installed by the host process.
            let installed = match settings.format {
                "pretty" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty())
                    .try_init(),
                "compact" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact())
                    .try_init(),
                _ => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .try_init(),
            };

            if installed.is_ok() {
                tracing::info!(
                    level = settings.level,
                    format = settings.format,
                    "geostore logging initialized"
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnvSource;

    #[test]
    fn test_defaults() {
        let settings = LogSettings::from_source(&MapEnvSource::new());
        assert!(!settings.enabled);
        assert_eq!(settings.level, "warn");
        assert_eq!(settings.format, "json");
    }

    #[test]
    fn test_debug_flag() {
        let source = MapEnvSource::new().set("GEOSTORE_DEBUG", "YES");
        let settings = LogSettings::from_source(&source);
        assert!(settings.enabled);
        assert_eq!(settings.level, "debug");
    }

    #[test]
    fn test_level_and_format() {
        let source = MapEnvSource::new()
            .set("GEOSTORE_LOG_LEVEL", "Info")
            .set("GEOSTORE_LOG_FORMAT", "compact");
        let settings = LogSettings::from_source(&source);
        assert!(settings.enabled);
        assert_eq!(settings.level, "info");
        assert_eq!(settings.format, "compact");
        assert_eq!(
            settings.directive(),
            "geostore=info,geostore_core=info,geostore_mongodb=info"
        );
    }

    #[test]
    fn test_unknown_level_falls_back() {
        let source = MapEnvSource::new().set("GEOSTORE_LOG_LEVEL", "loud");
        assert_eq!(LogSettings::from_source(&source).level, "warn");
    }
}
