//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use hm_core::{EventToggles, HostInfo};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which host notifications are observed.
    pub events: EventToggles,
    pub telemetry: TelemetryConfig,
}

/// Record output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Append machine, user and host properties to every record.
    pub enrich: bool,
    /// Host version details used for enrichment.
    pub host: HostInfo,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enrich: true,
            host: HostInfo::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (HM_EVENTS__OPENING=true)
        figment = figment.merge(Env::prefixed("HM_").split("__"));

        figment.extract()
    }

    /// Loads configuration, falling back to observing nothing.
    ///
    /// A broken configuration is reported once and never stops the engine.
    pub fn load_or_disabled(config_path: Option<&Path>) -> Self {
        match Self::load_from(config_path) {
            Ok(config) => match config.events.validate() {
                Ok(()) => config,
                Err(e) => {
                    tracing::error!(error = %e, "invalid event configuration, all events disabled");
                    Self {
                        events: EventToggles::disabled(),
                        ..config
                    }
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "failed to load configuration, all events disabled");
                Self::default()
            }
        }
    }
}

/// Returns the platform-specific config directory for hm.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("hm"))
}
