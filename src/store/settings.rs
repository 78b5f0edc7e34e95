//! `settings.json`: monitor settings.

use anyhow::Result;

use super::{read_json, write_json_atomic, ConfigStore};
use crate::config;
use crate::core::models::Settings;

impl ConfigStore {
    /// Load settings. A missing or unreadable file yields the defaults, and a
    /// zero interval is replaced with the default interval.
    pub fn load_settings(&self) -> Settings {
        let path = self.path(config::SETTINGS_FILE);
        tracing::info!("[Config] loading settings from {}", path.display());
        let mut settings = match read_json::<Settings>(&path) {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                tracing::info!("[Config] no settings file found, using defaults");
                return Settings::default();
            }
            Err(e) => {
                tracing::warn!("[Config] failed to load settings: {e:#}");
                return Settings::default();
            }
        };
        if settings.check_interval_seconds == 0 {
            tracing::warn!(
                "[Config] check interval 0 is invalid, using {}s",
                config::DEFAULT_CHECK_INTERVAL_SECS
            );
            settings.check_interval_seconds = config::DEFAULT_CHECK_INTERVAL_SECS;
        }
        tracing::info!(
            "[Config] loaded settings: monitoring={} interval={}s autoReapply={}",
            settings.monitoring_enabled,
            settings.check_interval_seconds,
            settings.auto_reapply
        );
        settings
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        tracing::info!(
            "[Config] saving settings: monitoring={} interval={}s autoReapply={}",
            settings.monitoring_enabled,
            settings.check_interval_seconds,
            settings.auto_reapply
        );
        write_json_atomic(&self.path(config::SETTINGS_FILE), settings)
    }
}
