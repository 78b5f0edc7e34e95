//! `routes.json`: the rule list.

use anyhow::Result;

use super::{read_json, write_json_atomic, ConfigStore};
use crate::config;
use crate::core::models::RouteRule;

impl ConfigStore {
    /// Load all rules. A missing or unreadable file yields an empty list.
    pub fn load_rules(&self) -> Vec<RouteRule> {
        let path = self.path(config::ROUTES_FILE);
        tracing::info!("[Config] loading routes from {}", path.display());
        match read_json::<Vec<RouteRule>>(&path) {
            Ok(Some(rules)) => {
                tracing::info!("[Config] loaded {} rules", rules.len());
                for rule in &rules {
                    tracing::debug!(
                        "[Config]   rule: '{}' network={} gateway={} enabled={}",
                        rule.name,
                        rule.network,
                        rule.gateway,
                        rule.enabled
                    );
                }
                rules
            }
            Ok(None) => {
                tracing::info!("[Config] no routes file found, returning empty");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("[Config] failed to load routes: {e:#}");
                Vec::new()
            }
        }
    }

    /// Load all rules, failing on an unreadable file. A missing file is an empty list.
    pub fn read_rules(&self) -> Result<Vec<RouteRule>> {
        Ok(read_json(&self.path(config::ROUTES_FILE))?.unwrap_or_default())
    }

    pub fn save_rules(&self, rules: &[RouteRule]) -> Result<()> {
        tracing::info!("[Config] saving {} rules", rules.len());
        write_json_atomic(&self.path(config::ROUTES_FILE), &rules)
    }
}
