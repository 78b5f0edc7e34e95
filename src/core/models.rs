//! Route rules, observed statuses, settings, and route commands.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config;

/// A named desired mapping from a network to a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub id: Uuid,
    pub name: String,
    /// CIDR, e.g. `10.255.255.0/24`.
    pub network: String,
    /// IPv4 gateway, e.g. `10.255.10.1`.
    pub gateway: String,
    pub enabled: bool,
}

impl RouteRule {
    pub fn new(
        name: impl Into<String>,
        network: impl Into<String>,
        gateway: impl Into<String>,
        enabled: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            network: network.into(),
            gateway: gateway.into(),
            enabled,
        }
    }
}

/// Observed state of a rule against the live routing table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum RouteStatus {
    #[default]
    Unknown,
    Active,
    Missing,
    Error(String),
}

impl RouteStatus {
    /// Missing or Error: the rule is enabled but not in effect.
    pub fn is_drifted(&self) -> bool {
        matches!(self, RouteStatus::Missing | RouteStatus::Error(_))
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteStatus::Unknown => write!(f, "unknown"),
            RouteStatus::Active => write!(f, "active"),
            RouteStatus::Missing => write!(f, "missing"),
            RouteStatus::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// User-tunable monitor behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub monitoring_enabled: bool,
    pub check_interval_seconds: u64,
    pub auto_reapply: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            monitoring_enabled: true,
            check_interval_seconds: config::DEFAULT_CHECK_INTERVAL_SECS,
            auto_reapply: false,
        }
    }
}

/// Which path route mutations take. Derived at call time, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionMode {
    HelperInstalled,
    AdHocElevation,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::HelperInstalled => write!(f, "helper"),
            ExecutionMode::AdHocElevation => write!(f, "ad-hoc elevation"),
        }
    }
}

/// The two route-table mutation verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAction {
    Add,
    Delete,
}

impl RouteAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteAction::Add => "add",
            RouteAction::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "add" => Some(RouteAction::Add),
            "delete" => Some(RouteAction::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for RouteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One route mutation: `<action> <network> <gateway>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteCommand {
    pub action: RouteAction,
    pub network: String,
    pub gateway: String,
}

impl RouteCommand {
    pub fn add(rule: &RouteRule) -> Self {
        Self {
            action: RouteAction::Add,
            network: rule.network.clone(),
            gateway: rule.gateway.clone(),
        }
    }

    pub fn delete(rule: &RouteRule) -> Self {
        Self {
            action: RouteAction::Delete,
            network: rule.network.clone(),
            gateway: rule.gateway.clone(),
        }
    }

    /// The three positional arguments accepted by the helper.
    pub fn helper_args(&self) -> [&str; 3] {
        [self.action.as_str(), &self.network, &self.gateway]
    }

    /// Shell line for the ad-hoc path. Delete output is silenced since the
    /// route is often absent.
    pub fn shell_line(&self) -> String {
        let line = format!(
            "{} -n {} {} {}",
            config::ROUTE_BIN,
            self.action,
            self.network,
            self.gateway
        );
        match self.action {
            RouteAction::Delete => format!("{line} 2>/dev/null"),
            RouteAction::Add => line,
        }
    }
}
