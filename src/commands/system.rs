//! Settings, helper installation, and status snapshot actions.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config;
use crate::core::executor;
use crate::core::models::{ExecutionMode, Settings};
use crate::core::state::RuleView;
use crate::error::AppError;

use super::logic::validate_settings;
use super::state::AppState;

// ---- Settings ----

/// Validate and persist `settings`, then restart or stop the monitor to match.
pub async fn update_settings(app: &AppState, settings: Settings) -> Result<Settings, AppError> {
    validate_settings(&settings)?;
    app.store.save_settings(&settings)?;
    app.state.set_settings(settings).await;
    tracing::info!(
        "[Settings] updated: monitoring={} interval={}s autoReapply={}",
        settings.monitoring_enabled,
        settings.check_interval_seconds,
        settings.auto_reapply
    );

    if settings.monitoring_enabled {
        app.monitor.start().await;
    } else {
        app.monitor.stop().await;
    }
    Ok(settings)
}

// ---- Helper ----

/// Install the helper from `source` (default: next to this executable).
pub async fn install_helper(app: &AppState, source: Option<PathBuf>) -> Result<ExecutionMode, AppError> {
    let source = source
        .or_else(executor::default_helper_source)
        .ok_or_else(|| AppError::NotFound(format!("Could not locate {}", config::HELPER_BIN_NAME)))?;
    tracing::info!("[Helper] installing from {}", source.display());

    let result = executor::install_helper(app.shell().as_ref(), &source).await;
    app.state.set_helper_installed(app.shell().is_helper_installed());
    if let Some(err) = result.to_error() {
        tracing::error!("[Helper] install failed: {}", result.error);
        return Err(err);
    }
    tracing::info!("[Helper] installed successfully");
    Ok(app.reconciler.execution_mode())
}

pub async fn uninstall_helper(app: &AppState) -> Result<ExecutionMode, AppError> {
    let result = executor::uninstall_helper(app.shell().as_ref()).await;
    app.state.set_helper_installed(app.shell().is_helper_installed());
    if let Some(err) = result.to_error() {
        tracing::error!("[Helper] uninstall failed: {}", result.error);
        return Err(err);
    }
    tracing::info!("[Helper] uninstalled successfully");
    Ok(app.reconciler.execution_mode())
}

// ---- Status ----

/// Everything a status display needs, captured at one point in time.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub overall: String,
    pub rules: Vec<RuleView>,
    pub is_applying: bool,
    pub helper_installed: bool,
    pub mode: ExecutionMode,
    pub monitor_running: bool,
    pub settings: Settings,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_applied: Option<DateTime<Utc>>,
    pub config_dir: PathBuf,
}

pub async fn status(app: &AppState) -> StatusSnapshot {
    StatusSnapshot {
        overall: app.state.overall_status().await,
        rules: app.state.rule_views().await,
        is_applying: app.state.is_applying(),
        helper_installed: app.state.helper_installed(),
        mode: app.reconciler.execution_mode(),
        monitor_running: app.monitor.is_running(),
        settings: app.state.settings().await,
        last_checked: app.state.last_checked().await,
        last_applied: app.state.last_applied().await,
        config_dir: app.store.dir().to_path_buf(),
    }
}
