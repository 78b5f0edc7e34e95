//! Background service lifecycle for the daemon.
//!
//! `BackgroundServices` brings the route table in line on startup, runs the
//! monitor, reloads configuration on SIGHUP, and stops cleanly on Ctrl-C or
//! SIGTERM.

use std::sync::Arc;

use anyhow::Result;

use crate::commands::AppState;

/// Manages the daemon's long-running pieces.
///
/// Started in dependency order:
/// 1. Initial apply of enabled rules (so the first monitor tick sees real state)
/// 2. Route monitor, if monitoring is enabled
pub struct BackgroundServices;

impl BackgroundServices {
    pub async fn start(app: &AppState) {
        tracing::info!("[Bootstrap] starting bootstrap");
        let enabled = app.state.enabled_rules().await;
        tracing::info!(
            "[Bootstrap] {} enabled rules, mode={}",
            enabled.len(),
            app.reconciler.execution_mode()
        );

        // 1. Initial apply.
        if !enabled.is_empty() {
            tracing::info!("[Bootstrap] applying enabled routes");
            let report = app.reconciler.apply_routes(&app.state.rules().await).await;
            for failure in report.failures() {
                tracing::warn!("[Bootstrap] '{}' not active: {}", failure.name, failure.status);
            }
        }

        // 2. Monitor.
        Self::restart_monitor(app).await;
        tracing::info!("[Bootstrap] complete");
    }

    /// Re-read configuration from disk and bring the table back in line.
    pub async fn reload(app: &AppState) {
        tracing::info!("[Daemon] reloading configuration");
        app.monitor.stop().await;
        app.reload().await;
        Self::start(app).await;
    }

    pub async fn shutdown(app: &AppState) {
        tracing::info!("[Daemon] shutting down");
        app.monitor.stop().await;
    }

    async fn restart_monitor(app: &AppState) {
        let settings = app.state.settings().await;
        if settings.monitoring_enabled {
            tracing::info!(
                "[Bootstrap] starting route monitor (interval: {}s)",
                settings.check_interval_seconds
            );
            app.monitor.start().await;
        } else {
            tracing::info!("[Bootstrap] monitoring disabled");
            app.monitor.stop().await;
        }
    }
}

/// Run until Ctrl-C or SIGTERM; SIGHUP reloads configuration.
pub async fn run_daemon(app: Arc<AppState>) -> Result<()> {
    app.monitor.set_on_missing_routes(Box::new(|missing| {
        tracing::warn!(
            "[Daemon] {} routes need attention; run `pinroutes apply` or enable auto-reapply",
            missing.len()
        );
    }));
    BackgroundServices::start(&app).await;
    wait_for_shutdown(&app).await?;
    BackgroundServices::shutdown(&app).await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown(app: &AppState) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            _ = hangup.recv() => BackgroundServices::reload(app).await,
            _ = terminate.recv() => break,
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_app: &AppState) -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
