//! Periodic drift detection.
//!
//! At most one polling loop runs per monitor: `start` always stops and awaits
//! the previous loop before spawning a new one. The interval is captured at
//! start; the auto-reapply policy is read on every tick. When a
//! [`RuleSource`] is set, the rule list is refreshed from it before each
//! check and again before an auto-reapply.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::config;
use crate::core::models::RouteRule;
use crate::core::notify::{missing_routes_body, Notifier};
use crate::core::reconciler::RouteReconciler;
use crate::core::state::StateEvent;

/// Invoked with the drifted rules when auto-reapply is off.
pub type MissingRoutesCallback = Box<dyn Fn(&[RouteRule]) + Send + Sync>;

/// Brings the in-memory rule list up to date with its persisted copy.
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn refresh(&self);
}

#[derive(Default)]
struct CancelSignal {
    cancelled: AtomicBool,
    wake: Notify,
}

impl CancelSignal {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct PollingTask {
    cancel: Arc<CancelSignal>,
    handle: JoinHandle<()>,
}

impl PollingTask {
    async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!("[Monitor] polling task ended abnormally: {e}");
        }
    }
}

/// Everything one tick needs, cloned into the polling task.
#[derive(Clone)]
struct Checker {
    reconciler: Arc<RouteReconciler>,
    notifier: Arc<dyn Notifier>,
    on_missing: Arc<RwLock<Option<MissingRoutesCallback>>>,
    rule_source: Arc<RwLock<Option<Arc<dyn RuleSource>>>>,
}

impl Checker {
    async fn refresh_rules(&self) {
        let source = self.rule_source.read().ok().and_then(|slot| slot.clone());
        if let Some(source) = source {
            source.refresh().await;
        }
    }

    async fn check(&self) {
        tracing::info!("[Monitor] periodic check running");
        self.refresh_rules().await;
        let state = self.reconciler.state();
        let rules = state.rules().await;
        self.reconciler.verify_all(&rules).await;
        state.mark_checked().await;

        let missing = state.missing_rules().await;
        if missing.is_empty() {
            tracing::info!("[Monitor] all routes active");
            return;
        }

        let names: Vec<&str> = missing.iter().map(|r| r.name.as_str()).collect();
        tracing::warn!("[Monitor] missing routes: {}", names.join(", "));

        if state.settings().await.auto_reapply {
            tracing::info!("[Monitor] auto-reapply enabled, applying routes");
            self.refresh_rules().await;
            // The full rule set, so healthy routes are re-verified as well.
            self.reconciler.apply_routes(&state.rules().await).await;
        } else {
            tracing::info!("[Monitor] notifying user about missing routes");
            self.notifier
                .notify(config::NOTIFICATION_TITLE, &missing_routes_body(&missing))
                .await;
            state.publish(StateEvent::MissingRoutes(missing.clone()));
            if let Ok(callback) = self.on_missing.read() {
                if let Some(callback) = callback.as_ref() {
                    callback(&missing);
                }
            }
        }
    }

    async fn run(self, interval: Duration, cancel: Arc<CancelSignal>, running: Arc<AtomicBool>) {
        while !cancel.is_cancelled() {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.wake.notified() => {}
            }
            if cancel.is_cancelled() {
                break;
            }
            self.check().await;
        }
        running.store(false, Ordering::SeqCst);
        tracing::info!("[Monitor] polling stopped");
    }
}

pub struct RouteMonitor {
    checker: Checker,
    running: Arc<AtomicBool>,
    task: Mutex<Option<PollingTask>>,
}

impl RouteMonitor {
    pub fn new(reconciler: Arc<RouteReconciler>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            checker: Checker {
                reconciler,
                notifier,
                on_missing: Arc::new(RwLock::new(None)),
                rule_source: Arc::new(RwLock::new(None)),
            },
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    pub fn set_on_missing_routes(&self, callback: MissingRoutesCallback) {
        if let Ok(mut slot) = self.checker.on_missing.write() {
            *slot = Some(callback);
        }
    }

    pub fn set_rule_source(&self, source: Arc<dyn RuleSource>) {
        if let Ok(mut slot) = self.checker.rule_source.write() {
            *slot = Some(source);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop any running loop, then poll every `check_interval_seconds`.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if let Some(previous) = task.take() {
            previous.shutdown().await;
        }

        let secs = self
            .checker
            .reconciler
            .state()
            .settings()
            .await
            .check_interval_seconds
            .max(1);
        tracing::info!("[Monitor] starting periodic check every {secs}s");
        self.running.store(true, Ordering::SeqCst);

        let cancel = Arc::new(CancelSignal::default());
        let handle = tokio::spawn(self.checker.clone().run(
            Duration::from_secs(secs),
            Arc::clone(&cancel),
            Arc::clone(&self.running),
        ));
        *task = Some(PollingTask { cancel, handle });
    }

    /// Cancel the loop and wait for it to exit. An in-flight check finishes first.
    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.shutdown().await;
        }
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("[Monitor] stopped");
    }
}
