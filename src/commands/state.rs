//! Shared application state used by every action.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::executor::Shell;
use crate::core::models::RouteStatus;
use crate::core::monitor::{RouteMonitor, RuleSource};
use crate::core::notify::Notifier;
use crate::core::reconciler::RouteReconciler;
use crate::core::state::RouteState;
use crate::store::ConfigStore;

pub struct AppState {
    pub state: Arc<RouteState>,
    pub reconciler: Arc<RouteReconciler>,
    pub monitor: Arc<RouteMonitor>,
    pub store: ConfigStore,
    /// Serializes read-modify-save of the rule list across actions.
    pub(crate) edits: Arc<Mutex<()>>,
}

/// Re-reads `routes.json` so edits made by another process reach the monitor.
struct StoredRules {
    store: ConfigStore,
    state: Arc<RouteState>,
    edits: Arc<Mutex<()>>,
}

#[async_trait]
impl RuleSource for StoredRules {
    async fn refresh(&self) {
        let _guard = self.edits.lock().await;
        let rules = match self.store.read_rules() {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!("[State] keeping in-memory rules, reload failed: {e:#}");
                return;
            }
        };
        let current = self.state.rules().await;
        if rules == current {
            return;
        }

        for old in &current {
            match rules.iter().find(|r| r.id == old.id) {
                None => self.state.clear_status(old.id),
                Some(new) if !new.enabled => self.state.set_status(old.id, RouteStatus::Missing),
                Some(new) if new.network != old.network || new.gateway != old.gateway => {
                    self.state.clear_status(old.id)
                }
                Some(_) => {}
            }
        }
        tracing::info!(
            "[State] rules changed on disk: {} -> {} rules",
            current.len(),
            rules.len()
        );
        self.state.replace_rules(rules).await;
    }
}

impl AppState {
    /// Load rules and settings from `store` and wire up the core.
    pub fn load(store: ConfigStore, shell: Arc<dyn Shell>, notifier: Arc<dyn Notifier>) -> Self {
        let rules = store.load_rules();
        let settings = store.load_settings();
        let total = rules.len();
        let enabled = rules.iter().filter(|r| r.enabled).count();
        let state = Arc::new(RouteState::new(rules, settings));
        let reconciler = Arc::new(RouteReconciler::new(Arc::clone(&state), shell));
        let monitor = Arc::new(RouteMonitor::new(Arc::clone(&reconciler), notifier));
        let edits = Arc::new(Mutex::new(()));
        monitor.set_rule_source(Arc::new(StoredRules {
            store: store.clone(),
            state: Arc::clone(&state),
            edits: Arc::clone(&edits),
        }));
        tracing::info!(
            "[State] loaded {total} rules ({enabled} enabled), helper={}",
            state.helper_installed()
        );
        Self {
            state,
            reconciler,
            monitor,
            store,
            edits,
        }
    }

    pub fn shell(&self) -> &Arc<dyn Shell> {
        self.reconciler.shell()
    }

    /// Re-read rules and settings from disk. Statuses reset to `Unknown`.
    pub async fn reload(&self) {
        let _guard = self.edits.lock().await;
        let rules = self.store.load_rules();
        let settings = self.store.load_settings();
        self.state.reset_statuses();
        self.state.replace_rules(rules).await;
        self.state.set_settings(settings).await;
        self.state
            .set_helper_installed(self.shell().is_helper_installed());
    }
}

#[cfg(test)]
impl AppState {
    pub(crate) fn for_tests(
        dir: &std::path::Path,
        shell: Arc<crate::core::testing::FakeShell>,
    ) -> Self {
        Self::load(
            ConfigStore::new(dir),
            shell,
            Arc::new(crate::core::testing::RecordingNotifier::default()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{RouteRule, RouteStatus, Settings};
    use crate::core::testing::FakeShell;

    #[tokio::test]
    async fn test_reload_picks_up_disk_changes_and_resets_statuses() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(tmp.path());
        let first = RouteRule::new("a", "10.1.0.0/16", "10.255.10.1", true);
        store.save_rules(&[first.clone()]).unwrap();

        let app = AppState::for_tests(tmp.path(), Arc::new(FakeShell::new()));
        app.state.set_status(first.id, RouteStatus::Active);

        let second = RouteRule::new("b", "10.2.0.0/16", "10.255.10.1", true);
        store.save_rules(&[first.clone(), second]).unwrap();
        let settings = Settings {
            auto_reapply: true,
            ..Settings::default()
        };
        store.save_settings(&settings).unwrap();

        app.reload().await;
        assert_eq!(app.state.rules().await.len(), 2);
        assert_eq!(app.state.settings().await, settings);
        assert_eq!(app.state.status_for(first.id), RouteStatus::Unknown);
    }

    #[tokio::test]
    async fn test_stored_rules_follow_another_writer() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(tmp.path());
        let kept = RouteRule::new("a", "10.1.0.0/16", "10.255.10.1", true);
        let dropped = RouteRule::new("b", "10.2.0.0/16", "10.255.10.1", true);
        store.save_rules(&[kept.clone(), dropped.clone()]).unwrap();

        let app = AppState::for_tests(tmp.path(), Arc::new(FakeShell::new()));
        app.state.set_status(kept.id, RouteStatus::Active);
        app.state.set_status(dropped.id, RouteStatus::Active);
        let source = StoredRules {
            store: store.clone(),
            state: Arc::clone(&app.state),
            edits: Arc::clone(&app.edits),
        };

        let disabled = RouteRule {
            enabled: false,
            ..kept.clone()
        };
        store.save_rules(&[disabled.clone()]).unwrap();
        source.refresh().await;

        assert_eq!(app.state.rules().await, vec![disabled]);
        assert_eq!(app.state.status_for(kept.id), RouteStatus::Missing);
        assert_eq!(app.state.status_for(dropped.id), RouteStatus::Unknown);
    }

    #[tokio::test]
    async fn test_corrupt_rules_file_keeps_in_memory_rules() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(tmp.path());
        let rule = RouteRule::new("a", "10.1.0.0/16", "10.255.10.1", true);
        store.save_rules(&[rule.clone()]).unwrap();
        let app = AppState::for_tests(tmp.path(), Arc::new(FakeShell::new()));

        std::fs::write(tmp.path().join("routes.json"), "not json").unwrap();
        let source = StoredRules {
            store,
            state: Arc::clone(&app.state),
            edits: Arc::clone(&app.edits),
        };
        source.refresh().await;

        assert_eq!(app.state.rules().await, vec![rule]);
    }
}
