//! Shared rule list, per-rule statuses, and progress flags.
//!
//! Statuses live in a `DashMap` keyed by rule id so readers never wait on a
//! running apply. Writes happen only from the reconciler, which serializes its
//! operations; every write is published on a broadcast channel.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::config;
use crate::core::models::{RouteRule, RouteStatus, Settings};

/// Change notifications for presentation-layer subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    StatusChanged { id: Uuid, status: RouteStatus },
    ApplyingChanged(bool),
    Checked(DateTime<Utc>),
    Applied(DateTime<Utc>),
    RulesChanged,
    MissingRoutes(Vec<RouteRule>),
}

/// One rule with its current status, for display.
#[derive(Debug, Clone, Serialize)]
pub struct RuleView {
    #[serde(flatten)]
    pub rule: RouteRule,
    pub status: RouteStatus,
}

pub struct RouteState {
    rules: RwLock<Vec<RouteRule>>,
    settings: RwLock<Settings>,
    statuses: DashMap<Uuid, RouteStatus>,
    is_applying: AtomicBool,
    helper_installed: AtomicBool,
    last_checked: RwLock<Option<DateTime<Utc>>>,
    last_applied: RwLock<Option<DateTime<Utc>>>,
    events: broadcast::Sender<StateEvent>,
}

impl RouteState {
    pub fn new(rules: Vec<RouteRule>, settings: Settings) -> Self {
        let (events, _) = broadcast::channel(config::EVENT_CHANNEL_CAPACITY);
        Self {
            rules: RwLock::new(rules),
            settings: RwLock::new(settings),
            statuses: DashMap::new(),
            is_applying: AtomicBool::new(false),
            helper_installed: AtomicBool::new(false),
            last_checked: RwLock::new(None),
            last_applied: RwLock::new(None),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: StateEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ---- rules ----

    pub async fn rules(&self) -> Vec<RouteRule> {
        self.rules.read().await.clone()
    }

    pub async fn enabled_rules(&self) -> Vec<RouteRule> {
        self.rules.read().await.iter().filter(|r| r.enabled).cloned().collect()
    }

    pub async fn rule(&self, id: Uuid) -> Option<RouteRule> {
        self.rules.read().await.iter().find(|r| r.id == id).cloned()
    }

    pub async fn replace_rules(&self, rules: Vec<RouteRule>) {
        *self.rules.write().await = rules;
        self.publish(StateEvent::RulesChanged);
    }

    /// Apply `f` to the rule list under the write lock and return its result.
    pub async fn update_rules<T>(&self, f: impl FnOnce(&mut Vec<RouteRule>) -> T) -> T {
        let out = {
            let mut rules = self.rules.write().await;
            f(&mut rules)
        };
        self.publish(StateEvent::RulesChanged);
        out
    }

    /// Non-empty and every rule enabled.
    pub async fn all_enabled(&self) -> bool {
        let rules = self.rules.read().await;
        !rules.is_empty() && rules.iter().all(|r| r.enabled)
    }

    /// Empty or no rule enabled.
    pub async fn all_disabled(&self) -> bool {
        self.rules.read().await.iter().all(|r| !r.enabled)
    }

    // ---- settings ----

    pub async fn settings(&self) -> Settings {
        *self.settings.read().await
    }

    pub async fn set_settings(&self, settings: Settings) {
        *self.settings.write().await = settings;
    }

    // ---- statuses ----

    pub fn status_for(&self, id: Uuid) -> RouteStatus {
        self.statuses.get(&id).map(|s| s.clone()).unwrap_or_default()
    }

    pub(crate) fn set_status(&self, id: Uuid, status: RouteStatus) {
        self.statuses.insert(id, status.clone());
        self.publish(StateEvent::StatusChanged { id, status });
    }

    pub(crate) fn clear_status(&self, id: Uuid) {
        self.statuses.remove(&id);
    }

    /// Statuses reset to `Unknown` (e.g. after reloading rules from disk).
    pub fn reset_statuses(&self) {
        self.statuses.clear();
    }

    /// Enabled rules whose status is `Missing` or `Error`.
    pub async fn missing_rules(&self) -> Vec<RouteRule> {
        self.rules
            .read()
            .await
            .iter()
            .filter(|r| r.enabled && self.status_for(r.id).is_drifted())
            .cloned()
            .collect()
    }

    pub async fn has_missing_routes(&self) -> bool {
        !self.missing_rules().await.is_empty()
    }

    pub async fn rule_views(&self) -> Vec<RuleView> {
        self.rules
            .read()
            .await
            .iter()
            .map(|r| RuleView {
                rule: r.clone(),
                status: self.status_for(r.id),
            })
            .collect()
    }

    // ---- flags & timestamps ----

    pub fn is_applying(&self) -> bool {
        self.is_applying.load(Ordering::SeqCst)
    }

    pub(crate) fn set_applying(&self, applying: bool) {
        self.is_applying.store(applying, Ordering::SeqCst);
        self.publish(StateEvent::ApplyingChanged(applying));
    }

    pub fn helper_installed(&self) -> bool {
        self.helper_installed.load(Ordering::SeqCst)
    }

    pub fn set_helper_installed(&self, installed: bool) {
        self.helper_installed.store(installed, Ordering::SeqCst);
    }

    pub async fn last_checked(&self) -> Option<DateTime<Utc>> {
        *self.last_checked.read().await
    }

    pub(crate) async fn mark_checked(&self) {
        let now = Utc::now();
        *self.last_checked.write().await = Some(now);
        self.publish(StateEvent::Checked(now));
    }

    pub async fn last_applied(&self) -> Option<DateTime<Utc>> {
        *self.last_applied.read().await
    }

    pub(crate) async fn mark_applied(&self) {
        let now = Utc::now();
        *self.last_applied.write().await = Some(now);
        self.publish(StateEvent::Applied(now));
    }

    /// One-line summary for status bars and the CLI.
    pub async fn overall_status(&self) -> String {
        if self.is_applying() {
            return "Applying routes...".to_string();
        }
        let rules = self.rules.read().await;
        summarize(&rules, |id| self.status_for(id))
    }
}

/// Summary line for a rule list given a status lookup.
pub fn summarize(rules: &[RouteRule], status_for: impl Fn(Uuid) -> RouteStatus) -> String {
    if rules.is_empty() {
        return "No routes configured".to_string();
    }
    let enabled: Vec<&RouteRule> = rules.iter().filter(|r| r.enabled).collect();
    if enabled.is_empty() {
        return "No routes enabled".to_string();
    }
    let active = enabled
        .iter()
        .filter(|r| status_for(r.id) == RouteStatus::Active)
        .count();
    if active == enabled.len() {
        format!("All routes active ({active})")
    } else {
        format!("{active}/{} routes active", enabled.len())
    }
}
