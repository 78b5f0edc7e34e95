//! Bulk verify / apply / remove over the rule set.
//!
//! Every public operation takes the reconciler's operation lock, so a toggle
//! action and a monitor-driven reapply never interleave on the same rules.
//! Failures never propagate: they end up as per-rule `Error` statuses, and
//! apply operations additionally return an [`ApplyReport`].

use std::slice;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::executor::{execution_mode, select_executor, CommandResult, Shell};
use crate::core::models::{ExecutionMode, RouteCommand, RouteRule, RouteStatus};
use crate::core::state::RouteState;
use crate::core::validation::{self, ValidationError};
use crate::core::verifier::{self, INVALID_NETWORK};
use crate::error::AppError;

/// Status message when the batch failed without any stderr.
pub const FAILED_TO_APPLY: &str = "Failed to apply";

/// Status message for a rule whose gateway is not a valid IPv4 address.
pub const INVALID_GATEWAY: &str = "Invalid gateway";

/// What happened to one rule during an apply.
#[derive(Debug, Serialize)]
pub struct RuleOutcome {
    pub id: Uuid,
    pub name: String,
    pub status: RouteStatus,
    /// Set when the rule is not active after the apply.
    pub error: Option<AppError>,
}

/// Per-rule outcomes for the rules an apply had to touch. Rules that were
/// already active are not listed.
#[derive(Debug, Default, Serialize)]
pub struct ApplyReport {
    pub outcomes: Vec<RuleOutcome>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.error.is_none())
    }

    pub fn failures(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }
}

pub struct RouteReconciler {
    state: Arc<RouteState>,
    shell: Arc<dyn Shell>,
    ops: Mutex<()>,
}

impl RouteReconciler {
    pub fn new(state: Arc<RouteState>, shell: Arc<dyn Shell>) -> Self {
        state.set_helper_installed(shell.is_helper_installed());
        Self {
            state,
            shell,
            ops: Mutex::new(()),
        }
    }

    pub fn state(&self) -> &Arc<RouteState> {
        &self.state
    }

    pub fn shell(&self) -> &Arc<dyn Shell> {
        &self.shell
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        execution_mode(self.shell.as_ref())
    }

    /// Check a single rule without touching the status map.
    pub async fn verify_route(&self, rule: &RouteRule) -> RouteStatus {
        verifier::verify_route(self.shell.as_ref(), rule).await
    }

    /// Verify every enabled rule and record its status.
    pub async fn verify_all(&self, rules: &[RouteRule]) {
        let _guard = self.ops.lock().await;
        let enabled: Vec<&RouteRule> = rules.iter().filter(|r| r.enabled).collect();
        tracing::info!("[Reconciler] verifyAll: {} enabled rules", enabled.len());
        for rule in enabled {
            let status = self.verify_route(rule).await;
            self.state.set_status(rule.id, status);
        }
    }

    /// Make every enabled rule active, leaving already-active routes alone.
    pub async fn apply_routes(&self, rules: &[RouteRule]) -> ApplyReport {
        let enabled: Vec<RouteRule> = rules.iter().filter(|r| r.enabled).cloned().collect();
        tracing::info!("[Reconciler] applyRoutes: {} enabled rules", enabled.len());
        if enabled.is_empty() {
            tracing::info!("[Reconciler] applyRoutes: no enabled rules, skipping");
            return ApplyReport::default();
        }
        let _guard = self.ops.lock().await;
        self.apply_locked(&enabled).await
    }

    /// Apply one rule regardless of its `enabled` flag, leaving all others untouched.
    pub async fn apply_single_route(&self, rule: &RouteRule) -> ApplyReport {
        tracing::info!(
            "[Reconciler] applySingleRoute '{}': {} via {}",
            rule.name,
            rule.network,
            rule.gateway
        );
        let _guard = self.ops.lock().await;
        self.apply_locked(slice::from_ref(rule)).await
    }

    /// Delete every enabled rule's route and mark it `Missing`.
    pub async fn remove_routes(&self, rules: &[RouteRule]) {
        let enabled: Vec<RouteRule> = rules.iter().filter(|r| r.enabled).cloned().collect();
        if enabled.is_empty() {
            return;
        }
        tracing::info!("[Reconciler] removeRoutes: removing {} routes", enabled.len());
        let _guard = self.ops.lock().await;
        self.remove_locked(&enabled).await;
    }

    /// Delete one rule's route regardless of its `enabled` flag.
    pub async fn remove_single_route(&self, rule: &RouteRule) {
        tracing::info!("[Reconciler] removeSingleRoute '{}': {}", rule.name, rule.network);
        let _guard = self.ops.lock().await;
        self.remove_locked(slice::from_ref(rule)).await;
    }

    async fn apply_locked(&self, rules: &[RouteRule]) -> ApplyReport {
        self.state.set_applying(true);
        let report = self.apply_inner(rules).await;
        self.state.set_applying(false);
        self.state.mark_applied().await;
        tracing::info!("[Reconciler] apply done");
        report
    }

    async fn apply_inner(&self, rules: &[RouteRule]) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut pending: Vec<&RouteRule> = Vec::new();

        for rule in rules {
            if let Err((message, err)) = check_rule(rule) {
                tracing::error!("[Reconciler] '{}': {err}, not applying", rule.name);
                self.state.set_status(rule.id, RouteStatus::Error(message.to_string()));
                report.outcomes.push(RuleOutcome {
                    id: rule.id,
                    name: rule.name.clone(),
                    status: RouteStatus::Error(message.to_string()),
                    error: Some(err.into()),
                });
                continue;
            }
            match self.verify_route(rule).await {
                RouteStatus::Active => self.state.set_status(rule.id, RouteStatus::Active),
                _ => pending.push(rule),
            }
        }

        tracing::info!("[Reconciler] {} routes missing, need to apply", pending.len());
        if pending.is_empty() {
            tracing::info!("[Reconciler] all routes already active");
            return report;
        }

        // Delete first even for new routes so a stale conflicting entry cannot survive.
        let commands: Vec<RouteCommand> = pending
            .iter()
            .flat_map(|rule| [RouteCommand::delete(rule), RouteCommand::add(rule)])
            .collect();
        tracing::info!("[Reconciler] running {} route commands", commands.len());
        let result = self.execute_route_commands(&commands).await;

        for rule in pending {
            let mut status = self.verify_route(rule).await;
            let error = if status == RouteStatus::Active {
                None
            } else if !result.success() {
                let message = if result.error.is_empty() {
                    FAILED_TO_APPLY.to_string()
                } else {
                    result.error.clone()
                };
                tracing::error!(
                    "[Reconciler] '{}' still missing after apply, error: {message}",
                    rule.name
                );
                status = RouteStatus::Error(message);
                result.to_error()
            } else {
                tracing::warn!("[Reconciler] '{}' still missing after a clean apply", rule.name);
                Some(AppError::StillMissingAfterApply(rule.name.clone()))
            };
            self.state.set_status(rule.id, status.clone());
            report.outcomes.push(RuleOutcome {
                id: rule.id,
                name: rule.name.clone(),
                status,
                error,
            });
        }
        report
    }

    async fn remove_locked(&self, rules: &[RouteRule]) {
        self.state.set_applying(true);

        let commands: Vec<RouteCommand> = rules
            .iter()
            .filter(|rule| check_rule(rule).is_ok())
            .map(RouteCommand::delete)
            .collect();
        if !commands.is_empty() {
            let result = self.execute_route_commands(&commands).await;
            tracing::info!("[Reconciler] remove result exit={}", result.exit_code);
        }

        // Already-absent is as good as removed.
        for rule in rules {
            self.state.set_status(rule.id, RouteStatus::Missing);
        }
        self.state.set_applying(false);
    }

    /// The only place that chooses between the helper and ad-hoc elevation.
    async fn execute_route_commands(&self, commands: &[RouteCommand]) -> CommandResult {
        let executor = select_executor(&self.shell);
        self.state
            .set_helper_installed(executor.mode() == ExecutionMode::HelperInstalled);
        let result = executor.execute(commands).await;
        tracing::info!(
            "[Reconciler] {} result exit={} err={}",
            executor.mode(),
            result.exit_code,
            result.error
        );
        result
    }
}

/// Validate a rule before any privileged command is built from it.
fn check_rule(rule: &RouteRule) -> Result<(), (&'static str, ValidationError)> {
    validation::validate_cidr(&rule.network).map_err(|e| (INVALID_NETWORK, e))?;
    if !validation::is_valid_gateway(&rule.gateway) {
        return Err((
            INVALID_GATEWAY,
            ValidationError::InvalidAddress(rule.gateway.clone()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{RouteAction, Settings};
    use crate::core::state::StateEvent;
    use crate::core::testing::FakeShell;

    fn setup(rules: Vec<RouteRule>) -> (Arc<FakeShell>, RouteReconciler) {
        let fake = Arc::new(FakeShell::new());
        let state = Arc::new(RouteState::new(rules, Settings::default()));
        let reconciler = RouteReconciler::new(state, fake.clone());
        (fake, reconciler)
    }

    fn rule(name: &str, network: &str) -> RouteRule {
        RouteRule::new(name, network, "10.255.10.1", true)
    }

    #[tokio::test]
    async fn test_apply_adds_missing_routes_in_one_prompt() {
        let rules = vec![rule("a", "10.1.0.0/16"), rule("b", "10.2.0.0/16")];
        let (fake, reconciler) = setup(rules.clone());

        let report = reconciler.apply_routes(&rules).await;
        assert!(report.is_success());
        assert_eq!(report.outcomes.len(), 2);

        let prompts = fake.privileged_calls();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].len(), 4);
        assert!(prompts[0][0].contains(" delete 10.1.0.0/16 "));
        assert!(prompts[0][1].contains(" add 10.1.0.0/16 "));

        for r in &rules {
            assert_eq!(reconciler.state().status_for(r.id), RouteStatus::Active);
        }
    }

    #[tokio::test]
    async fn test_second_apply_without_drift_issues_no_mutations() {
        let rules = vec![rule("a", "10.1.0.0/16"), rule("b", "10.2.0.0/16")];
        let (fake, reconciler) = setup(rules.clone());

        reconciler.apply_routes(&rules).await;
        fake.clear_log();
        let report = reconciler.apply_routes(&rules).await;

        assert!(report.outcomes.is_empty());
        assert!(fake.mutations().is_empty());
        assert!(fake.privileged_calls().is_empty());
    }

    #[tokio::test]
    async fn test_apply_leaves_healthy_routes_untouched() {
        let rules = vec![rule("healthy", "10.1.0.0/16"), rule("gone", "10.2.0.0/16")];
        let (fake, reconciler) = setup(rules.clone());
        fake.set_route("10.1.0.0", "10.255.10.1");

        reconciler.apply_routes(&rules).await;

        let touched: Vec<String> = fake.mutations().into_iter().map(|(_, n)| n).collect();
        assert_eq!(touched, vec!["10.2.0.0/16".to_string(), "10.2.0.0/16".to_string()]);
    }

    #[tokio::test]
    async fn test_apply_skips_disabled_rules() {
        let mut disabled = rule("off", "10.9.0.0/16");
        disabled.enabled = false;
        let (fake, reconciler) = setup(vec![disabled.clone()]);

        let report = reconciler.apply_routes(&[disabled.clone()]).await;
        assert!(report.outcomes.is_empty());
        assert!(fake.invocations().is_empty());
        assert!(reconciler.state().last_applied().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_prompt_marks_error_with_stderr() {
        let rules = vec![rule("a", "10.1.0.0/16")];
        let (fake, reconciler) = setup(rules.clone());
        fake.deny_elevation();

        let report = reconciler.apply_routes(&rules).await;

        assert_eq!(
            reconciler.state().status_for(rules[0].id),
            RouteStatus::Error("execution error: User canceled. (-128)".into())
        );
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.error.as_ref().unwrap().kind(), "CommandFailure");
    }

    #[tokio::test]
    async fn test_clean_exit_but_absent_route_is_still_missing() {
        let rules = vec![rule("a", "10.1.0.0/16")];
        let (fake, reconciler) = setup(rules.clone());
        fake.ignore_adds_for("10.1.0.0/16");
        // Pre-existing route with the wrong gateway, so the delete leg succeeds too.
        fake.set_route("10.1.0.0", "192.168.0.254");

        let report = reconciler.apply_routes(&rules).await;

        assert_eq!(reconciler.state().status_for(rules[0].id), RouteStatus::Missing);
        assert_eq!(
            report.outcomes[0].error.as_ref().unwrap().kind(),
            "StillMissingAfterApply"
        );
    }

    #[tokio::test]
    async fn test_failed_exit_with_route_present_afterwards_is_active() {
        let rules = vec![rule("a", "10.1.0.0/16"), rule("b", "10.2.0.0/16")];
        let (fake, reconciler) = setup(rules.clone());
        // Last command of the batch fails, so the whole script exits non-zero.
        fake.late_adds_for("10.2.0.0/16");

        let report = reconciler.apply_routes(&rules).await;

        assert_eq!(fake.privileged_calls().len(), 1);
        assert!(report.is_success());
        assert_eq!(report.outcomes.len(), 2);
        for (outcome, rule) in report.outcomes.iter().zip(&rules) {
            assert_eq!(outcome.status, RouteStatus::Active);
            assert!(outcome.error.is_none());
            assert_eq!(reconciler.state().status_for(rule.id), RouteStatus::Active);
        }
    }

    #[tokio::test]
    async fn test_helper_batch_stops_on_failed_add_and_marks_errors() {
        let rules = vec![rule("a", "10.1.0.0/16"), rule("b", "10.2.0.0/16")];
        let (fake, reconciler) = setup(rules.clone());
        fake.set_helper_installed(true);
        fake.fail_adds_for("10.1.0.0/16");

        reconciler.apply_routes(&rules).await;

        assert!(fake.privileged_calls().is_empty());
        assert_eq!(fake.helper_calls().len(), 2);
        let status_a = reconciler.state().status_for(rules[0].id);
        assert!(matches!(status_a, RouteStatus::Error(ref m) if m.contains("Network is unreachable")));
        // The batch exit was non-zero, so the untouched rule is an error too.
        assert!(matches!(
            reconciler.state().status_for(rules[1].id),
            RouteStatus::Error(_)
        ));
        assert!(reconciler.state().helper_installed());
    }

    #[tokio::test]
    async fn test_invalid_rule_never_reaches_a_privileged_command() {
        let bad = RouteRule::new("bad", "10.1.0.0/16", "10.0.0.1; rm -rf /", true);
        let (fake, reconciler) = setup(vec![bad.clone()]);

        let report = reconciler.apply_routes(&[bad.clone()]).await;

        assert!(fake.invocations().is_empty());
        assert_eq!(
            reconciler.state().status_for(bad.id),
            RouteStatus::Error(INVALID_GATEWAY.into())
        );
        assert_eq!(report.outcomes[0].error.as_ref().unwrap().kind(), "Validation");
    }

    #[tokio::test]
    async fn test_remove_always_marks_missing() {
        let rules = vec![rule("present", "10.1.0.0/16"), rule("absent", "10.2.0.0/16")];
        let (fake, reconciler) = setup(rules.clone());
        fake.set_route("10.1.0.0", "10.255.10.1");
        fake.deny_elevation();

        reconciler.remove_routes(&rules).await;

        for r in &rules {
            assert_eq!(reconciler.state().status_for(r.id), RouteStatus::Missing);
        }
        assert!(!reconciler.state().is_applying());
    }

    #[tokio::test]
    async fn test_remove_via_helper_ignores_delete_failures() {
        let rules = vec![rule("present", "10.1.0.0/16"), rule("absent", "10.2.0.0/16")];
        let (fake, reconciler) = setup(rules.clone());
        fake.set_helper_installed(true);
        fake.set_route("10.1.0.0", "10.255.10.1");

        reconciler.remove_routes(&rules).await;

        assert_eq!(fake.helper_calls().len(), 2);
        assert!(fake.gateway_for("10.1.0.0").is_none());
        for r in &rules {
            assert_eq!(reconciler.state().status_for(r.id), RouteStatus::Missing);
        }
    }

    #[tokio::test]
    async fn test_single_route_operations_leave_other_rules_alone() {
        let rules = vec![rule("a", "10.1.0.0/16"), rule("b", "10.2.0.0/16")];
        let (fake, reconciler) = setup(rules.clone());

        reconciler.apply_single_route(&rules[0]).await;
        assert_eq!(reconciler.state().status_for(rules[0].id), RouteStatus::Active);
        assert_eq!(reconciler.state().status_for(rules[1].id), RouteStatus::Unknown);
        assert!(fake.gateway_for("10.2.0.0").is_none());

        let mut disabled = rules[0].clone();
        disabled.enabled = false;
        reconciler.remove_single_route(&disabled).await;
        assert_eq!(reconciler.state().status_for(rules[0].id), RouteStatus::Missing);
        assert!(fake.gateway_for("10.1.0.0").is_none());
        assert_eq!(reconciler.state().status_for(rules[1].id), RouteStatus::Unknown);
    }

    #[tokio::test]
    async fn test_verify_all_skips_disabled_rules() {
        let mut off = rule("off", "10.2.0.0/16");
        off.enabled = false;
        let rules = vec![rule("on", "10.1.0.0/16"), off];
        let (fake, reconciler) = setup(rules.clone());
        fake.set_route("10.1.0.0", "10.255.10.1");

        reconciler.verify_all(&rules).await;

        assert_eq!(reconciler.state().status_for(rules[0].id), RouteStatus::Active);
        assert_eq!(reconciler.state().status_for(rules[1].id), RouteStatus::Unknown);
        assert_eq!(fake.invocations().len(), 1);
    }

    #[tokio::test]
    async fn test_apply_publishes_progress_and_records_timestamp() {
        let rules = vec![rule("a", "10.1.0.0/16")];
        let (_fake, reconciler) = setup(rules.clone());
        let mut rx = reconciler.state().subscribe();

        reconciler.apply_routes(&rules).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.first(), Some(&StateEvent::ApplyingChanged(true)));
        assert!(events.contains(&StateEvent::ApplyingChanged(false)));
        assert!(matches!(events.last(), Some(StateEvent::Applied(_))));
        assert!(!reconciler.state().is_applying());
        assert!(reconciler.state().last_applied().await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_applies_do_not_interleave() {
        let rules = vec![rule("a", "10.1.0.0/16")];
        let (fake, reconciler) = setup(rules.clone());

        tokio::join!(
            reconciler.apply_routes(&rules),
            reconciler.apply_single_route(&rules[0])
        );

        // The second operation observes the first one's result and does nothing.
        let adds = fake
            .mutations()
            .into_iter()
            .filter(|(action, _)| *action == RouteAction::Add)
            .count();
        assert_eq!(adds, 1);
    }
}
