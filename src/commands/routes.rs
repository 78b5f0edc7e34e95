//! Rule actions: add, edit, toggle, delete, enable/disable all, apply, verify.
//!
//! Each action persists the new rule list before touching the routing table,
//! so the in-memory list never runs ahead of what is on disk.

use serde::Serialize;
use uuid::Uuid;

use crate::core::models::{RouteRule, RouteStatus};
use crate::core::reconciler::ApplyReport;
use crate::core::state::RuleView;
use crate::error::AppError;

use super::logic::{self, RuleEdit, RuleInput};
use super::state::AppState;

/// A rule after an action, with its resulting status.
#[derive(Debug, Serialize)]
pub struct RuleChange {
    pub rule: RouteRule,
    pub status: RouteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ApplyReport>,
}

impl RuleChange {
    fn new(app: &AppState, rule: RouteRule, report: Option<ApplyReport>) -> Self {
        Self {
            status: app.state.status_for(rule.id),
            rule,
            report,
        }
    }
}

async fn commit(app: &AppState, rules: Vec<RouteRule>) -> Result<(), AppError> {
    app.store.save_rules(&rules)?;
    app.state.replace_rules(rules).await;
    Ok(())
}

pub async fn list_rules(app: &AppState) -> Vec<RuleView> {
    app.state.rule_views().await
}

/// Validate, persist, then apply the whole rule set.
pub async fn add_route(app: &AppState, input: RuleInput) -> Result<RuleChange, AppError> {
    let input = logic::validate_rule_input(&input)?;
    let rule = RouteRule::new(input.name, input.network, input.gateway, input.enabled);

    let rules = {
        let _guard = app.edits.lock().await;
        let mut rules = app.state.rules().await;
        logic::upsert_rule(&mut rules, rule.clone());
        commit(app, rules.clone()).await?;
        rules
    };
    tracing::info!(
        "[Actions] added '{}': {} via {} (enabled={})",
        rule.name,
        rule.network,
        rule.gateway,
        rule.enabled
    );

    let report = app.reconciler.apply_routes(&rules).await;
    Ok(RuleChange::new(app, rule, Some(report)))
}

/// Update fields of an existing rule, then apply the whole rule set.
///
/// When an enabled rule's network or gateway changes, the old route is
/// deleted first so it does not linger in the table.
pub async fn edit_route(app: &AppState, id: Uuid, edit: RuleEdit) -> Result<RuleChange, AppError> {
    let (old, rule, rules) = {
        let _guard = app.edits.lock().await;
        let mut rules = app.state.rules().await;
        let old = rules
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| not_found(id))?;
        let rule = logic::apply_edit(&old, &edit)?;
        logic::upsert_rule(&mut rules, rule.clone());
        commit(app, rules.clone()).await?;
        (old, rule, rules)
    };
    tracing::info!("[Actions] edited '{}': {} via {}", rule.name, rule.network, rule.gateway);

    if old.enabled && (old.network != rule.network || old.gateway != rule.gateway) {
        app.reconciler.remove_single_route(&old).await;
    }
    let report = app.reconciler.apply_routes(&rules).await;
    Ok(RuleChange::new(app, rule, Some(report)))
}

/// Flip `enabled`, persist, then apply or remove just this rule.
pub async fn toggle_route(app: &AppState, id: Uuid) -> Result<RuleChange, AppError> {
    let rule = {
        let _guard = app.edits.lock().await;
        let mut rules = app.state.rules().await;
        let rule = logic::toggle_rule(&mut rules, id).ok_or_else(|| not_found(id))?;
        commit(app, rules).await?;
        rule
    };
    tracing::info!("[Actions] toggled '{}' -> enabled={}", rule.name, rule.enabled);

    if rule.enabled {
        let report = app.reconciler.apply_single_route(&rule).await;
        Ok(RuleChange::new(app, rule, Some(report)))
    } else {
        app.reconciler.remove_single_route(&rule).await;
        Ok(RuleChange::new(app, rule, None))
    }
}

/// Drop the rule, persist, then remove its route if it was enabled.
pub async fn delete_route(app: &AppState, id: Uuid) -> Result<RouteRule, AppError> {
    let removed = {
        let _guard = app.edits.lock().await;
        let mut rules = app.state.rules().await;
        let removed = logic::remove_rule(&mut rules, id).ok_or_else(|| not_found(id))?;
        commit(app, rules).await?;
        removed
    };
    tracing::info!("[Actions] deleted '{}'", removed.name);

    if removed.enabled {
        app.reconciler.remove_single_route(&removed).await;
    }
    app.state.clear_status(id);
    Ok(removed)
}

pub async fn enable_all(app: &AppState) -> Result<ApplyReport, AppError> {
    let rules = {
        let _guard = app.edits.lock().await;
        let mut rules = app.state.rules().await;
        logic::set_all_enabled(&mut rules, true);
        commit(app, rules.clone()).await?;
        rules
    };
    tracing::info!("[Actions] enabled all {} rules", rules.len());
    Ok(app.reconciler.apply_routes(&rules).await)
}

/// Mark all rules disabled, persist, then remove the routes that were enabled.
pub async fn disable_all(app: &AppState) -> Result<(), AppError> {
    let enabled = {
        let _guard = app.edits.lock().await;
        let mut rules = app.state.rules().await;
        let enabled: Vec<RouteRule> = rules.iter().filter(|r| r.enabled).cloned().collect();
        logic::set_all_enabled(&mut rules, false);
        commit(app, rules).await?;
        enabled
    };
    tracing::info!("[Actions] disabled all rules ({} were enabled)", enabled.len());

    app.reconciler.remove_routes(&enabled).await;
    Ok(())
}

pub async fn apply_all(app: &AppState) -> ApplyReport {
    let rules = app.state.rules().await;
    app.reconciler.apply_routes(&rules).await
}

pub async fn verify_all(app: &AppState) -> Vec<RuleView> {
    let rules = app.state.rules().await;
    app.reconciler.verify_all(&rules).await;
    app.state.rule_views().await
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("No rule with id '{id}'"))
}
