//! Pure rule-list logic extracted from the action handlers.
//!
//! These functions take plain parameters (no `AppState`) and can be
//! unit-tested without a runtime.

use uuid::Uuid;

use crate::core::models::{RouteRule, Settings};
use crate::core::validation;
use crate::error::AppError;

pub const NAME_REQUIRED: &str = "Name is required.";
pub const INVALID_CIDR: &str = "Invalid CIDR notation. Use format: x.x.x.x/prefix";
pub const INVALID_GATEWAY: &str = "Invalid gateway IP address.";
pub const INVALID_INTERVAL: &str = "Check interval must be at least 1 second.";

/// User-entered rule fields, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleInput {
    pub name: String,
    pub network: String,
    pub gateway: String,
    pub enabled: bool,
}

/// Partial update for an existing rule. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleEdit {
    pub name: Option<String>,
    pub network: Option<String>,
    pub gateway: Option<String>,
}

/// Trim every field and check name, CIDR, and gateway in that order.
pub fn validate_rule_input(input: &RuleInput) -> Result<RuleInput, AppError> {
    let name = input.name.trim();
    let network = input.network.trim();
    let gateway = input.gateway.trim();

    if name.is_empty() {
        return Err(AppError::Validation(NAME_REQUIRED.into()));
    }
    if !validation::is_valid_cidr(network) {
        return Err(AppError::Validation(INVALID_CIDR.into()));
    }
    if !validation::is_valid_gateway(gateway) {
        return Err(AppError::Validation(INVALID_GATEWAY.into()));
    }
    Ok(RuleInput {
        name: name.to_string(),
        network: network.to_string(),
        gateway: gateway.to_string(),
        enabled: input.enabled,
    })
}

/// Merge `edit` over `rule`, then validate. The id and `enabled` are kept.
pub fn apply_edit(rule: &RouteRule, edit: &RuleEdit) -> Result<RouteRule, AppError> {
    let input = validate_rule_input(&RuleInput {
        name: edit.name.clone().unwrap_or_else(|| rule.name.clone()),
        network: edit.network.clone().unwrap_or_else(|| rule.network.clone()),
        gateway: edit.gateway.clone().unwrap_or_else(|| rule.gateway.clone()),
        enabled: rule.enabled,
    })?;
    Ok(RouteRule {
        id: rule.id,
        name: input.name,
        network: input.network,
        gateway: input.gateway,
        enabled: rule.enabled,
    })
}

/// Replace the rule with the same id, or append it.
pub fn upsert_rule(rules: &mut Vec<RouteRule>, rule: RouteRule) {
    match rules.iter_mut().find(|r| r.id == rule.id) {
        Some(existing) => *existing = rule,
        None => rules.push(rule),
    }
}

/// Flip `enabled` on the rule with `id` and return its new value.
pub fn toggle_rule(rules: &mut [RouteRule], id: Uuid) -> Option<RouteRule> {
    let rule = rules.iter_mut().find(|r| r.id == id)?;
    rule.enabled = !rule.enabled;
    Some(rule.clone())
}

pub fn remove_rule(rules: &mut Vec<RouteRule>, id: Uuid) -> Option<RouteRule> {
    let index = rules.iter().position(|r| r.id == id)?;
    Some(rules.remove(index))
}

pub fn set_all_enabled(rules: &mut [RouteRule], enabled: bool) {
    for rule in rules {
        rule.enabled = enabled;
    }
}

/// Resolve a full UUID or a unique, case-insensitive prefix of one.
pub fn resolve_rule_id(rules: &[RouteRule], query: &str) -> Result<Uuid, AppError> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Err(AppError::NotFound("No rule id given".into()));
    }
    if let Ok(id) = Uuid::parse_str(&query) {
        if rules.iter().any(|r| r.id == id) {
            return Ok(id);
        }
    }
    let matches: Vec<Uuid> = rules
        .iter()
        .map(|r| r.id)
        .filter(|id| id.to_string().starts_with(&query))
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(AppError::NotFound(format!("No rule with id '{query}'"))),
        _ => Err(AppError::Validation(format!(
            "Id prefix '{query}' matches {} rules",
            matches.len()
        ))),
    }
}

pub fn validate_settings(settings: &Settings) -> Result<(), AppError> {
    if settings.check_interval_seconds == 0 {
        return Err(AppError::Validation(INVALID_INTERVAL.into()));
    }
    Ok(())
}
