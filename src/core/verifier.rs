//! Checks one rule against the live routing table.
//!
//! No retries here: a failed lookup is reported as `Missing` and the
//! reconciler decides what to do about it.

use std::collections::HashMap;

use crate::config;
use crate::core::executor::Shell;
use crate::core::models::{RouteRule, RouteStatus};
use crate::core::validation;

/// Status reported for a rule whose network cannot be used in a lookup.
pub const INVALID_NETWORK: &str = "Invalid network";

/// `route -n get <destination>`.
pub fn route_get_command(destination: &str) -> String {
    format!("{} -n get {destination}", config::ROUTE_BIN)
}

/// Parse `key: value` lines into a lowercase map. Lines without a colon are skipped.
pub fn parse_route_output(output: &str) -> HashMap<String, String> {
    output
        .to_lowercase()
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Query the routing table for `rule.network` and compare destination and gateway.
pub async fn verify_route(shell: &dyn Shell, rule: &RouteRule) -> RouteStatus {
    // The destination is interpolated into a shell line, so anything that is
    // not a plain dotted-quad is rejected before a command runs.
    let network = match validation::network_address(&rule.network) {
        Ok(address) if validation::is_valid_ipv4(address) => address,
        _ => {
            tracing::error!(
                "[Verifier] '{}': invalid network '{}'",
                rule.name,
                rule.network
            );
            return RouteStatus::Error(INVALID_NETWORK.to_string());
        }
    };

    let result = shell.run(&route_get_command(network)).await;
    if !result.success() {
        tracing::warn!(
            "[Verifier] '{}': route get failed exit={} err={}",
            rule.name,
            result.exit_code,
            result.error
        );
        return RouteStatus::Missing;
    }

    let fields = parse_route_output(&result.output);
    let destination = fields.get("destination").map(String::as_str);
    let gateway = fields.get("gateway").map(String::as_str);
    let dest_match = destination == Some(network.to_lowercase().as_str());
    let gw_match = gateway == Some(rule.gateway.to_lowercase().as_str());

    tracing::debug!(
        "[Verifier] '{}': destination={:?} expected={} gateway={:?} expected={}",
        rule.name,
        destination,
        network,
        gateway,
        rule.gateway
    );

    if dest_match && gw_match {
        tracing::info!("[Verifier] '{}': ACTIVE", rule.name);
        RouteStatus::Active
    } else {
        tracing::info!(
            "[Verifier] '{}': MISSING (destination={dest_match} gateway={gw_match})",
            rule.name
        );
        RouteStatus::Missing
    }
}
