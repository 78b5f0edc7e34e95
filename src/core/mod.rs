//! Core logic: validation, route verification, reconciliation, monitoring.
//!
//! - [`validation`]: IPv4 / CIDR / gateway validators
//! - [`RouteState`]: rules, statuses, and progress flags with change events
//! - [`Shell`] / [`RouteExecutor`]: process spawning and the helper-vs-prompt strategy
//! - [`verify_route`]: one rule against the live routing table
//! - [`RouteReconciler`]: bulk verify / apply / remove
//! - [`RouteMonitor`]: cancellable periodic drift check
//! - [`Notifier`]: drift notifications

pub mod executor;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod reconciler;
pub mod state;
pub mod validation;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use executor::{CommandResult, RouteExecutor, Shell, SystemShell};
pub use models::{ExecutionMode, RouteCommand, RouteRule, RouteStatus, Settings};
pub use monitor::RouteMonitor;
pub use notify::Notifier;
pub use reconciler::{ApplyReport, RouteReconciler};
pub use state::{RouteState, StateEvent};
pub use verifier::verify_route;
