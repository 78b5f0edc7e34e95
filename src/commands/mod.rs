//! User actions as discrete async calls, organized by functional domain.
//!
//! - `routes`: add / edit / toggle / delete, enable-all / disable-all, apply, verify
//! - `system`: settings, helper install / uninstall, status snapshot
//! - `logic`: pure rule-list functions (unit-testable)
//! - `state`: shared `AppState` definition

pub mod logic;
pub mod routes;
mod state;
pub mod system;

pub use logic::{RuleEdit, RuleInput};
pub use state::AppState;
