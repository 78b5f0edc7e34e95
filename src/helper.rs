//! Fixed-argument privileged helper: `pinroutes-helper <add|delete> <network/cidr> <gateway>`.
//!
//! Installed setuid root, so every argument is validated before the routing
//! binary is invoked, and nothing else can be run through it.

use std::io::{self, Write};

use thiserror::Error;

use crate::core::models::RouteAction;
use crate::core::validation;

pub const USAGE: &str = "Usage: pinroutes-helper <add|delete> <network/cidr> <gateway>";

/// Exit code for rejected arguments and failed spawns.
pub const HELPER_FAILURE_EXIT_CODE: i32 = 1;

#[derive(Debug, Error, PartialEq)]
pub enum HelperError {
    #[error("Usage: pinroutes-helper <add|delete> <network/cidr> <gateway>")]
    Usage,
    #[error("Error: action must be 'add' or 'delete'")]
    InvalidAction(String),
    #[error("Error: invalid CIDR network '{0}'")]
    InvalidNetwork(String),
    #[error("Error: invalid gateway '{0}'")]
    InvalidGateway(String),
}

/// A validated helper invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperRequest {
    pub action: RouteAction,
    pub network: String,
    pub gateway: String,
}

impl HelperRequest {
    /// Arguments for the routing binary: `-n <action> <network> <gateway>`.
    pub fn route_args(&self) -> [&str; 4] {
        ["-n", self.action.as_str(), &self.network, &self.gateway]
    }
}

/// Validate the positional arguments (program name already stripped).
pub fn parse_args(args: &[String]) -> Result<HelperRequest, HelperError> {
    let [action, network, gateway] = args else {
        return Err(HelperError::Usage);
    };
    let action = RouteAction::parse(action).ok_or_else(|| HelperError::InvalidAction(action.clone()))?;
    if !validation::is_valid_cidr(network) {
        return Err(HelperError::InvalidNetwork(network.clone()));
    }
    if !validation::is_valid_gateway(gateway) {
        return Err(HelperError::InvalidGateway(gateway.clone()));
    }
    Ok(HelperRequest {
        action,
        network: network.clone(),
        gateway: gateway.clone(),
    })
}

/// Validate `args`, then hand the request to `spawn` and return its exit code.
///
/// Rejections and spawn errors are written to `stderr` and exit with 1.
pub fn run<F>(args: &[String], spawn: F, stderr: &mut dyn Write) -> i32
where
    F: FnOnce(&HelperRequest) -> io::Result<i32>,
{
    let request = match parse_args(args) {
        Ok(request) => request,
        Err(e) => {
            let _ = writeln!(stderr, "{e}");
            return HELPER_FAILURE_EXIT_CODE;
        }
    };
    match spawn(&request) {
        Ok(code) => code,
        Err(e) => {
            let _ = writeln!(stderr, "Error: {e}");
            HELPER_FAILURE_EXIT_CODE
        }
    }
}
