//! Unified error type for user actions and the CLI.
//!
//! `AppError` is returned by every action in `commands`. It serializes as
//! `{ "kind": "...", "message": "..." }` so `--json` callers can
//! programmatically distinguish error categories.

use serde::ser::SerializeStruct;

use crate::core::validation::ValidationError;

/// Application-level error.
///
/// Each variant maps to a distinct failure domain. Nothing in the route core
/// is fatal: these surface to callers of user actions, while the reconciler
/// itself degrades failures into per-rule `Error` statuses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed network, gateway, name, or setting. Rejected before any command runs.
    #[error("{0}")]
    Validation(String),

    /// A spawned command exited non-zero.
    #[error("command failed with exit code {exit_code}: {stderr}")]
    CommandFailure { exit_code: i32, stderr: String },

    /// The child process could not be started at all.
    #[error("failed to spawn command: {0}")]
    Spawn(String),

    /// The route command ran but the routing table still disagrees.
    #[error("route '{0}' still missing after apply")]
    StillMissingAfterApply(String),

    /// No rule with the given id (or id prefix).
    #[error("{0}")]
    NotFound(String),

    /// Reading or writing the persisted configuration failed.
    #[error("{0}")]
    Storage(String),

    /// Other I/O and OS-level errors.
    #[error("{0}")]
    Io(String),
}

impl AppError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "Validation",
            AppError::CommandFailure { .. } => "CommandFailure",
            AppError::Spawn(_) => "Spawn",
            AppError::StillMissingAfterApply(_) => "StillMissingAfterApply",
            AppError::NotFound(_) => "NotFound",
            AppError::Storage(_) => "Storage",
            AppError::Io(_) => "Io",
        }
    }
}

/// Custom Serialize: produces `{ "kind": "Variant", "message": "..." }`.
impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

// ---- From implementations for ergonomic error conversion ----

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Storage(format!("{err:#}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}
