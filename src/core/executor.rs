//! Child-process execution: unprivileged, via the installed helper, or via a
//! one-time administrator prompt.
//!
//! A non-zero exit code is data, not an error. Spawn failures are folded into
//! the same shape with exit code `-1` and the OS error text in `error`.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;

use crate::config;
use crate::core::models::{ExecutionMode, RouteAction, RouteCommand};
use crate::error::AppError;

/// Exit code reported when the child could not be started.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = -1;

/// Captured result of one child-process invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub exit_code: i32,
    /// Trimmed stdout.
    pub output: String,
    /// Trimmed stderr.
    pub error: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn spawn_failure(err: impl std::fmt::Display) -> Self {
        Self {
            exit_code: SPAWN_FAILURE_EXIT_CODE,
            output: String::new(),
            error: err.to_string(),
        }
    }

    /// `None` on success, otherwise the matching `AppError`.
    pub fn to_error(&self) -> Option<AppError> {
        match self.exit_code {
            0 => None,
            SPAWN_FAILURE_EXIT_CODE => Some(AppError::Spawn(self.error.clone())),
            code => Some(AppError::CommandFailure {
                exit_code: code,
                stderr: self.error.clone(),
            }),
        }
    }

    fn from_output(output: Output) -> Self {
        Self {
            // Killed by a signal: no code, treat like a failed start.
            exit_code: output.status.code().unwrap_or(SPAWN_FAILURE_EXIT_CODE),
            output: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            error: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

/// Process-spawning seam. `SystemShell` is the real implementation.
#[async_trait]
pub trait Shell: Send + Sync {
    /// Run one command line unprivileged through the system shell.
    async fn run(&self, command: &str) -> CommandResult;

    /// Run all command lines joined with `;` under a single elevation prompt.
    async fn run_privileged(&self, commands: &[String]) -> CommandResult;

    /// Invoke the installed helper with its three positional arguments.
    async fn run_via_helper(&self, args: [&str; 3]) -> CommandResult;

    /// Where the helper lives (or would be installed).
    fn helper_path(&self) -> &Path;

    /// True iff the helper file exists and is executable by the current user.
    fn is_helper_installed(&self) -> bool;
}

/// Spawns real child processes with `tokio::process`.
pub struct SystemShell {
    helper_path: PathBuf,
}

impl SystemShell {
    pub fn new() -> Self {
        Self::with_helper_path(config::HELPER_PATH)
    }

    pub fn with_helper_path(path: impl Into<PathBuf>) -> Self {
        Self {
            helper_path: path.into(),
        }
    }
}

impl Default for SystemShell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Shell for SystemShell {
    async fn run(&self, command: &str) -> CommandResult {
        tracing::info!("[Shell] run: {command}");
        let result = spawn_captured(Command::new(config::SHELL_BIN).arg("-c").arg(command)).await;
        log_result("run", &result);
        result
    }

    async fn run_privileged(&self, commands: &[String]) -> CommandResult {
        let script = elevation_script(commands);
        tracing::info!("[Shell] runPrivileged: {}", commands.join(" ; "));
        tracing::debug!("[Shell] runPrivileged script: {script}");
        let result = spawn_captured(Command::new(config::OSASCRIPT_BIN).arg("-e").arg(&script)).await;
        log_result("runPrivileged", &result);
        result
    }

    async fn run_via_helper(&self, args: [&str; 3]) -> CommandResult {
        tracing::info!(
            "[Shell] runViaHelper: {} {}",
            self.helper_path.display(),
            args.join(" ")
        );
        let result = spawn_captured(Command::new(&self.helper_path).args(args)).await;
        log_result("runViaHelper", &result);
        result
    }

    fn helper_path(&self) -> &Path {
        &self.helper_path
    }

    fn is_helper_installed(&self) -> bool {
        is_executable_file(&self.helper_path)
    }
}

async fn spawn_captured(command: &mut Command) -> CommandResult {
    match command.output().await {
        Ok(output) => CommandResult::from_output(output),
        Err(e) => CommandResult::spawn_failure(e),
    }
}

fn log_result(what: &str, result: &CommandResult) {
    let out = preview(&result.output);
    let err = preview(&result.error);
    if result.success() {
        tracing::info!("[Shell] {what} exit={} stdout={out} stderr={err}", result.exit_code);
    } else {
        tracing::warn!("[Shell] {what} exit={} stdout={out} stderr={err}", result.exit_code);
    }
}

fn preview(s: &str) -> String {
    s.chars().take(config::LOG_PREVIEW_CHARS).collect()
}

/// AppleScript that runs the joined command lines with administrator privileges.
pub fn elevation_script(commands: &[String]) -> String {
    let joined = commands.join(" ; ");
    let escaped = joined.replace('\\', "\\\\").replace('"', "\\\"");
    format!("do shell script \"{escaped}\" with administrator privileges")
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};
    path.is_file() && access(path, AccessFlags::X_OK).is_ok()
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

/// The route-mutation path currently in effect.
pub fn execution_mode(shell: &dyn Shell) -> ExecutionMode {
    if shell.is_helper_installed() {
        ExecutionMode::HelperInstalled
    } else {
        ExecutionMode::AdHocElevation
    }
}

// ---------------------------------------------------------------------------
// Route execution strategies
// ---------------------------------------------------------------------------

/// Runs a batch of route mutations. Callers only see the combined result.
#[async_trait]
pub trait RouteExecutor: Send + Sync {
    fn mode(&self) -> ExecutionMode;

    async fn execute(&self, commands: &[RouteCommand]) -> CommandResult;
}

/// Sends commands one at a time to the installed helper. A failing `add`
/// stops the batch; failing deletes are tolerated.
pub struct HelperExecutor {
    shell: Arc<dyn Shell>,
}

impl HelperExecutor {
    pub fn new(shell: Arc<dyn Shell>) -> Self {
        Self { shell }
    }
}

#[async_trait]
impl RouteExecutor for HelperExecutor {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::HelperInstalled
    }

    async fn execute(&self, commands: &[RouteCommand]) -> CommandResult {
        tracing::info!("[Executor] using helper for {} commands", commands.len());
        let mut last = CommandResult::default();
        for cmd in commands {
            last = self.shell.run_via_helper(cmd.helper_args()).await;
            if !last.success() && cmd.action != RouteAction::Delete {
                tracing::warn!(
                    "[Executor] helper {} {} failed, stopping batch",
                    cmd.action,
                    cmd.network
                );
                return last;
            }
        }
        last
    }
}

/// Bundles all commands into one administrator prompt.
pub struct AdHocExecutor {
    shell: Arc<dyn Shell>,
}

impl AdHocExecutor {
    pub fn new(shell: Arc<dyn Shell>) -> Self {
        Self { shell }
    }
}

#[async_trait]
impl RouteExecutor for AdHocExecutor {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::AdHocElevation
    }

    async fn execute(&self, commands: &[RouteCommand]) -> CommandResult {
        if commands.is_empty() {
            return CommandResult::default();
        }
        tracing::info!("[Executor] using privileged shell for {} commands", commands.len());
        let lines: Vec<String> = commands.iter().map(RouteCommand::shell_line).collect();
        self.shell.run_privileged(&lines).await
    }
}

/// Prefer the helper whenever it is installed.
pub fn select_executor(shell: &Arc<dyn Shell>) -> Box<dyn RouteExecutor> {
    match execution_mode(shell.as_ref()) {
        ExecutionMode::HelperInstalled => Box::new(HelperExecutor::new(Arc::clone(shell))),
        ExecutionMode::AdHocElevation => Box::new(AdHocExecutor::new(Arc::clone(shell))),
    }
}

// ---------------------------------------------------------------------------
// Helper installation
// ---------------------------------------------------------------------------

/// Helper binary shipped next to the running executable, if it can be located.
pub fn default_helper_source() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join(config::HELPER_BIN_NAME))
}

/// Copy the helper into place and make it setuid root, under one prompt.
pub async fn install_helper(shell: &dyn Shell, source: &Path) -> CommandResult {
    if !source.is_file() {
        return CommandResult::spawn_failure(format!(
            "Could not locate {} at {}",
            config::HELPER_BIN_NAME,
            source.display()
        ));
    }
    let target = shell.helper_path().display().to_string();
    let commands = vec![
        format!("cp \"{}\" \"{target}\"", source.display()),
        format!("chown root:wheel \"{target}\""),
        format!("chmod 4755 \"{target}\""),
    ];
    shell.run_privileged(&commands).await
}

/// Remove the installed helper under one prompt.
pub async fn uninstall_helper(shell: &dyn Shell) -> CommandResult {
    let target = shell.helper_path().display().to_string();
    shell.run_privileged(&[format!("rm -f \"{target}\"")]).await
}
