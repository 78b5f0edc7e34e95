//! User-facing drift notifications.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::executor::Shell;
use crate::core::models::RouteRule;
use crate::config;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str);
}

/// Body text for a drift notification: `Missing routes: a, b`.
pub fn missing_routes_body(missing: &[RouteRule]) -> String {
    let names: Vec<&str> = missing.iter().map(|r| r.name.as_str()).collect();
    format!("Missing routes: {}", names.join(", "))
}

/// Writes notifications to the log only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, title: &str, body: &str) {
        tracing::warn!("[Notify] {title}: {body}");
    }
}

/// Posts a macOS notification-center banner through `osascript`, and logs it.
pub struct DesktopNotifier {
    shell: Arc<dyn Shell>,
}

impl DesktopNotifier {
    pub fn new(shell: Arc<dyn Shell>) -> Self {
        Self { shell }
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn notify(&self, title: &str, body: &str) {
        tracing::warn!("[Notify] {title}: {body}");
        let result = self.shell.run(&notification_command(title, body)).await;
        if !result.success() {
            tracing::error!("[Notify] failed to send notification: {}", result.error);
        }
    }
}

/// The desktop notifier on macOS, the log notifier elsewhere.
pub fn default_notifier(shell: Arc<dyn Shell>) -> Arc<dyn Notifier> {
    if cfg!(target_os = "macos") {
        Arc::new(DesktopNotifier::new(shell))
    } else {
        Arc::new(LogNotifier)
    }
}

/// `osascript -e 'display notification "<body>" with title "<title>"'` as one shell line.
pub fn notification_command(title: &str, body: &str) -> String {
    let script = format!(
        "display notification \"{}\" with title \"{}\"",
        applescript_escape(body),
        applescript_escape(title)
    );
    format!("{} -e {}", config::OSASCRIPT_BIN, shell_quote(&script))
}

fn applescript_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Single-quote for `sh`; embedded quotes become `'\''`.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
