//! Centralized runtime constants for PinRoutes.
//!
//! Fixed paths, default intervals, and file names are collected here so they
//! can be found and adjusted in a single place rather than scattered across modules.

/// Install location of the privileged route helper.
pub const HELPER_PATH: &str = "/usr/local/bin/pinroutes-helper";

/// File name of the helper binary when shipped next to the main executable.
pub const HELPER_BIN_NAME: &str = "pinroutes-helper";

/// Routing-table command used for lookups and mutations.
pub const ROUTE_BIN: &str = "/sbin/route";

/// Shell used to run unprivileged command lines.
pub const SHELL_BIN: &str = "/bin/bash";

/// AppleScript runner used for ad-hoc elevation and desktop notifications.
pub const OSASCRIPT_BIN: &str = "/usr/bin/osascript";

/// Default interval between monitor checks (seconds).
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// Directory name under the platform config dir.
pub const CONFIG_DIR_NAME: &str = "PinRoutes";

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "PINROUTES_CONFIG_DIR";

/// Persisted rule list.
pub const ROUTES_FILE: &str = "routes.json";

/// Persisted settings object.
pub const SETTINGS_FILE: &str = "settings.json";

/// Maximum number of characters of command stdout/stderr echoed into the log.
pub const LOG_PREVIEW_CHARS: usize = 500;

/// Capacity of the state-change broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Title used for desktop notifications.
pub const NOTIFICATION_TITLE: &str = "PinRoutes";
