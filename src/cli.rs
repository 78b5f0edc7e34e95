//! Command-line surface: argument parsing and output formatting.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::commands::{self, routes, system, AppState, RuleEdit, RuleInput};
use crate::core::executor::{Shell, SystemShell};
use crate::core::notify::default_notifier;
use crate::core::reconciler::ApplyReport;
use crate::core::state::RuleView;
use crate::error::AppError;
use crate::services;
use crate::store::ConfigStore;

#[derive(Parser, Debug)]
#[command(
    name = "pinroutes",
    version = env!("CARGO_PKG_VERSION"),
    about = "Keep static routes pinned in the host routing table"
)]
pub struct Cli {
    /// Configuration directory (default: $PINROUTES_CONFIG_DIR or the platform config dir)
    #[arg(long, value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Apply enabled routes and keep them pinned until interrupted
    Daemon,

    /// List configured rules
    List,

    /// Verify every enabled rule and show the overall status
    Status,

    /// Add a rule and apply it
    Add {
        #[arg(long)]
        name: String,

        /// Destination in CIDR notation, e.g. 10.255.255.0/24
        #[arg(long)]
        network: String,

        /// Gateway IPv4 address
        #[arg(long)]
        gateway: String,

        /// Save the rule without enabling it
        #[arg(long)]
        disabled: bool,
    },

    /// Change fields of an existing rule
    Edit {
        /// Rule id or unique id prefix
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        network: Option<String>,

        #[arg(long)]
        gateway: Option<String>,
    },

    /// Delete a rule, removing its route if enabled
    Delete {
        /// Rule id or unique id prefix
        id: String,
    },

    /// Enable or disable a rule
    Toggle {
        /// Rule id or unique id prefix
        id: String,
    },

    /// Enable every rule and apply
    EnableAll,

    /// Remove every enabled route and disable all rules
    DisableAll,

    /// Apply all enabled rules
    Apply,

    /// Verify all enabled rules against the routing table
    Verify,

    /// Show or change monitor settings
    Settings {
        #[arg(long)]
        monitoring: Option<Switch>,

        /// Seconds between checks
        #[arg(long)]
        interval: Option<u64>,

        #[arg(long)]
        auto_reapply: Option<Switch>,
    },

    /// Install the privileged helper (one administrator prompt)
    InstallHelper {
        /// Helper binary to install (default: next to this executable)
        #[arg(long, value_name = "PATH")]
        source: Option<PathBuf>,
    },

    /// Remove the privileged helper
    UninstallHelper,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

impl From<Switch> for bool {
    fn from(s: Switch) -> bool {
        s == Switch::On
    }
}

/// Build the application state and run one command.
pub async fn dispatch(cli: Cli) -> ExitCode {
    let store = match ConfigStore::resolve(cli.config_dir.clone()) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    let shell: Arc<dyn Shell> = Arc::new(SystemShell::new());
    let notifier = default_notifier(Arc::clone(&shell));
    let app = Arc::new(AppState::load(store, shell, notifier));

    match execute(&app, cli.command, cli.json).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            if cli.json {
                print_json(&serde_json::json!({ "error": e }));
            } else {
                eprintln!("Error: {e}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Run `command`. `Ok(false)` means it ran but some rule did not become active.
pub async fn execute(app: &Arc<AppState>, command: Commands, json: bool) -> Result<bool, AppError> {
    let out = Output { json };
    match command {
        Commands::Daemon => {
            services::run_daemon(Arc::clone(app))
                .await
                .map_err(|e| AppError::Io(format!("{e:#}")))?;
            Ok(true)
        }
        Commands::List => {
            out.rules(&routes::list_rules(app).await);
            Ok(true)
        }
        Commands::Status => {
            routes::verify_all(app).await;
            let snapshot = system::status(app).await;
            if json {
                print_json(&snapshot);
            } else {
                println!("{}", snapshot.overall);
                println!(
                    "mode: {}  monitoring: {}  interval: {}s  auto-reapply: {}",
                    snapshot.mode,
                    on_off(snapshot.settings.monitoring_enabled),
                    snapshot.settings.check_interval_seconds,
                    on_off(snapshot.settings.auto_reapply)
                );
                println!("config: {}", snapshot.config_dir.display());
                out.rules(&snapshot.rules);
            }
            Ok(true)
        }
        Commands::Add { name, network, gateway, disabled } => {
            let input = RuleInput {
                name,
                network,
                gateway,
                enabled: !disabled,
            };
            let change = routes::add_route(app, input).await?;
            Ok(out.change(&change))
        }
        Commands::Edit { id, name, network, gateway } => {
            let id = resolve(app, &id).await?;
            let change = routes::edit_route(app, id, RuleEdit { name, network, gateway }).await?;
            Ok(out.change(&change))
        }
        Commands::Delete { id } => {
            let id = resolve(app, &id).await?;
            let removed = routes::delete_route(app, id).await?;
            if json {
                print_json(&removed);
            } else {
                println!("Deleted '{}'", removed.name);
            }
            Ok(true)
        }
        Commands::Toggle { id } => {
            let id = resolve(app, &id).await?;
            let change = routes::toggle_route(app, id).await?;
            Ok(out.change(&change))
        }
        Commands::EnableAll => {
            let report = routes::enable_all(app).await?;
            Ok(out.report(&report))
        }
        Commands::DisableAll => {
            routes::disable_all(app).await?;
            out.rules(&routes::list_rules(app).await);
            Ok(true)
        }
        Commands::Apply => {
            let report = routes::apply_all(app).await;
            Ok(out.report(&report))
        }
        Commands::Verify => {
            let views = routes::verify_all(app).await;
            out.rules(&views);
            Ok(views.iter().all(|v| !v.rule.enabled || !v.status.is_drifted()))
        }
        Commands::Settings { monitoring, interval, auto_reapply } => {
            let mut settings = app.state.settings().await;
            let changed = monitoring.is_some() || interval.is_some() || auto_reapply.is_some();
            if changed {
                if let Some(m) = monitoring {
                    settings.monitoring_enabled = m.into();
                }
                if let Some(i) = interval {
                    settings.check_interval_seconds = i;
                }
                if let Some(a) = auto_reapply {
                    settings.auto_reapply = a.into();
                }
                settings = system::update_settings(app, settings).await?;
                // This process only persists; a running daemon picks it up on SIGHUP.
                app.monitor.stop().await;
            }
            if json {
                print_json(&settings);
            } else {
                println!(
                    "monitoring: {}  interval: {}s  auto-reapply: {}",
                    on_off(settings.monitoring_enabled),
                    settings.check_interval_seconds,
                    on_off(settings.auto_reapply)
                );
            }
            Ok(true)
        }
        Commands::InstallHelper { source } => {
            let mode = system::install_helper(app, source).await?;
            out.message(&format!("Helper installed; route changes now use {mode}"), &mode);
            Ok(true)
        }
        Commands::UninstallHelper => {
            let mode = system::uninstall_helper(app).await?;
            out.message(&format!("Helper removed; route changes now use {mode}"), &mode);
            Ok(true)
        }
    }
}

async fn resolve(app: &AppState, query: &str) -> Result<uuid::Uuid, AppError> {
    commands::logic::resolve_rule_id(&app.state.rules().await, query)
}

struct Output {
    json: bool,
}

impl Output {
    fn rules(&self, views: &[RuleView]) {
        if self.json {
            print_json(&views);
            return;
        }
        if views.is_empty() {
            println!("No routes configured");
            return;
        }
        for view in views {
            println!("{}", format_rule_line(view));
        }
    }

    /// Print one rule change and return whether it ended up where it should.
    fn change(&self, change: &routes::RuleChange) -> bool {
        if self.json {
            print_json(change);
        } else {
            println!(
                "{} '{}' {} via {}: {}",
                short_id(&change.rule.id),
                change.rule.name,
                change.rule.network,
                change.rule.gateway,
                change.status
            );
        }
        change.report.as_ref().map_or(true, ApplyReport::is_success)
    }

    fn report(&self, report: &ApplyReport) -> bool {
        if self.json {
            print_json(report);
        } else if report.outcomes.is_empty() {
            println!("All enabled routes already active");
        } else {
            for outcome in &report.outcomes {
                match &outcome.error {
                    None => println!("{}: {}", outcome.name, outcome.status),
                    Some(e) => println!("{}: {} ({e})", outcome.name, outcome.status),
                }
            }
        }
        report.is_success()
    }

    fn message<T: Serialize>(&self, text: &str, value: &T) {
        if self.json {
            print_json(&serde_json::json!({ "message": text, "result": value }));
        } else {
            println!("{text}");
        }
    }
}

/// `1a2b3c4d  on   office              10.255.255.0/24    via 10.255.10.1      active`
pub fn format_rule_line(view: &RuleView) -> String {
    format!(
        "{}  {:<3}  {:<18}  {:<18}  via {:<15}  {}",
        short_id(&view.rule.id),
        on_off(view.rule.enabled),
        view.rule.name,
        view.rule.network,
        view.rule.gateway,
        view.status
    )
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("Error: failed to encode output: {e}"),
    }
}
