//! In-memory `Shell` that simulates the kernel route table for tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config;
use crate::core::executor::{CommandResult, Shell};
use crate::core::models::RouteAction;
use crate::core::notify::Notifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Run(String),
    Privileged(Vec<String>),
    Helper([String; 3]),
}

/// Route table keyed by destination address, plus a log of every invocation.
#[derive(Default)]
pub struct FakeShell {
    table: Mutex<HashMap<String, String>>,
    invocations: Mutex<Vec<Invocation>>,
    fail_adds: Mutex<HashSet<String>>,
    ignore_adds: Mutex<HashSet<String>>,
    late_adds: Mutex<HashSet<String>>,
    helper_installed: AtomicBool,
    deny_elevation: AtomicBool,
    mutations: Mutex<Vec<(RouteAction, String)>>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_route(&self, destination: &str, gateway: &str) {
        self.table
            .lock()
            .unwrap()
            .insert(destination.to_string(), gateway.to_string());
    }

    pub fn remove_route(&self, destination: &str) {
        self.table.lock().unwrap().remove(destination);
    }

    pub fn gateway_for(&self, destination: &str) -> Option<String> {
        self.table.lock().unwrap().get(destination).cloned()
    }

    pub fn set_helper_installed(&self, installed: bool) {
        self.helper_installed.store(installed, Ordering::SeqCst);
    }

    /// The elevation prompt is cancelled by the user.
    pub fn deny_elevation(&self) {
        self.deny_elevation.store(true, Ordering::SeqCst);
    }

    /// `add` for this CIDR exits non-zero with a stderr message.
    pub fn fail_adds_for(&self, cidr: &str) {
        self.fail_adds.lock().unwrap().insert(cidr.to_string());
    }

    /// `add` for this CIDR exits zero but the route never appears.
    pub fn ignore_adds_for(&self, cidr: &str) {
        self.ignore_adds.lock().unwrap().insert(cidr.to_string());
    }

    /// `add` for this CIDR exits non-zero, yet the route is in the table afterwards.
    pub fn late_adds_for(&self, cidr: &str) {
        self.late_adds.lock().unwrap().insert(cidr.to_string());
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn helper_calls(&self) -> Vec<[String; 3]> {
        self.invocations()
            .into_iter()
            .filter_map(|i| match i {
                Invocation::Helper(args) => Some(args),
                _ => None,
            })
            .collect()
    }

    pub fn privileged_calls(&self) -> Vec<Vec<String>> {
        self.invocations()
            .into_iter()
            .filter_map(|i| match i {
                Invocation::Privileged(lines) => Some(lines),
                _ => None,
            })
            .collect()
    }

    /// Every add/delete that reached the simulated route table.
    pub fn mutations(&self) -> Vec<(RouteAction, String)> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.invocations.lock().unwrap().clear();
        self.mutations.lock().unwrap().clear();
    }

    fn mutate(&self, action: RouteAction, network: &str, gateway: &str) -> (i32, String) {
        self.mutations
            .lock()
            .unwrap()
            .push((action, network.to_string()));
        let destination = network.split('/').next().unwrap_or(network).to_string();
        let mut table = self.table.lock().unwrap();
        match action {
            RouteAction::Add => {
                if self.fail_adds.lock().unwrap().contains(network) {
                    return (1, format!("route: writing to routing socket: Network is unreachable ({network})"));
                }
                if self.ignore_adds.lock().unwrap().contains(network) {
                    return (0, String::new());
                }
                if self.late_adds.lock().unwrap().contains(network) {
                    table.insert(destination, gateway.to_string());
                    return (1, "route: writing to routing socket: File exists".into());
                }
                if table.contains_key(&destination) {
                    return (1, "route: writing to routing socket: File exists".into());
                }
                table.insert(destination, gateway.to_string());
                (0, String::new())
            }
            RouteAction::Delete => match table.remove(&destination) {
                Some(_) => (0, String::new()),
                None => (1, "route: writing to routing socket: not in table".into()),
            },
        }
    }
}

#[async_trait]
impl Shell for FakeShell {
    async fn run(&self, command: &str) -> CommandResult {
        self.invocations
            .lock()
            .unwrap()
            .push(Invocation::Run(command.to_string()));

        let prefix = format!("{} -n get ", config::ROUTE_BIN);
        let Some(destination) = command.strip_prefix(&prefix) else {
            return CommandResult::default();
        };
        match self.gateway_for(destination) {
            Some(gateway) => CommandResult {
                exit_code: 0,
                output: format!(
                    "   route to: {destination}\ndestination: {destination}\n       mask: 255.255.255.0\n    gateway: {gateway}\n  interface: en0\n      flags: <UP,GATEWAY,DONE,STATIC,PRCLONING>"
                ),
                error: String::new(),
            },
            None => CommandResult {
                exit_code: 1,
                output: String::new(),
                error: format!("route: writing to routing socket: not in table ({destination})"),
            },
        }
    }

    async fn run_privileged(&self, commands: &[String]) -> CommandResult {
        self.invocations
            .lock()
            .unwrap()
            .push(Invocation::Privileged(commands.to_vec()));

        if self.deny_elevation.load(Ordering::SeqCst) {
            return CommandResult {
                exit_code: 1,
                output: String::new(),
                error: "execution error: User canceled. (-128)".into(),
            };
        }

        // `a ; b ; c`: every command runs, the last exit code wins.
        let mut exit_code = 0;
        let mut errors = Vec::new();
        for line in commands {
            let silenced = line.ends_with("2>/dev/null");
            let words: Vec<&str> = line.split_whitespace().collect();
            let parsed = match words.as_slice() {
                [bin, "-n", action, network, gateway, ..] if *bin == config::ROUTE_BIN => {
                    RouteAction::parse(action).map(|a| (a, *network, *gateway))
                }
                _ => None,
            };
            let (code, err) = match parsed {
                Some((action, network, gateway)) => self.mutate(action, network, gateway),
                None => (0, String::new()),
            };
            exit_code = code;
            if !err.is_empty() && !silenced {
                errors.push(err);
            }
        }
        CommandResult {
            exit_code,
            output: String::new(),
            error: errors.join("\n"),
        }
    }

    async fn run_via_helper(&self, args: [&str; 3]) -> CommandResult {
        self.invocations.lock().unwrap().push(Invocation::Helper([
            args[0].to_string(),
            args[1].to_string(),
            args[2].to_string(),
        ]));
        let Some(action) = RouteAction::parse(args[0]) else {
            return CommandResult {
                exit_code: 1,
                output: String::new(),
                error: "Error: action must be 'add' or 'delete'".into(),
            };
        };
        let (exit_code, error) = self.mutate(action, args[1], args[2]);
        CommandResult {
            exit_code,
            output: String::new(),
            error,
        }
    }

    fn helper_path(&self) -> &Path {
        Path::new(config::HELPER_PATH)
    }

    fn is_helper_installed(&self) -> bool {
        self.helper_installed.load(Ordering::SeqCst)
    }
}

/// Collects `(title, body)` pairs instead of posting them.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, title: &str, body: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
    }
}
