pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod helper;
pub mod services;
pub mod store;

use std::process::ExitCode;

use clap::Parser;

/// Entry point for the `pinroutes` binary.
pub fn run() -> ExitCode {
    let cli = cli::Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(cli::dispatch(cli))
}

/// Panic hook plus a stderr subscriber; `RUST_LOG` overrides the default filter.
pub fn init_tracing(verbose: bool) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC in PinRoutes: {info}");
        default_hook(info);
    }));

    let fallback = if verbose { "pinroutes=debug" } else { "pinroutes=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
