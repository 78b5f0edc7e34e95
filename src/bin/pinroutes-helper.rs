//! Setuid helper that runs exactly one `route -n <add|delete> <network> <gateway>`.

use std::process::{Command, ExitCode};

use pinroutes_lib::config;
use pinroutes_lib::helper;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = helper::run(
        &args,
        |request| {
            let status = Command::new(config::ROUTE_BIN)
                .args(request.route_args())
                .status()?;
            Ok(status.code().unwrap_or(helper::HELPER_FAILURE_EXIT_CODE))
        },
        &mut std::io::stderr(),
    );
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
