use std::process::ExitCode;

fn main() -> ExitCode {
    pinroutes_lib::run()
}
