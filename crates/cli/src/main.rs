use std::process::ExitCode;

fn main() -> ExitCode {
    revguard_cli::run()
}
