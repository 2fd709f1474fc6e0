use std::process::ExitCode;

fn main() -> ExitCode {
    palco_cli::run()
}
