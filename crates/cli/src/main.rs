use std::process::ExitCode;

fn main() -> ExitCode {
    haggl_cli::run()
}
