use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    harvest_cli::run()
}
