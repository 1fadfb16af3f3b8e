// blendfill: headless gradient fill renderer.

use std::process::ExitCode;

use clap::Parser;

mod cli;

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    // Session logging (truncated per launch); also installs the panic hook.
    blendfill::logger::init(args.verbose);
    if let Some(path) = blendfill::logger::log_path() {
        log::debug!("session log: {}", path.display());
    }
    log::debug!("args: {:?}", args);

    cli::run(args)
}
