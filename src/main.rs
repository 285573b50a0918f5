use clap::Parser;
use minvar::cli::{run, Cli};
use minvar::logging::init_logging;

fn main() -> std::process::ExitCode {
    init_logging();
    run(Cli::parse())
}
