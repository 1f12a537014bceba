use clap::Parser;
use psiscalper::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
