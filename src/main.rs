//! The main entry point for the numng CLI.

#![warn(missing_docs)]

use std::process::ExitCode;

use clap::Parser;
use numng::cli::{self, Args};

fn main() -> ExitCode {
    let args = Args::parse_from(cli::change_directory());
    let Args { log, .. } = args;

    let _guard = cli::init_global_subscriber(log);

    if let Err(e) = cli::run(args) {
        numng::fatal!(e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
