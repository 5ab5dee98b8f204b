//! This module defines the subcommands for the numng CLI.
//!
//! Each subcommand is implemented in its own module and is responsible for
//! handling its own arguments and logic. The `run` function in this module
//! dispatches to the appropriate subcommand based on the parsed arguments.

use clap::Subcommand;

use super::Args;

mod build;
mod init;

/// The subcommands for the numng CLI.
#[derive(Subcommand)]
pub(super) enum Commands {
    /// Resolve and fetch a package's dependency graph and (re)generate its
    /// loader script(s) and home directory.
    #[command(visible_alias = "b")]
    Build(build::Args),
    /// Scaffold a default `numng.json` in the current directory (or the
    /// shell-config directory, with `--nu-config`) if one isn't already
    /// present.
    #[command(visible_alias = "i")]
    Init(init::Args),
}

/// The main entry point for the numng CLI.
pub fn run(args: Args) -> anyhow::Result<()> {
    match args.command {
        Commands::Build(build_args) => build::run(build_args),
        Commands::Init(init_args) => init::run(init_args),
    }
}
