//! The `build` subcommand: resolves a package manifest's dependency graph,
//! fetches every package, and (re)generates the home directory and loader
//! script(s).

use std::path::PathBuf;

use clap::Parser;
use numng_core::resolve::{Resolver, ResolverOptions};

/// Arguments for the `build` subcommand.
#[derive(Parser, Debug)]
#[command(next_help_heading = "Build Options")]
pub struct Args {
    /// The target package file.
    ///
    /// Falls back to `numng.json` in the shell-config directory when
    /// `--nu-config` is set, then to `./numng.json` if that file exists.
    #[arg(short = 'p', long, value_name = "FILE")]
    package_file: Option<PathBuf>,

    /// Nupm home directory to materialize `modules/`, `bin/`, and
    /// `overlays/` symlinks into.
    #[arg(long, value_name = "DIR")]
    nupm_home: Option<PathBuf>,

    /// Generate an overlay-only loader file at this path.
    #[arg(short = 'o', long, value_name = "FILE")]
    overlay_file: Option<PathBuf>,

    /// Generate a full loader script for `source`-ing at this path.
    #[arg(short = 's', long, value_name = "FILE")]
    script_file: Option<PathBuf>,

    /// Pull updates for already-acquired git worktrees instead of reusing
    /// them as-is.
    #[arg(short = 'u', long)]
    pull_updates: bool,

    /// Overrides whether packages are allowed to run a `build_command`
    /// (takes precedence over the root package's own setting and the
    /// configured default).
    #[arg(short = 'b', long, value_name = "BOOL", value_parser = clap::value_parser!(bool))]
    allow_build_commands: Option<bool>,

    /// Shortcut to target the shell-config directory: resolves
    /// `--package-file`, `--nupm-home`, and `--script-file` against
    /// Nushell's own config-subdirectory convention when those flags are
    /// not given explicitly, and reconciles plugin registrations.
    #[arg(short = 'n', long)]
    nu_config: bool,
}

/// Resolves the target package file: an explicit `--package-file` wins,
/// then `--nu-config`'s shell-config directory, then `./numng.json` if it
/// happens to exist.
fn resolve_package_file(explicit: Option<PathBuf>, nu_config: bool, nu_config_dir: &std::path::Path) -> Option<PathBuf> {
    explicit
        .or_else(|| nu_config.then(|| nu_config_dir.join("numng.json")))
        .or_else(|| {
            let default = PathBuf::from("numng.json");
            default.exists().then_some(default)
        })
}

pub(super) fn run(args: Args) -> anyhow::Result<()> {
    let nu_config_dir = config::nu_config_dir();

    let package_file = resolve_package_file(args.package_file, args.nu_config, &nu_config_dir);

    let Some(package_file) = package_file else {
        tracing::warn!("no package file specified; use --package-file FILEPATH or --nu-config");
        return Ok(());
    };
    let package_file = package_file.canonicalize().unwrap_or(package_file);

    let nupm_home = args
        .nupm_home
        .or_else(|| args.nu_config.then(|| config::get_cache_dir().join("nu_config_nupm_home")));
    let script_file = args.script_file.or_else(|| args.nu_config.then(|| nu_config_dir.join("load_script.nu")));

    let mut options = ResolverOptions::new(config::CONFIG.store.root.clone());
    options.nupm_home = nupm_home;
    options.delete_existing_home = true;
    options.pull_updates = args.pull_updates;
    options.handle_nu_plugins = args.nu_config;
    options.allow_build_commands = args.allow_build_commands;
    options.default_allow_build_commands = config::CONFIG.build.allow_build_commands;
    options.script_file = script_file;
    options.overlay_file = args.overlay_file;

    let report = Resolver::new(options).resolve(&package_file)?;
    tracing::info!(
        packages = report.packages_loaded,
        symlinks = report.symlinks_applied,
        script = report.script_written,
        overlay = report.overlay_written,
        "build complete"
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn explicit_package_file_wins_over_nu_config() {
        let explicit = PathBuf::from("custom.json");
        let resolved = resolve_package_file(Some(explicit.clone()), true, std::path::Path::new("/nu/config"));
        assert_eq!(resolved, Some(explicit));
    }

    #[test]
    fn nu_config_shortcut_resolves_against_shell_config_dir() {
        let resolved = resolve_package_file(None, true, std::path::Path::new("/nu/config"));
        assert_eq!(resolved, Some(PathBuf::from("/nu/config/numng.json")));
    }

    #[test]
    fn no_flags_and_no_local_file_resolves_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let prev = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        let resolved = resolve_package_file(None, false, std::path::Path::new("/nu/config"));
        assert_eq!(resolved, None);

        std::env::set_current_dir(prev).unwrap();
    }

    #[test]
    fn local_numng_json_used_when_present_and_no_flags() {
        let dir = tempfile::tempdir().unwrap();
        let prev = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        std::fs::write("numng.json", "{}").unwrap();

        let resolved = resolve_package_file(None, false, std::path::Path::new("/nu/config"));
        assert_eq!(resolved, Some(PathBuf::from("numng.json")));

        std::env::set_current_dir(prev).unwrap();
    }
}
