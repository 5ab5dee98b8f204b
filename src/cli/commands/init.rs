//! The `init` subcommand: scaffolds a default `numng.json` (and, for
//! `--nu-config`, an empty loader script) in the target directory.
//!
//! The original tool's interactive prompts to discover and patch the user's
//! existing Nushell config file are out of scope for the core; this command
//! only performs the non-interactive scaffolding and prints the `source`
//! line the user should add themselves.

use std::path::Path;

use clap::Parser;

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
#[command(next_help_heading = "Init Options")]
pub struct Args {
    /// Scaffold the shell-config directory (`~/.config/nushell/numng`)
    /// instead of the current directory.
    #[arg(short = 'n', long)]
    nu_config: bool,
}

pub(super) fn run(args: Args) -> anyhow::Result<()> {
    let dir = if args.nu_config { config::nu_config_dir() } else { std::env::current_dir()? };
    if args.nu_config && !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }

    let numng_json = dir.join("numng.json");
    if !numng_json.exists() {
        let name = if args.nu_config {
            "nu-config".to_string()
        } else {
            dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "package".to_string())
        };
        let mut manifest = serde_json::json!({
            "name": name,
            "registry": [{
                "source_uri": "https://github.com/Jan9103/numng_repo",
                "package_format": "numng",
                "path_offset": "repo",
            }],
        });
        if args.nu_config {
            manifest["depends"] = serde_json::json!([{"name": "jan9103/numng"}]);
        }
        std::fs::write(&numng_json, serde_json::to_string_pretty(&manifest)?)?;
        tracing::info!(path = %numng_json.display(), "wrote default package file");
    }

    let load_script = dir.join("load_script.nu");
    if args.nu_config && !load_script.exists() {
        std::fs::write(&load_script, "")?;
    }

    if args.nu_config {
        print_source_hint(&load_script);
    }
    Ok(())
}

fn print_source_hint(load_script: &Path) {
    println!("Please add `source {}` to your $nu.config-path file", load_script.display());
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn init_local_writes_default_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let prev = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        run(Args { nu_config: false }).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("numng.json")).unwrap()).unwrap();
        assert_eq!(written["name"], dir.path().file_name().unwrap().to_string_lossy().as_ref());
        assert!(written.get("depends").is_none());
        assert!(!dir.path().join("load_script.nu").exists());

        std::env::set_current_dir(prev).unwrap();
    }

    #[test]
    fn init_local_does_not_overwrite_existing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let prev = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        std::fs::write(dir.path().join("numng.json"), "{\"name\": \"keep-me\"}").unwrap();
        run(Args { nu_config: false }).unwrap();

        let contents = std::fs::read_to_string(dir.path().join("numng.json")).unwrap();
        assert!(contents.contains("keep-me"));

        std::env::set_current_dir(prev).unwrap();
    }
}
