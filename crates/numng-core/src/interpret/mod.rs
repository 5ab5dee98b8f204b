//! Format-specific package interpreters.
//!
//! Each interpreter reads one package's declared metadata file (or, for
//! `numng`, falls back to the manifest's own `extra_data` when no
//! standalone file exists), registers whatever artifacts it finds with the
//! resolver, and enqueues further dependencies.

mod numng;
mod nupm;
mod packer;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::manifest::{ManifestError, Package};
use crate::nuon::NuonError;
use crate::path::PathError;
use crate::registry::RegistryError;
use crate::resolve::Resolver;

/// Errors raised while interpreting one package's metadata.
#[derive(Debug, Error)]
pub enum InterpretError {
    /// A structural problem with the package's metadata file.
    #[error("{0}")]
    Validation(String),
    /// A package declared a `build_command` without build commands being
    /// allowed for this build.
    #[error(
        "package {name} contains a build_command; to use this package, allow build commands \
         (e.g. set \"allow_build_commands\": true on the root package)"
    )]
    BuildCommandsNotAllowed {
        /// The package that attempted to run a build command.
        name: String,
    },
    /// A package's `build_command` (or nupm `custom` build) exited non-zero.
    #[error("build_command for {name} failed")]
    BuildCommandFailed {
        /// The package whose build command failed.
        name: String,
    },
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Git(#[from] crate::git::GitError),
    #[error(transparent)]
    Nuon(#[from] NuonError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Dispatches `package` (already downloaded to `base_path`) to the right
/// interpreter: explicit `package_format` if set, else auto-detected from
/// the files present at `base_path`.
pub(crate) fn dispatch(resolver: &mut Resolver, package: Package, base_path: PathBuf) -> Result<(), InterpretError> {
    for (dep, dep_base) in download_dependencies(resolver, package.depends.clone().unwrap_or_default())? {
        resolver.enqueue(dep, dep_base);
    }

    let numng_json = base_path.join("numng.json");
    let nupm_nuon = base_path.join("nupm.nuon");
    let meta_nuon = base_path.join("meta.nuon");

    match package.package_format.as_deref() {
        Some("numng") => {
            let path = numng_json.is_file().then_some(numng_json.as_path());
            numng::load(resolver, &package, path, &base_path)
        },
        Some("nupm") if nupm_nuon.is_file() => nupm::load(resolver, &package, &nupm_nuon, &base_path),
        Some("packer") | Some("packer.nu") if meta_nuon.is_file() => packer::load(resolver, &package, &meta_nuon, &base_path),
        None if numng_json.is_file() => numng::load(resolver, &package, Some(&numng_json), &base_path),
        None if nupm_nuon.is_file() => nupm::load(resolver, &package, &nupm_nuon, &base_path),
        None if meta_nuon.is_file() => packer::load(resolver, &package, &meta_nuon, &base_path),
        other => {
            tracing::info!(package = %package.name, format = ?other, "no specific load action found");
            Ok(())
        },
    }
}

fn download_dependencies(
    resolver: &mut Resolver,
    deps: Vec<Package>,
) -> Result<Vec<(Package, PathBuf)>, InterpretError> {
    let mut result = Vec::with_capacity(deps.len());
    for mut dep in deps {
        let base = resolver.download_package(&mut dep)?;
        result.push((dep, base));
    }
    Ok(result)
}

pub(crate) fn direct_dependency_names(package: &Package) -> Vec<String> {
    package.depends.as_ref().map(|deps| deps.iter().map(|d| d.name.clone()).collect()).unwrap_or_default()
}

pub(crate) fn security_join(name: &str, context: &str, base: &Path, rel: &str) -> Result<PathBuf, InterpretError> {
    let joined = crate::path::join_contained(base, rel.split('/'))
        .map_err(|_| InterpretError::Validation(format!("security error: {name} tried to register a {context} outside of its directory")))?;
    Ok(joined)
}

/// Renders `path` as a JSON string literal, the way a generated snippet
/// embeds an absolute path into a line of Nushell source.
pub(crate) fn json_quote(path: &Path) -> String {
    serde_json::to_string(&path.display().to_string()).unwrap_or_default()
}

/// Runs `nu --no-config-file -c <command>` in `cwd`, discarding stdout.
pub(crate) fn run_build_command(cwd: &Path, command: &str) -> std::io::Result<bool> {
    let status = std::process::Command::new("nu")
        .args(["--no-config-file", "-c", command])
        .current_dir(cwd)
        .stdout(std::process::Stdio::null())
        .status()?;
    Ok(status.success())
}
