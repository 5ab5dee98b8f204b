//! Reconciliation of Nushell plugin registrations against the set of
//! plugin paths collected during resolution.
//!
//! Plugin registration itself belongs to Nushell (`plugin add`/`plugin rm`);
//! this module only owns the diff and the call sites.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde_json::Value;
use thiserror::Error;

/// Errors reconciling the installed plugin set.
#[derive(Debug, Error)]
pub enum PluginError {
    /// `nu --commands "plugin list | to json"` failed or produced an
    /// unexpected shape.
    #[error("failed to list currently installed plugins")]
    ListFailed,
    /// A `plugin add`/`plugin rm` invocation failed.
    #[error("failed to {action} plugin {path}")]
    ReconcileFailed {
        /// `"add"` or `"remove"`.
        action: &'static str,
        /// The plugin path involved.
        path: String,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Removes any installed plugin located under `managed_root` that is not
/// in `wanted`, then adds any entry of `wanted` not already installed.
pub fn reconcile(managed_root: &Path, wanted: &[PathBuf]) -> Result<(), PluginError> {
    let installed = list_installed()?;

    for plugin in installed.iter().filter(|p| {
        p.filename.starts_with(managed_root) && !wanted.iter().any(|w| w == &p.filename)
    }) {
        run_plugin_command(&format!("plugin rm {}", quote(&plugin.name)), "remove", &plugin.name)?;
    }

    for path in wanted.iter().filter(|path| !installed.iter().any(|p| &p.filepath == *path)) {
        let path_str = path.display().to_string();
        run_plugin_command(&format!("plugin add {}", quote(&path_str)), "add", &path_str)?;
    }
    Ok(())
}

struct InstalledPlugin {
    name: String,
    filename: PathBuf,
    filepath: PathBuf,
}

fn list_installed() -> Result<Vec<InstalledPlugin>, PluginError> {
    let output = Command::new("nu")
        .args(["--commands", "plugin list | to json"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .map_err(|_| PluginError::ListFailed)?;
    if !output.status.success() {
        return Err(PluginError::ListFailed);
    }
    let value: Value = serde_json::from_slice(&output.stdout)?;
    let Value::Array(entries) = value else {
        return Err(PluginError::ListFailed);
    };
    Ok(entries
        .iter()
        .filter_map(|entry| {
            Some(InstalledPlugin {
                name: entry.get("name")?.as_str()?.to_string(),
                filename: PathBuf::from(entry.get("filename")?.as_str()?),
                filepath: PathBuf::from(entry.get("filepath").and_then(Value::as_str).unwrap_or_default()),
            })
        })
        .collect())
}

fn run_plugin_command(command: &str, action: &'static str, path: &str) -> Result<(), PluginError> {
    let status = Command::new("nu")
        .args(["--commands", command])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if !status.success() {
        return Err(PluginError::ReconcileFailed { action, path: path.to_string() });
    }
    Ok(())
}

fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_default()
}
