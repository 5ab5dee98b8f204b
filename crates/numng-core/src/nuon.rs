//! The bridge to Nushell's own NUON data format.
//!
//! Writing a NUON parser is out of scope here; instead, the one place this
//! crate needs to read NUON (registry index files, `nupm.nuon`, `meta.nuon`)
//! shells out to the `nu` binary itself and asks it to convert NUON to JSON,
//! which `serde_json` can then parse normally.

use std::io::Write;
use std::process::{Command, Stdio};

use serde_json::Value;
use thiserror::Error;

/// Errors converting a NUON document to JSON.
#[derive(Debug, Error)]
pub enum NuonError {
    /// The `nu` binary could not be spawned.
    #[error("failed to spawn nu: {0}")]
    Spawn(#[source] std::io::Error),
    /// The conversion subshell exited non-zero.
    #[error("failed to convert nuon to json via nu")]
    ConversionFailed,
    /// `nu` produced output that was not valid JSON.
    #[error(transparent)]
    InvalidJson(#[from] serde_json::Error),
}

/// Converts a NUON document to a [`serde_json::Value`] by piping it through
/// `nu --no-config-file --stdin --commands '$in | from nuon | to json'`.
pub fn to_json(text: &str) -> Result<Value, NuonError> {
    let mut child = Command::new("nu")
        .args(["--no-config-file", "--stdin", "--commands", "$in | from nuon | to json"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(NuonError::Spawn)?;

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(text.as_bytes());
    }

    let output = child.wait_with_output().map_err(NuonError::Spawn)?;
    if !output.status.success() {
        return Err(NuonError::ConversionFailed);
    }
    Ok(serde_json::from_slice(&output.stdout)?)
}
