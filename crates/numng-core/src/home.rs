//! Home-directory materialization and loader-script emission.
//!
//! The home directory (when configured) holds three subdirectories of
//! symlinks — `modules/`, `bin/`, `overlays/` — that the generated loader
//! script points Nushell's `NU_LIB_DIRS`/`PATH` at. Materialization is
//! deferred until after scripts are written, so a failure while emitting a
//! script never destroys a working home from a previous build.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::path::{self, PathError};
use crate::snippet::{self, CycleError, Snippet};

/// Errors materializing the home directory or emitting scripts.
#[derive(Debug, Error)]
pub enum HomeError {
    /// The configured home path was too close to the filesystem root.
    #[error("refusing to manage home directory {0}: too close to the file-system root")]
    TooShallow(PathBuf),
    /// The home directory already exists and the caller did not permit
    /// deleting it.
    #[error("home directory {0} already exists and deletion was not requested")]
    AlreadyExists(PathBuf),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Rejects a home path with fewer than three path segments below the
/// filesystem root, e.g. `/` or `/home`, as too dangerous to
/// destroy-and-recreate.
pub fn check_depth(home: &Path) -> Result<(), HomeError> {
    let normalized = path::normalize(home);
    let depth = normalized.components().filter(|c| matches!(c, std::path::Component::Normal(_))).count();
    if depth <= 2 {
        return Err(HomeError::TooShallow(normalized));
    }
    Ok(())
}

/// Recreates `home`'s `modules/`, `bin/`, `overlays/` subdirectories.
///
/// This destroys and recreates the entire home directory, so it is only
/// called when a home directory is actually configured — the symlink plan
/// itself ([`apply_symlinks`]) is applied unconditionally afterward, since
/// a package's `linkin` declarations target paths inside its own source
/// tree rather than the home directory.
pub fn prepare(home: &Path, delete_existing: bool) -> Result<(), HomeError> {
    check_depth(home)?;
    if home.exists() {
        if !delete_existing {
            return Err(HomeError::AlreadyExists(home.to_path_buf()));
        }
        std::fs::remove_dir_all(home)?;
    }
    std::fs::create_dir_all(home.join("modules"))?;
    std::fs::create_dir_all(home.join("bin"))?;
    std::fs::create_dir_all(home.join("overlays"))?;
    Ok(())
}

/// Applies the collected `(source, destination)` symlink plan.
///
/// `destination`s are not validated here — containment was enforced while
/// the plan was built during resolution.
pub fn apply_symlinks(symlinks: &[(PathBuf, PathBuf)]) -> Result<(), HomeError> {
    for (src, dst) in symlinks {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(src, dst)?;
        #[cfg(not(unix))]
        std::os::windows::fs::symlink_file(src, dst)?;
    }
    Ok(())
}

/// Convenience wrapper combining [`prepare`] and [`apply_symlinks`] for
/// callers that always have a home directory to manage.
pub fn materialize(home: &Path, delete_existing: bool, symlinks: &[(PathBuf, PathBuf)]) -> Result<(), HomeError> {
    prepare(home, delete_existing)?;
    apply_symlinks(symlinks)
}

/// Renders the full loader script: an `export-env` block of env-band
/// snippets (plus a `PATH`-style `ENV_CONVERSIONS` shim, plus home-derived
/// env lines when `nupm_home` is set), followed by the sorted
/// concatenation of use-band and script-band snippets.
pub fn render_full_script(
    nupm_home: Option<&Path>,
    env: &[Snippet],
    uses: &[Snippet],
    scripts: &[Snippet],
) -> Result<String, CycleError> {
    let mut lines = vec![
        "export-env {".to_string(),
        "$env.ENV_CONVERSIONS = ($env | get -i ENV_CONVERSIONS | default {} | upsert 'PATH' \
         {|_| {'from_string': {|s| $s | split row (char esep)}, 'to_string': {|v| $v | str join \
         (char esep)}}})"
            .to_string(),
    ];
    if let Some(home) = nupm_home {
        lines.push(format!("$env.NUPM_HOME = {}", json_string(home)));
        lines.push(format!(
            "$env.NU_LIB_DIRS = ($env | get -i NU_LIB_DIRS | default [] | append {} | append {})",
            json_string(&home.join("modules")),
            json_string(&home.join("overlays")),
        ));
        lines.push(format!("$env.PATH = ($env.PATH | append {})", json_string(&home.join("bin"))));
    }
    lines.extend(snippet::sort(env)?);
    lines.push("}".to_string());
    let mut combined = Vec::with_capacity(uses.len() + scripts.len());
    combined.extend_from_slice(uses);
    combined.extend_from_slice(scripts);
    lines.extend(snippet::sort(&combined)?);
    Ok(lines.join("\n"))
}

/// Renders the overlay-only loader script: env block plus use-band, no
/// script band.
pub fn render_overlay_script(nupm_home: Option<&Path>, env: &[Snippet], uses: &[Snippet]) -> Result<String, CycleError> {
    let mut lines = vec!["export-env {".to_string()];
    if let Some(home) = nupm_home {
        lines.push(format!("$env.NUPM_HOME = {}", json_string(home)));
    }
    lines.extend(snippet::sort(env)?);
    lines.push("}".to_string());
    lines.extend(snippet::sort(uses)?);
    Ok(lines.join("\n"))
}

fn json_string(path: &Path) -> String {
    serde_json::to_string(&path.display().to_string()).unwrap_or_default()
}

/// Writes `content` to `path` atomically via a temp file in the same
/// directory, renamed into place on success.
pub fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn rejects_shallow_home() {
        assert!(check_depth(Path::new("/home")).is_err());
        assert!(check_depth(Path::new("/")).is_err());
        assert!(check_depth(Path::new("/home/user/.local/share/numng")).is_ok());
    }

    #[test]
    fn materialize_creates_subdirs_and_symlinks() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().join("a").join("b").join("home");
        let target = tmp.path().join("module.nu");
        std::fs::write(&target, "export def foo [] {}").unwrap();

        let dst = home.join("modules").join("foo");
        materialize(&home, false, &[(target.clone(), dst.clone())]).unwrap();
        assert!(home.join("bin").is_dir());
        assert!(home.join("overlays").is_dir());
        assert_eq!(std::fs::read_link(&dst).unwrap(), target);
    }

    #[test]
    fn materialize_refuses_existing_without_delete_flag() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().join("a").join("b").join("home");
        std::fs::create_dir_all(&home).unwrap();
        let err = materialize(&home, false, &[]).unwrap_err();
        assert!(matches!(err, HomeError::AlreadyExists(_)));
    }

    #[test]
    fn write_atomic_round_trips() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("script.nu");
        write_atomic(&file, "use foo").unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "use foo");
    }
}
