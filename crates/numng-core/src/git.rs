//! The git-backed package store: bare clones shared across refs, with
//! per-ref worktrees reused across builds.
//!
//! Every operation here shells out to the system `git` binary rather than
//! going through a git library — the acquisition sequence (shallow bare
//! clone, shallow-fetch-by-ref into a worktree, short-hash/branch retries)
//! is cheaper and more predictable expressed as the exact commands a human
//! would type than reimplemented against an object-database API.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::path::filesystem_safe;

/// Errors produced while acquiring or updating a git-backed package.
#[derive(Debug, Error)]
pub enum GitError {
    /// The source URI did not contain a `://` scheme separator.
    #[error("invalid git url (missing \"://\"): {0}")]
    InvalidUrl(String),
    /// Spawning the `git` binary failed outright (not found, permissions).
    #[error("failed to run git {args:?}: {source}")]
    Spawn {
        /// The arguments that were passed to `git`.
        args: Vec<String>,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// `git` ran but exited non-zero.
    #[error("git {args:?} failed")]
    CommandFailed {
        /// The arguments that were passed to `git`.
        args: Vec<String>,
    },
    /// Creating the store directory failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The durable, content-addressed git store.
///
/// `root` is the store's `git/` subdirectory (e.g.
/// `<cache-dir>/numng/store/git`); each distinct URL gets its own
/// subdirectory keyed on its sanitized path segments.
pub struct GitStore {
    root: PathBuf,
}

impl GitStore {
    /// Creates a store rooted at `root` (typically `<cache>/numng/store/git`).
    pub fn new(root: PathBuf) -> Self {
        GitStore { root }
    }

    /// Computes the base directory for a given URL, without touching disk.
    fn base_path(&self, url: &str) -> Result<PathBuf, GitError> {
        let (_, rest) = url
            .split_once("://")
            .ok_or_else(|| GitError::InvalidUrl(url.to_string()))?;
        let mut base = self.root.clone();
        for segment in rest.split('/') {
            if segment.is_empty() {
                continue;
            }
            base.push(filesystem_safe(segment));
        }
        Ok(base)
    }

    /// Returns the worktree path for `url` at `git_ref`, without fetching
    /// or acquiring anything (used for display/dry-run purposes).
    pub fn ref_path(&self, url: &str, git_ref: Option<&str>) -> Result<PathBuf, GitError> {
        let git_ref = git_ref.unwrap_or("main");
        Ok(self.base_path(url)?.join(git_ref))
    }

    /// Ensures a worktree for `url` at `git_ref` exists on disk, cloning
    /// and/or fetching as needed, and returns its path.
    ///
    /// When `update` is true and the worktree already exists, it is hard-reset
    /// to the latest `git_ref` from `origin` (preserving a `target/`
    /// directory so native build caches survive the reset).
    pub fn acquire(&self, url: &str, git_ref: Option<&str>, update: bool) -> Result<PathBuf, GitError> {
        let git_ref = git_ref.unwrap_or("main");
        let base_path = self.base_path(url)?;
        let bare_path = base_path.join("__bare__");
        let ref_path = base_path.join(filesystem_safe(git_ref));

        if !bare_path.exists() {
            std::fs::create_dir_all(&base_path)?;
            run_git(&base_path, ["clone", "--bare", "--quiet", "--depth=1", url, "__bare__"])?;
        }

        if !ref_path.exists() {
            let fetch = run_git_allow_failure(
                &bare_path,
                ["fetch", "--quiet", "--depth=1", "--tags", "origin", git_ref],
            )?;
            if !fetch && git_ref.chars().all(|c| c.is_ascii_hexdigit()) {
                run_git_allow_failure(&bare_path, ["fetch", "--unshallow", "--quiet"])?;
            }

            let worktree_ok =
                run_git_allow_failure(&bare_path, ["worktree", "add", "--quiet", path_str(&ref_path), git_ref])?;
            if !worktree_ok {
                let branch_spec = format!("{git_ref}:{git_ref}");
                run_git(&bare_path, ["fetch", "--quiet", "--depth=1", "--tags", "origin", &branch_spec])?;
                run_git(&bare_path, ["worktree", "add", "--quiet", path_str(&ref_path), git_ref])?;
            }
        } else if update {
            run_git(&ref_path, ["clean", "-qfdx", "-e", "/target"])?;
            run_git(&ref_path, ["fetch", "--quiet", "origin", git_ref])?;
            run_git(&ref_path, ["reset", "--hard", "--quiet", "FETCH_HEAD"])?;
        }

        Ok(ref_path)
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_default()
}

fn run_git<'a, I>(cwd: &Path, args: I) -> Result<(), GitError>
where
    I: IntoIterator<Item = &'a str>,
{
    let args: Vec<&str> = args.into_iter().collect();
    if run_git_allow_failure(cwd, args.iter().copied())? {
        Ok(())
    } else {
        Err(GitError::CommandFailed { args: args.into_iter().map(String::from).collect() })
    }
}

/// Runs `git` with `args` in `cwd`, returning `Ok(true)` on success and
/// `Ok(false)` on a non-zero exit (for call sites that want to try a
/// fallback rather than abort immediately).
fn run_git_allow_failure<'a, I>(cwd: &Path, args: I) -> Result<bool, GitError>
where
    I: IntoIterator<Item = &'a str>,
{
    let args: Vec<String> = args.into_iter().map(String::from).collect();
    let status = Command::new("git")
        .args(&args)
        .current_dir(cwd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|source| GitError::Spawn { args: args.clone(), source })?;
    Ok(status.success())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn init_bare_origin(dir: &Path) -> PathBuf {
        let origin = dir.join("origin");
        std::fs::create_dir_all(&origin).unwrap();
        assert!(Command::new("git").args(["init", "--quiet"]).current_dir(&origin).status().unwrap().success());
        std::fs::write(origin.join("file.txt"), "hello").unwrap();
        assert!(
            Command::new("git")
                .args(["config", "user.email", "test@example.com"])
                .current_dir(&origin)
                .status()
                .unwrap()
                .success()
        );
        assert!(
            Command::new("git")
                .args(["config", "user.name", "test"])
                .current_dir(&origin)
                .status()
                .unwrap()
                .success()
        );
        assert!(Command::new("git").args(["add", "."]).current_dir(&origin).status().unwrap().success());
        assert!(
            Command::new("git")
                .args(["commit", "--quiet", "-m", "init"])
                .current_dir(&origin)
                .status()
                .unwrap()
                .success()
        );
        origin
    }

    #[test]
    fn base_path_rejects_missing_scheme() {
        let tmp = TempDir::new().unwrap();
        let store = GitStore::new(tmp.path().to_path_buf());
        assert!(matches!(store.ref_path("not-a-url", None), Err(GitError::InvalidUrl(_))));
    }

    #[test]
    fn acquire_clones_and_reuses_worktree() {
        let tmp = TempDir::new().unwrap();
        let origin = init_bare_origin(tmp.path());
        let store = GitStore::new(tmp.path().join("store"));
        let url = format!("file://{}", origin.display());

        let first = store.acquire(&url, Some("master"), false).unwrap_or_else(|_| {
            store.acquire(&url, Some("main"), false).expect("acquire should succeed on default branch")
        });
        assert!(first.join("file.txt").exists());

        let again = store.acquire(&url, Some(first.file_name().unwrap().to_str().unwrap()), false).unwrap();
        assert_eq!(first, again);
    }
}
