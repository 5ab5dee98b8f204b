//! Path containment checks and filesystem-safe name sanitization.
//!
//! Every untrusted path segment that ends up as a directory or symlink name
//! on disk — a package name, a version string, a manifest-declared relative
//! path — is routed through [`filesystem_safe`] and [`join_contained`]
//! before it touches the filesystem.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Errors produced while sanitizing or joining untrusted paths.
#[derive(Debug, Error)]
pub enum PathError {
    /// A joined, normalized path escaped its declared base.
    #[error("security error: path {attempted} escapes base {base}")]
    Escape {
        /// The path that was rejected.
        attempted: PathBuf,
        /// The base it was required to stay inside.
        base: PathBuf,
    },
}

/// Replaces every character outside `[A-Za-z0-9 _.-]` with `_`.
///
/// This is applied to a single path segment (a package name, a registry
/// key, a version string), never to an already-joined path.
pub fn filesystem_safe(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Lexically normalizes a path: resolves `.` and `..` components without
/// touching the filesystem (the path may not exist yet).
///
/// `..` at the root of the (already-absolute) path is dropped rather than
/// escaping further, matching `path.normpath`'s behavior for absolute paths.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                match out.components().next_back() {
                    Some(Component::Normal(_)) => {
                        out.pop();
                    },
                    Some(Component::RootDir) | Some(Component::Prefix(_)) | None => {},
                    _ => {
                        out.push("..");
                    },
                }
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Joins `segments` onto `base`, normalizes the result, and asserts that it
/// still starts with `base`.
///
/// Each segment is used as-is (callers decide whether to run it through
/// [`filesystem_safe`] first); this function only enforces containment.
pub fn join_contained<I, S>(base: &Path, segments: I) -> Result<PathBuf, PathError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<Path>,
{
    let mut joined = base.to_path_buf();
    for segment in segments {
        joined.push(segment.as_ref());
    }
    let normalized = normalize(&joined);
    let base_normalized = normalize(base);
    if !normalized.starts_with(&base_normalized) {
        return Err(PathError::Escape {
            attempted: normalized,
            base: base_normalized,
        });
    }
    Ok(normalized)
}

/// Asserts that `candidate` (already joined/normalized by the caller) lies
/// inside `base`.
pub fn assert_contained(base: &Path, candidate: &Path) -> Result<(), PathError> {
    let normalized = normalize(candidate);
    let base_normalized = normalize(base);
    if !normalized.starts_with(&base_normalized) {
        return Err(PathError::Escape {
            attempted: normalized,
            base: base_normalized,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_traversal_characters() {
        let sanitized = filesystem_safe("../../etc/passwd");
        assert!(!sanitized.contains('/'));
        assert_eq!(sanitized, "_.._.._etc_passwd");
    }

    #[test]
    fn keeps_benign_characters() {
        assert_eq!(filesystem_safe("my-package_1.0 beta"), "my-package_1.0 beta");
    }

    #[test]
    fn join_contained_rejects_escape() {
        let base = Path::new("/store/pkg");
        let err = join_contained(base, ["..", "..", "etc"]).unwrap_err();
        assert!(matches!(err, PathError::Escape { .. }));
    }

    #[test]
    fn join_contained_allows_nested_path() {
        let base = Path::new("/store/pkg");
        let joined = join_contained(base, ["lib", "mod.nu"]).unwrap();
        assert_eq!(joined, Path::new("/store/pkg/lib/mod.nu"));
    }

    #[test]
    fn normalize_collapses_dot_segments() {
        let out = normalize(Path::new("/a/b/./c/../d"));
        assert_eq!(out, Path::new("/a/b/d"));
    }
}
