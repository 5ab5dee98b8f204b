//! Registry backends: name (+ optional version) lookups that enrich a
//! partially-specified dependency into a fetchable [`Package`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::manifest::{ManifestError, Package};
use crate::nuon::{self, NuonError};
use crate::path::{self, PathError};
use crate::version::Constraint;

/// Errors raised while consulting a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry's on-disk layout was not as expected.
    #[error("{0}")]
    Layout(String),
    /// A version alias in a numng registry file formed a cycle or pointed
    /// at a missing key.
    #[error("registry defined an invalid version alias for {name}: {alias}")]
    InvalidAlias {
        /// The package name being looked up.
        name: String,
        /// The alias key that could not be resolved.
        alias: String,
    },
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Nuon(#[from] NuonError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Common capability shared by every registry backend.
pub trait Registry {
    /// Looks up `name`, optionally constrained to `version`, returning the
    /// best match if any.
    fn get_by_name(&self, name: &str, version: Option<&str>) -> Result<Option<Package>, RegistryError>;
}

/// A directory of `<name>.json` files, each mapping a version string to a
/// package spec (or to a string alias of another key in the same file).
pub struct NumngRegistry {
    dir: PathBuf,
}

impl NumngRegistry {
    /// Opens a per-file JSON registry rooted at `dir`.
    pub fn new(dir: PathBuf) -> Self {
        NumngRegistry { dir }
    }
}

impl Registry for NumngRegistry {
    fn get_by_name(&self, name: &str, version: Option<&str>) -> Result<Option<Package>, RegistryError> {
        let filename = format!("{name}.json");
        let segments: Vec<String> = filename
            .split('/')
            .filter(|s| !s.is_empty() && *s != "..")
            .map(path::filesystem_safe)
            .collect();
        let filepath = path::join_contained(&self.dir, &segments)?;

        if !filepath.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&filepath)?;
        let version_dict: Value = serde_json::from_str(&text)?;
        let Value::Object(version_dict) = version_dict else {
            return Err(RegistryError::Layout(format!(
                "{} does not contain a JSON object",
                filepath.display()
            )));
        };

        // Numng registries default an unspecified version to "latest";
        // nupm registries (below) instead default to an unversioned match.
        let wanted = Constraint::parse(version.unwrap_or("latest"));
        let candidates = version_dict.iter().filter(|(k, _)| k.as_str() != "_").map(|(k, v)| (k.as_str(), v));
        let Some((_, found)) = wanted.pick_greatest(candidates) else {
            return Ok(None);
        };
        let mut found = found.clone();

        let mut visited = HashSet::new();
        while let Value::String(alias) = found {
            if !visited.insert(alias.clone()) {
                return Err(RegistryError::InvalidAlias { name: name.to_string(), alias: alias.clone() });
            }
            found = version_dict
                .get(&alias)
                .cloned()
                .ok_or_else(|| RegistryError::InvalidAlias { name: name.to_string(), alias: alias.clone() })?;
        }

        let mut object = match found {
            Value::Object(map) => map,
            other => {
                return Err(RegistryError::Layout(format!(
                    "{} resolved {} to a non-object value {other}",
                    filepath.display(),
                    name
                )));
            },
        };
        object.insert("name".to_string(), Value::String(name.to_string()));
        let mut result = Package::from_value(&Value::Object(object), false)?;

        if let Some(template) = version_dict.get("_") {
            let template_pkg = Package::from_value(template, true)?;
            result.include_data(&template_pkg);
        }
        Ok(Some(result))
    }
}

/// A single `registry.nuon` index mapping package name to the relative path
/// of a per-package NUON file (itself a list of version records).
pub struct NupmRegistry {
    dir: PathBuf,
    packages: HashMap<String, String>,
}

impl NupmRegistry {
    /// Opens a nupm-style registry rooted at `dir` (expects `dir/registry.nuon`).
    pub fn open(dir: PathBuf) -> Result<Self, RegistryError> {
        let index_path = dir.join("registry.nuon");
        let text = std::fs::read_to_string(&index_path)?;
        let index = nuon::to_json(&text)?;
        let Value::Array(entries) = index else {
            return Err(RegistryError::Layout(format!("{} is not a list", index_path.display())));
        };
        let mut packages = HashMap::new();
        for entry in entries {
            let (Some(name), Some(path)) = (
                entry.get("name").and_then(Value::as_str),
                entry.get("path").and_then(Value::as_str),
            ) else {
                continue;
            };
            packages.insert(name.to_string(), path.to_string());
        }
        Ok(NupmRegistry { dir, packages })
    }
}

impl Registry for NupmRegistry {
    fn get_by_name(&self, name: &str, version: Option<&str>) -> Result<Option<Package>, RegistryError> {
        let Some(relative) = self.packages.get(name) else {
            return Ok(None);
        };
        let package_path = path::join_contained(&self.dir, [relative])?;
        let text = std::fs::read_to_string(&package_path)?;
        let data = nuon::to_json(&text)?;
        load_nupm_entry(&data, Some(name), version)
    }
}

fn load_nupm_entry(
    data: &Value,
    name: Option<&str>,
    version: Option<&str>,
) -> Result<Option<Package>, RegistryError> {
    let Value::Array(entries) = data else {
        return Err(RegistryError::Layout("nupm package file is not a list".to_string()));
    };
    // Unlike the numng registry, an absent version here is not treated as
    // "latest" — it only matches candidates that themselves carry no
    // operator, which in practice is every concrete version string.
    let wanted = Constraint::parse(version.unwrap_or(""));
    let candidates = entries
        .iter()
        .filter(|entry| {
            name.is_none() || entry.get("name").and_then(Value::as_str) == name
        })
        .filter_map(|entry| entry.get("version").and_then(Value::as_str).map(|v| (v, entry)));

    let Some((_, entry)) = wanted.pick_greatest(candidates) else {
        return Ok(None);
    };

    let info = entry.get("info");
    Ok(Some(Package {
        name: entry.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        depends: None,
        source_type: entry.get("type").and_then(Value::as_str).map(String::from),
        source_uri: info.and_then(|i| i.get("url")).and_then(Value::as_str).map(String::from),
        source_git_ref: info.and_then(|i| i.get("revision")).and_then(Value::as_str).map(String::from),
        source_path_offset: entry.get("path").and_then(Value::as_str).map(String::from),
        registries: None,
        package_format: Some("nupm".to_string()),
        extra_data: None,
    }))
}

/// Looks up `name` across every registry in order, returning the first hit.
pub fn lookup(registries: &[Box<dyn Registry>], name: &str, version: Option<&str>) -> Result<Option<Package>, RegistryError> {
    for registry in registries {
        if let Some(found) = registry.get_by_name(name, version)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Confirms a directory looks like a numng-format registry root (i.e. is
/// usable without further structural checks — every name lookup is lazy).
pub fn is_numng_registry_root(_dir: &Path) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn numng_registry_picks_greatest_matching_version() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("foo.json"),
            serde_json::json!({
                "1.0.0": {"source_uri": "https://example.com/foo", "git_ref": "v1.0.0"},
                "1.1.0": {"source_uri": "https://example.com/foo", "git_ref": "v1.1.0"},
            })
            .to_string(),
        )
        .unwrap();
        let registry = NumngRegistry::new(tmp.path().to_path_buf());
        let found = registry.get_by_name("foo", Some("^1.0")).unwrap().unwrap();
        assert_eq!(found.source_git_ref.as_deref(), Some("v1.1.0"));
    }

    #[test]
    fn numng_registry_follows_string_aliases() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("foo.json"),
            serde_json::json!({
                "1.0.0": {"source_uri": "https://example.com/foo"},
                "latest-stable": "1.0.0",
            })
            .to_string(),
        )
        .unwrap();
        let registry = NumngRegistry::new(tmp.path().to_path_buf());
        let found = registry.get_by_name("foo", Some("latest-stable")).unwrap().unwrap();
        assert_eq!(found.source_uri.as_deref(), Some("https://example.com/foo"));
    }

    #[test]
    fn numng_registry_merges_sentinel_template() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("foo.json"),
            serde_json::json!({
                "_": {"source_type": "git"},
                "1.0.0": {"source_uri": "https://example.com/foo"},
            })
            .to_string(),
        )
        .unwrap();
        let registry = NumngRegistry::new(tmp.path().to_path_buf());
        let found = registry.get_by_name("foo", Some("1.0.0")).unwrap().unwrap();
        assert_eq!(found.source_type.as_deref(), Some("git"));
    }

    #[test]
    fn numng_registry_rejects_traversal_in_name() {
        let tmp = TempDir::new().unwrap();
        let registry = NumngRegistry::new(tmp.path().to_path_buf());
        let result = registry.get_by_name("../../etc/passwd", None);
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn nupm_entry_selects_by_name_and_version() {
        let data = serde_json::json!([
            {"name": "foo", "version": "1.0.0", "type": "module", "info": {"url": "https://example.com/foo", "revision": "abc"}},
            {"name": "foo", "version": "2.0.0", "type": "module", "info": {"url": "https://example.com/foo", "revision": "def"}},
        ]);
        let found = load_nupm_entry(&data, Some("foo"), None).unwrap().unwrap();
        assert_eq!(found.source_git_ref.as_deref(), Some("def"));
        assert_eq!(found.package_format.as_deref(), Some("nupm"));
    }
}
