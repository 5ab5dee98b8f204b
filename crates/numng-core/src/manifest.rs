//! The `Package` record: the in-memory form of a manifest entry, registry
//! hit, or dependency declaration, and its left-biased merge semantics.

use std::collections::VecDeque;

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while turning raw JSON into a [`Package`].
#[derive(Debug, Error)]
pub enum ManifestError {
    /// A package object lacked a `name` and the caller did not allow that.
    #[error("unable to load package without a name ({0})")]
    MissingName(String),
    /// A JSON value that should have been an object/string was something else.
    #[error("invalid package declaration: {0}")]
    InvalidShape(String),
    /// The manifest file was not valid JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// The manifest file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

const RECOGNIZED_KEYS: [&str; 7] = [
    "name",
    "source_type",
    "source_uri",
    "git_ref",
    "path_offset",
    "depends",
    "registry",
];

/// A resolvable package: a git (or future source-type) reference, plus
/// whatever format-specific metadata its interpreter recognizes.
#[derive(Debug, Clone, Default)]
pub struct Package {
    /// The package's declared or inherited name. `"NO_NAME_PACKAGE"` when
    /// no name was given and the caller allowed that.
    pub name: String,
    /// `None` when the manifest omitted `depends` entirely; `Some(vec![])`
    /// when it was present but empty. The distinction matters: only the
    /// `None` case is filled in by [`Package::include_data`].
    pub depends: Option<Vec<Package>>,
    /// The source kind; only `"git"` (or unset, defaulting to git) is
    /// supported.
    pub source_type: Option<String>,
    /// The URI to fetch the package from.
    pub source_uri: Option<String>,
    /// The git ref to check out; defaults to `"main"` when unset.
    pub source_git_ref: Option<String>,
    /// A subdirectory inside the fetched source tree to treat as the
    /// package root.
    pub source_path_offset: Option<String>,
    /// Registries declared by this package (only meaningful on the root).
    pub registries: Option<Vec<Package>>,
    /// The interpreter to use (`numng`, `nupm`, `packer`/`packer.nu`), or
    /// `None` to auto-detect from the files present at the resolved path.
    pub package_format: Option<String>,
    /// Every other key the manifest declared, preserved verbatim for the
    /// format-specific interpreters to read.
    pub extra_data: Option<Map<String, Value>>,
}

impl Package {
    /// Parses a package declaration from a JSON value.
    ///
    /// A bare JSON string `"foo"` is promoted to `{"name": "foo"}`. Any key
    /// not in the recognized set is preserved in `extra_data`.
    pub fn from_value(value: &Value, allow_no_name: bool) -> Result<Package, ManifestError> {
        let object = match value {
            Value::String(name) => {
                let mut map = Map::new();
                map.insert("name".to_string(), Value::String(name.clone()));
                map
            },
            Value::Object(map) => map.clone(),
            other => {
                return Err(ManifestError::InvalidShape(format!(
                    "expected an object or string, got {other}"
                )));
            },
        };

        let name = match object.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None if allow_no_name => "NO_NAME_PACKAGE".to_string(),
            None => {
                return Err(ManifestError::MissingName(
                    Value::Object(object.clone()).to_string(),
                ));
            },
        };

        let depends = if object.contains_key("depends") {
            let mut deps = Vec::new();
            for item in listify(object.get("depends")) {
                deps.push(Package::from_value(item, false)?);
            }
            Some(deps)
        } else {
            None
        };

        let registries = {
            let regs: Result<Vec<_>, _> = listify(object.get("registry"))
                .iter()
                .map(|item| Package::from_value(item, true))
                .collect();
            let regs = regs?;
            if regs.is_empty() { None } else { Some(regs) }
        };

        let extra_data: Map<String, Value> = object
            .iter()
            .filter(|(k, _)| !RECOGNIZED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Package {
            name,
            depends,
            source_type: object.get("source_type").and_then(Value::as_str).map(String::from),
            source_uri: object.get("source_uri").and_then(Value::as_str).map(String::from),
            source_git_ref: object.get("git_ref").and_then(Value::as_str).map(String::from),
            source_path_offset: object.get("path_offset").and_then(Value::as_str).map(String::from),
            registries,
            package_format: object.get("package_format").and_then(Value::as_str).map(String::from),
            extra_data: if extra_data.is_empty() { None } else { Some(extra_data) },
        })
    }

    /// Parses a manifest file from disk.
    pub fn from_file(path: &std::path::Path, allow_no_name: bool) -> Result<Package, ManifestError> {
        let text = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;
        Package::from_value(&value, allow_no_name)
    }

    /// Fills any unset scalar field from `other`, and left-biased-merges
    /// `extra_data` (this package's keys win on conflict). Never overwrites
    /// an already-set field.
    pub fn include_data(&mut self, other: &Package) {
        if self.depends.is_none() {
            self.depends = other.depends.clone();
        }
        if self.source_type.is_none() {
            self.source_type = other.source_type.clone();
        }
        if self.source_uri.is_none() {
            self.source_uri = other.source_uri.clone();
        }
        if self.source_git_ref.is_none() {
            self.source_git_ref = other.source_git_ref.clone();
        }
        if self.source_path_offset.is_none() {
            self.source_path_offset = other.source_path_offset.clone();
        }
        if self.package_format.is_none() {
            self.package_format = other.package_format.clone();
        }
        if let Some(other_extra) = &other.extra_data {
            let mut merged = other_extra.clone();
            if let Some(self_extra) = &self.extra_data {
                for (k, v) in self_extra {
                    merged.insert(k.clone(), v.clone());
                }
            }
            self.extra_data = Some(merged);
        }
    }

    /// Whether this dependency opted out of registry enrichment via
    /// `"ignore_registry": true` in its extra data.
    pub fn ignores_registry(&self) -> bool {
        self.extra_data
            .as_ref()
            .and_then(|m| m.get("ignore_registry"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The `version` constraint string requested for this dependency, if any.
    pub fn wanted_version(&self) -> Option<&str> {
        self.extra_data.as_ref().and_then(|m| m.get("version")).and_then(Value::as_str)
    }
}

/// Flattens an optional JSON value that may be a single item, a list, or
/// absent, into a list of items — mirroring the source's `_listify`.
pub fn listify(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
    }
}

/// A FIFO work item: a package still needing its format interpreted, paired
/// with its already-resolved base path on disk.
pub type WorkQueue = VecDeque<(Package, std::path::PathBuf)>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_string_promotes_to_name_only() {
        let value = Value::String("foo".to_string());
        let pkg = Package::from_value(&value, false).unwrap();
        assert_eq!(pkg.name, "foo");
        assert!(pkg.depends.is_none());
        assert!(pkg.source_uri.is_none());
    }

    #[test]
    fn missing_name_without_allowance_errors() {
        let value = serde_json::json!({"source_uri": "https://example.com/x"});
        assert!(Package::from_value(&value, false).is_err());
    }

    #[test]
    fn present_but_empty_depends_is_distinguished_from_absent() {
        let with_deps = Package::from_value(&serde_json::json!({"name": "a", "depends": []}), false).unwrap();
        assert_eq!(with_deps.depends, Some(vec![]));

        let without_deps = Package::from_value(&serde_json::json!({"name": "a"}), false).unwrap();
        assert!(without_deps.depends.is_none());
    }

    #[test]
    fn unrecognized_keys_land_in_extra_data() {
        let value = serde_json::json!({"name": "a", "build_command": "make", "nu_plugins": ["p.nu"]});
        let pkg = Package::from_value(&value, false).unwrap();
        let extra = pkg.extra_data.unwrap();
        assert_eq!(extra.get("build_command").unwrap(), "make");
        assert!(extra.contains_key("nu_plugins"));
    }

    #[test]
    fn include_data_never_overwrites_set_fields() {
        let mut pkg = Package::from_value(&serde_json::json!({"name": "a", "source_uri": "u1"}), false).unwrap();
        let other = Package::from_value(
            &serde_json::json!({"name": "b", "source_uri": "u2", "git_ref": "main"}),
            false,
        )
        .unwrap();
        pkg.include_data(&other);
        assert_eq!(pkg.source_uri.as_deref(), Some("u1"));
        assert_eq!(pkg.source_git_ref.as_deref(), Some("main"));
    }

    #[test]
    fn include_data_left_biased_merges_extra_data() {
        let mut pkg =
            Package::from_value(&serde_json::json!({"name": "a", "version": "1.0"}), false).unwrap();
        let other =
            Package::from_value(&serde_json::json!({"name": "b", "version": "2.0", "path_offset_hint": "x"}), false)
                .unwrap();
        pkg.include_data(&other);
        let extra = pkg.extra_data.unwrap();
        assert_eq!(extra.get("version").unwrap(), "1.0");
        assert_eq!(extra.get("path_offset_hint").unwrap(), "x");
    }
}
