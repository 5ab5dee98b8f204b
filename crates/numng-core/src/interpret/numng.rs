//! The `numng` package format: `numng.json` (or, absent that file, the
//! manifest's own `extra_data`) declaring dependencies, a build step,
//! cross-package symlinks (`linkin`), plugins, libraries, shell-config
//! snippets, and binaries.

use std::path::Path;

use serde_json::{Map, Value};

use super::{InterpretError, json_quote, run_build_command, security_join};
use crate::manifest::{Package, listify};
use crate::resolve::Resolver;
use crate::snippet::Snippet;

pub(crate) fn load(
    resolver: &mut Resolver,
    package: &Package,
    numng_json_path: Option<&Path>,
    base_path: &Path,
) -> Result<(), InterpretError> {
    let numng_json: Map<String, Value> = match numng_json_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            match serde_json::from_str(&text)? {
                Value::Object(map) => map,
                _ => {
                    return Err(InterpretError::Validation(format!(
                        "invalid numng.json in {} (not an object)",
                        package.name
                    )));
                },
            }
        },
        None => package.extra_data.clone().unwrap_or_default(),
    };

    for dependency in listify(numng_json.get("depends")) {
        let mut dep = Package::from_value(dependency, false)?;
        let dep_base = resolver.download_package(&mut dep)?;
        resolver.enqueue(dep, dep_base);
    }

    if let Some(build_command) = numng_json.get("build_command").and_then(Value::as_str) {
        if !resolver.allow_build_commands {
            return Err(InterpretError::BuildCommandsNotAllowed { name: package.name.clone() });
        }
        tracing::debug!(package = %package.name, command = build_command, "running build_command");
        if !run_build_command(base_path, build_command)? {
            return Err(InterpretError::BuildCommandFailed { name: package.name.clone() });
        }
    }

    if let Some(linkin) = numng_json.get("linkin") {
        let Value::Object(linkin) = linkin else {
            return Err(InterpretError::Validation(format!(
                "invalid numng.json in {} (linkin is not an object)",
                package.name
            )));
        };
        for (key, spec) in linkin {
            let (repo_path, dest_rel) = match key.split_once(':') {
                Some((repo_path, dest)) => (Some(repo_path), dest),
                None => (None, key.as_str()),
            };
            let dest = security_join(&package.name, "linkin", base_path, dest_rel)?;

            let mut linkin_pkg = Package::from_value(spec, false)?;
            let mut linkin_base = resolver.download_package(&mut linkin_pkg)?;
            if let Some(repo_path) = repo_path {
                linkin_base = security_join(&package.name, "linkin repository path", &linkin_base, repo_path)?;
            }

            if let Ok(meta) = std::fs::symlink_metadata(&dest) {
                if !meta.file_type().is_symlink() {
                    return Err(InterpretError::Validation(format!(
                        "failed linkin at {}: path exists and is not a symlink",
                        dest.display()
                    )));
                }
                if std::fs::read_link(&dest).ok().as_deref() == Some(linkin_base.as_path()) {
                    continue;
                }
                std::fs::remove_file(&dest)?;
            } else if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            resolver.register_linkin(&linkin_base, &dest);
        }
    }

    for plugin in listify(numng_json.get("nu_plugins")) {
        let Some(rel) = plugin.as_str() else {
            return Err(InterpretError::Validation(format!(
                "invalid numng.json in {} (nu_plugins entry is not a string)",
                package.name
            )));
        };
        let abs = security_join(&package.name, "plugin", base_path, rel)?;
        resolver.plugin_paths.push(abs);
    }

    if let Some(nu_libs) = numng_json.get("nu_libs") {
        let Value::Object(nu_libs) = nu_libs else {
            return Err(InterpretError::Validation(format!(
                "invalid numng.json in {} (nu_libs is not an object)",
                package.name
            )));
        };
        for (name, rel) in nu_libs {
            let Some(rel) = rel.as_str() else {
                return Err(InterpretError::Validation(format!(
                    "invalid numng.json in {} (nu_libs.{name} is not a string)",
                    package.name
                )));
            };
            let abs = security_join(&package.name, "lib", base_path, rel)?;
            resolver.register_module(name, &abs);
        }
    }

    if let Some(shell_config) = numng_json.get("shell_config") {
        let Value::Object(shell_config) = shell_config else {
            return Err(InterpretError::Validation(format!(
                "invalid numng.json in {} (shell_config is not an object)",
                package.name
            )));
        };
        let deps = super::direct_dependency_names(package);

        for source in listify(shell_config.get("source")) {
            let rel = source.as_str().unwrap_or_default();
            let abs = security_join(&package.name, "shell_config", base_path, rel)?;
            resolver.script_snippets.push(Snippet {
                name: package.name.clone(),
                depends: deps.clone(),
                text: format!("source {}", json_quote(&abs)),
            });
        }
        for use_file in listify(shell_config.get("use")) {
            let rel = use_file.as_str().unwrap_or_default();
            let abs = security_join(&package.name, "shell_config", base_path, rel)?;
            resolver.use_snippets.push(Snippet {
                name: package.name.clone(),
                depends: deps.clone(),
                text: format!("export use {}", json_quote(&abs)),
            });
        }
        for use_file in listify(shell_config.get("use_all")) {
            let rel = use_file.as_str().unwrap_or_default();
            let abs = security_join(&package.name, "shell_config", base_path, rel)?;
            resolver.use_snippets.push(Snippet {
                name: package.name.clone(),
                depends: deps.clone(),
                text: format!("export use {} *", json_quote(&abs)),
            });
        }
        for source_env in listify(shell_config.get("source_env")) {
            let rel = source_env.as_str().unwrap_or_default();
            let abs = security_join(&package.name, "shell_config", base_path, rel)?;
            resolver.env_snippets.push(Snippet {
                name: package.name.clone(),
                depends: deps.clone(),
                text: format!("source-env {}", json_quote(&abs)),
            });
        }
    }

    if let Some(bin) = numng_json.get("bin") {
        let Value::Object(bin) = bin else {
            return Err(InterpretError::Validation(format!(
                "invalid numng.json in {} (bin is not an object)",
                package.name
            )));
        };
        for (name, rel) in bin {
            let Some(rel) = rel.as_str() else {
                return Err(InterpretError::Validation(format!(
                    "invalid numng.json in {} (bin.{name} is not a string)",
                    package.name
                )));
            };
            let abs = security_join(&package.name, "binary", base_path, rel)?;
            resolver.register_binary(name, &abs)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::resolve::{Resolver, ResolverOptions};

    fn resolver(store_root: std::path::PathBuf) -> Resolver {
        Resolver::new(ResolverOptions::new(store_root))
    }

    #[test]
    fn rejects_build_command_without_allowance() {
        let tmp = TempDir::new().unwrap();
        let mut r = resolver(tmp.path().join("store"));
        let pkg = Package::from_value(&serde_json::json!({"name": "a"}), false).unwrap();
        let numng_json = tmp.path().join("numng.json");
        std::fs::write(&numng_json, r#"{"build_command": "touch marker"}"#).unwrap();
        let err = load(&mut r, &pkg, Some(&numng_json), tmp.path()).unwrap_err();
        assert!(matches!(err, InterpretError::BuildCommandsNotAllowed { .. }));
    }

    #[test]
    fn registers_shell_config_snippets_tagged_with_direct_deps() {
        let tmp = TempDir::new().unwrap();
        let mut r = resolver(tmp.path().join("store"));
        let pkg = Package::from_value(
            &serde_json::json!({"name": "a", "depends": [{"name": "lib1", "source_uri": "https://example.com/lib1"}]}),
            false,
        )
        .unwrap();
        std::fs::write(tmp.path().join("config.nu"), "").unwrap();
        let numng_json = tmp.path().join("numng.json");
        std::fs::write(&numng_json, r#"{"shell_config": {"source": "config.nu"}}"#).unwrap();
        load(&mut r, &pkg, Some(&numng_json), tmp.path()).unwrap();
        assert_eq!(r.script_snippets.len(), 1);
        assert_eq!(r.script_snippets[0].depends, vec!["lib1".to_string()]);
    }

    #[test]
    fn rejects_lib_path_escaping_base() {
        let tmp = TempDir::new().unwrap();
        let mut r = resolver(tmp.path().join("store"));
        let pkg = Package::from_value(&serde_json::json!({"name": "a"}), false).unwrap();
        let numng_json = tmp.path().join("numng.json");
        std::fs::write(&numng_json, r#"{"nu_libs": {"evil": "../../etc"}}"#).unwrap();
        let err = load(&mut r, &pkg, Some(&numng_json), tmp.path()).unwrap_err();
        assert!(matches!(err, InterpretError::Validation(_)));
    }
}
