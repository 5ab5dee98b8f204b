//! The `nupm` package format: `nupm.nuon`, Nushell's own package-manager
//! metadata, declaring a package `type` (`module`, `script`, or `custom`),
//! extra `scripts`, and `dependencies` resolved exclusively through
//! registries.

use std::path::Path;

use serde_json::{Map, Value};

use super::InterpretError;
use crate::manifest::Package;
use crate::nuon;
use crate::resolve::Resolver;

pub(crate) fn load(resolver: &mut Resolver, package: &Package, nupm_nuon_path: &Path, base_path: &Path) -> Result<(), InterpretError> {
    let text = std::fs::read_to_string(nupm_nuon_path)?;
    let parsed = nuon::to_json(&text)?;
    load_parsed(resolver, package, &parsed, base_path)
}

fn load_parsed(resolver: &mut Resolver, package: &Package, nupm_nuon: &Value, base_path: &Path) -> Result<(), InterpretError> {
    let Value::Object(nupm_nuon) = nupm_nuon else {
        return Err(InterpretError::Validation(format!("invalid nupm.nuon in {} (not a record)", package.name)));
    };

    let package_type = nupm_nuon
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| InterpretError::Validation(format!("invalid nupm.nuon in {} (missing type)", package.name)))?;

    match package_type {
        "module" => load_module(resolver, package, nupm_nuon, base_path)?,
        "script" => load_script(resolver, package, base_path)?,
        "custom" => build_custom(resolver, package, base_path)?,
        other => {
            return Err(InterpretError::Validation(format!(
                "failed to load nupm-package {} (unknown package type: {other})",
                package.name
            )));
        },
    }

    load_scripts(resolver, package, nupm_nuon, base_path)?;
    load_dependencies(resolver, package, nupm_nuon)?;
    Ok(())
}

fn load_module(resolver: &mut Resolver, package: &Package, nupm_nuon: &Map<String, Value>, base_path: &Path) -> Result<(), InterpretError> {
    let name = nupm_nuon
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| InterpretError::Validation(format!("invalid nupm.nuon in {} (missing name)", package.name)))?;
    let module_dir = base_path.join(name);
    if !module_dir.exists() {
        return Err(InterpretError::Validation(format!(
            "module-nupm-package {} does not contain a module dir",
            package.name
        )));
    }
    resolver.register_module(name, &module_dir);
    Ok(())
}

fn load_script(resolver: &mut Resolver, package: &Package, base_path: &Path) -> Result<(), InterpretError> {
    let script_name = format!("{}.nu", package.name);
    let script_path = base_path.join(&script_name);
    if script_path.exists() {
        resolver.register_binary(&script_name, &script_path)?;
    }
    Ok(())
}

fn build_custom(resolver: &Resolver, package: &Package, base_path: &Path) -> Result<(), InterpretError> {
    if !resolver.allow_build_commands {
        return Err(InterpretError::BuildCommandsNotAllowed { name: package.name.clone() });
    }
    let build_script = base_path.join("build.nu");
    if !build_script.exists() {
        return Err(InterpretError::Validation(format!(
            "invalid nupm custom-type package {} (missing build.nu)",
            package.name
        )));
    }
    // nupm runs a custom build script from a fresh, empty working directory,
    // giving it no paths of its own to rely on.
    let tmpdir = tempfile::TempDir::new()?;
    tracing::debug!(package = %package.name, "running nupm-custom build");
    let status = std::process::Command::new("nu")
        .args(["--no-config", build_script.to_str().unwrap_or_default()])
        .current_dir(tmpdir.path())
        .stdout(std::process::Stdio::null())
        .status()?;
    if !status.success() {
        return Err(InterpretError::BuildCommandFailed { name: package.name.clone() });
    }
    Ok(())
}

fn load_scripts(resolver: &mut Resolver, package: &Package, nupm_nuon: &Map<String, Value>, base_path: &Path) -> Result<(), InterpretError> {
    let Some(scripts) = nupm_nuon.get("scripts") else {
        return Ok(());
    };
    let Value::Array(scripts) = scripts else {
        return Err(InterpretError::Validation(format!("invalid nupm.nuon in {} (scripts is not a list)", package.name)));
    };
    for script in scripts {
        let Some(rel) = script.as_str() else {
            return Err(InterpretError::Validation(format!(
                "invalid nupm.nuon in {} (scripts entry is not a string)",
                package.name
            )));
        };
        let abs = super::security_join(&package.name, "script", base_path, rel)?;
        let name = abs.file_name().and_then(|n| n.to_str()).unwrap_or(rel).to_string();
        resolver.register_binary(&name, &abs)?;
    }
    Ok(())
}

fn load_dependencies(resolver: &mut Resolver, package: &Package, nupm_nuon: &Map<String, Value>) -> Result<(), InterpretError> {
    let Some(dependencies) = nupm_nuon.get("dependencies") else {
        return Ok(());
    };
    let deps: Vec<(String, Option<String>)> = match dependencies {
        Value::Array(list) => list
            .iter()
            .filter_map(Value::as_str)
            .map(|dep| match dep.rsplit_once('/') {
                Some((name, version)) => (name.to_string(), Some(version.to_string())),
                None => (dep.to_string(), None),
            })
            .collect(),
        Value::Object(map) => map.iter().map(|(name, version)| (name.clone(), version.as_str().map(String::from))).collect(),
        _ => {
            return Err(InterpretError::Validation(format!(
                "invalid nupm.nuon in {} (dependencies is neither a list nor an object)",
                package.name
            )));
        },
    };
    for (name, version) in deps {
        // Some packages declare nushell-version compatibility this way;
        // it names no real package.
        if name == "nushell" {
            continue;
        }
        let Some(mut dep) = crate::registry::lookup(&resolver.registries, &name, version.as_deref())? else {
            return Err(InterpretError::Validation(format!(
                "failed to load {} (unknown dependency: {name}/{})",
                package.name,
                version.as_deref().unwrap_or("")
            )));
        };
        let dep_base = resolver.download_package(&mut dep)?;
        resolver.enqueue(dep, dep_base);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::resolve::ResolverOptions;

    #[test]
    fn module_type_requires_named_directory() {
        let tmp = TempDir::new().unwrap();
        let mut r = Resolver::new(ResolverOptions::new(tmp.path().join("store")));
        let pkg = Package::from_value(&serde_json::json!({"name": "a"}), false).unwrap();
        let parsed = serde_json::json!({"type": "module", "name": "a"});
        let err = load_parsed(&mut r, &pkg, &parsed, tmp.path());
        assert!(err.is_err());
    }

    #[test]
    fn module_type_registers_existing_directory() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().join("a").join("b").join("home");
        let mut r =
            Resolver::new(ResolverOptions { nupm_home: Some(home), ..ResolverOptions::new(tmp.path().join("store")) });
        let pkg = Package::from_value(&serde_json::json!({"name": "foo"}), false).unwrap();
        std::fs::create_dir_all(tmp.path().join("foo")).unwrap();
        let parsed = serde_json::json!({"type": "module", "name": "foo"});
        load_parsed(&mut r, &pkg, &parsed, tmp.path()).unwrap();
        assert_eq!(r.symlink_plan.len(), 1);
    }

    #[test]
    fn script_type_registers_binary_when_present() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().join("a").join("b").join("home");
        let mut r =
            Resolver::new(ResolverOptions { nupm_home: Some(home), ..ResolverOptions::new(tmp.path().join("store")) });
        let pkg = Package::from_value(&serde_json::json!({"name": "foo"}), false).unwrap();
        std::fs::write(tmp.path().join("foo.nu"), "").unwrap();
        let parsed = serde_json::json!({"type": "script"});
        load_parsed(&mut r, &pkg, &parsed, tmp.path()).unwrap();
        assert_eq!(r.symlink_plan.len(), 1);
    }

    #[test]
    fn custom_type_requires_allow_build_commands() {
        let tmp = TempDir::new().unwrap();
        let mut r = Resolver::new(ResolverOptions::new(tmp.path().join("store")));
        let pkg = Package::from_value(&serde_json::json!({"name": "a"}), false).unwrap();
        std::fs::write(tmp.path().join("build.nu"), "").unwrap();
        let parsed = serde_json::json!({"type": "custom"});
        let err = load_parsed(&mut r, &pkg, &parsed, tmp.path()).unwrap_err();
        assert!(matches!(err, InterpretError::BuildCommandsNotAllowed { .. }));
    }

    #[test]
    fn nushell_pseudo_dependency_is_skipped() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("a")).unwrap();
        let mut r = Resolver::new(ResolverOptions::new(tmp.path().join("store")));
        let pkg = Package::from_value(&serde_json::json!({"name": "a"}), false).unwrap();
        let parsed = serde_json::json!({"type": "module", "name": "a", "dependencies": ["nushell/0.100"]});
        load_parsed(&mut r, &pkg, &parsed, tmp.path()).unwrap();
    }
}
