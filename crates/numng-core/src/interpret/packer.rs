//! The `packer.nu` package format: `meta.nuon` declaring prefixed and
//! unprefixed modules, plus conventional `env.nu`/`init.nu`/`lib/` entries
//! picked up by file presence alone.

use std::path::Path;

use serde_json::Value;

use super::{InterpretError, json_quote, security_join};
use crate::manifest::Package;
use crate::nuon;
use crate::resolve::Resolver;
use crate::snippet::Snippet;

pub(crate) fn load(resolver: &mut Resolver, package: &Package, meta_nuon_path: &Path, base_path: &Path) -> Result<(), InterpretError> {
    let text = std::fs::read_to_string(meta_nuon_path)?;
    let parsed = nuon::to_json(&text)?;
    load_parsed(resolver, package, &parsed, base_path)
}

fn load_parsed(resolver: &mut Resolver, package: &Package, meta_nuon: &Value, base_path: &Path) -> Result<(), InterpretError> {
    let Value::Object(meta_nuon) = meta_nuon else {
        return Err(InterpretError::Validation(format!("invalid packer.nu meta.nuon in {} (not a record)", package.name)));
    };
    let deps = super::direct_dependency_names(package);

    for module in crate::manifest::listify(meta_nuon.get("prefixed_modules")) {
        let Some(rel) = module.as_str() else {
            return Err(InterpretError::Validation(format!(
                "invalid packer.nu meta.nuon in {} (prefixed_modules entry is not a string)",
                package.name
            )));
        };
        let abs = security_join(&package.name, "prefixed module", base_path, rel)?;
        resolver.use_snippets.push(Snippet {
            name: package.name.clone(),
            depends: deps.clone(),
            text: format!("export use {}", abs.display()),
        });
    }

    for module in crate::manifest::listify(meta_nuon.get("modules")) {
        let Some(rel) = module.as_str() else {
            return Err(InterpretError::Validation(format!(
                "invalid packer.nu meta.nuon in {} (modules entry is not a string)",
                package.name
            )));
        };
        let abs = security_join(&package.name, "unprefixed module", base_path, rel)?;
        resolver.use_snippets.push(Snippet {
            name: package.name.clone(),
            depends: deps.clone(),
            text: format!("export use {} *", abs.display()),
        });
    }

    let env_nu = base_path.join("env.nu");
    if env_nu.is_file() {
        resolver.env_snippets.push(Snippet {
            name: package.name.clone(),
            depends: deps.clone(),
            text: format!("source-env {}", env_nu.display()),
        });
    }

    let init_nu = base_path.join("init.nu");
    if init_nu.is_file() {
        resolver.env_snippets.push(Snippet {
            name: package.name.clone(),
            depends: deps.clone(),
            text: format!("use {} *", init_nu.display()),
        });
    }

    let lib_dir = base_path.join("lib");
    if lib_dir.is_dir() {
        resolver.env_snippets.push(Snippet {
            name: package.name.clone(),
            depends: deps.clone(),
            text: format!(
                "$env.NU_LIB_DIRS = ($env | get -i NU_LIB_DIRS | default [] | append {})",
                json_quote(&lib_dir)
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::resolve::ResolverOptions;

    #[test]
    fn registers_prefixed_and_unprefixed_modules() {
        let tmp = TempDir::new().unwrap();
        let mut r = Resolver::new(ResolverOptions::new(tmp.path().join("store")));
        let pkg = Package::from_value(&serde_json::json!({"name": "a"}), false).unwrap();
        let parsed = serde_json::json!({"prefixed_modules": ["mod1.nu"], "modules": ["mod2.nu"]});
        load_parsed(&mut r, &pkg, &parsed, tmp.path()).unwrap();
        assert_eq!(r.use_snippets.len(), 2);
        assert!(r.use_snippets[0].text.starts_with("export use "));
        assert!(!r.use_snippets[0].text.contains('*'));
        assert!(r.use_snippets[1].text.ends_with('*'));
    }

    #[test]
    fn picks_up_env_init_and_lib_by_presence() {
        let tmp = TempDir::new().unwrap();
        let mut r = Resolver::new(ResolverOptions::new(tmp.path().join("store")));
        let pkg = Package::from_value(&serde_json::json!({"name": "a"}), false).unwrap();
        std::fs::write(tmp.path().join("env.nu"), "").unwrap();
        std::fs::write(tmp.path().join("init.nu"), "").unwrap();
        std::fs::create_dir(tmp.path().join("lib")).unwrap();
        load_parsed(&mut r, &pkg, &serde_json::json!({}), tmp.path()).unwrap();
        assert_eq!(r.env_snippets.len(), 3);
    }

    #[test]
    fn rejects_module_path_escaping_base() {
        let tmp = TempDir::new().unwrap();
        let mut r = Resolver::new(ResolverOptions::new(tmp.path().join("store")));
        let pkg = Package::from_value(&serde_json::json!({"name": "a"}), false).unwrap();
        let parsed = serde_json::json!({"modules": ["../../etc/passwd"]});
        let err = load_parsed(&mut r, &pkg, &parsed, tmp.path()).unwrap_err();
        assert!(matches!(err, InterpretError::Validation(_)));
    }
}
