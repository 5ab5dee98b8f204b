//! The resolver: the breadth-first package-graph walk that ties the git
//! store, registries, format interpreters, and script/home emission
//! together into one build.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, info_span};

use crate::git::{GitError, GitStore};
use crate::home::{self, HomeError};
use crate::interpret::{self, InterpretError};
use crate::manifest::{ManifestError, Package};
use crate::path::{self, PathError};
use crate::plugins::{self, PluginError};
use crate::registry::{Registry, RegistryError};
use crate::snippet::Snippet;

/// Everything a [`Resolver`] needs to know before a build starts.
pub struct ResolverOptions {
    /// The base directory git-acquired packages are stored under
    /// (typically `<cache-dir>/numng/store/git`).
    pub store_root: PathBuf,
    /// Where to materialize the `modules/`/`bin/`/`overlays/` symlink tree.
    /// `None` skips home-directory handling entirely (scripts still emit
    /// plain paths into the git store).
    pub nupm_home: Option<PathBuf>,
    /// Whether an existing home directory may be deleted and recreated.
    pub delete_existing_home: bool,
    /// Whether to `git fetch`+`reset --hard` already-acquired worktrees.
    pub pull_updates: bool,
    /// Whether to reconcile Nushell plugin registrations after the build.
    pub handle_nu_plugins: bool,
    /// Overrides the root manifest's own `allow_build_commands` setting
    /// when set (e.g. the CLI's own `--allow-build-commands` flag).
    pub allow_build_commands: Option<bool>,
    /// The process-wide default consulted when neither `allow_build_commands`
    /// above nor the root manifest's own setting is present.
    pub default_allow_build_commands: bool,
    /// Destination for the full loader script, if any.
    pub script_file: Option<PathBuf>,
    /// Destination for the overlay-only script, if any.
    pub overlay_file: Option<PathBuf>,
}

impl ResolverOptions {
    /// Creates options with every optional output disabled; set the fields
    /// you need before calling [`Resolver::new`].
    pub fn new(store_root: PathBuf) -> Self {
        ResolverOptions {
            store_root,
            nupm_home: None,
            delete_existing_home: false,
            pull_updates: false,
            handle_nu_plugins: false,
            allow_build_commands: None,
            default_allow_build_commands: false,
            script_file: None,
            overlay_file: None,
        }
    }
}

/// Errors that can abort a build.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Home(#[from] HomeError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Interpret(#[from] InterpretError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A summary of what a build produced, for the CLI to report.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Number of distinct packages loaded (after dedup by resolved path).
    pub packages_loaded: usize,
    /// Number of symlinks materialized into the home directory.
    pub symlinks_applied: usize,
    /// Whether the full loader script was written.
    pub script_written: bool,
    /// Whether the overlay script was written.
    pub overlay_written: bool,
}

/// The resolver's working state for a single build. Construct via
/// [`Resolver::new`] and consume with [`Resolver::resolve`].
pub struct Resolver {
    pub(crate) options: ResolverOptions,
    pub(crate) git: GitStore,
    pub(crate) registries: Vec<Box<dyn Registry>>,
    pub(crate) queue: VecDeque<(Package, PathBuf)>,
    pub(crate) loaded: HashSet<PathBuf>,
    pub(crate) env_snippets: Vec<Snippet>,
    pub(crate) use_snippets: Vec<Snippet>,
    pub(crate) script_snippets: Vec<Snippet>,
    pub(crate) plugin_paths: Vec<PathBuf>,
    pub(crate) symlink_plan: Vec<(PathBuf, PathBuf)>,
    pub(crate) allow_build_commands: bool,
}

impl Resolver {
    /// Creates a resolver with empty queue/registry state; nothing is
    /// fetched until [`Resolver::resolve`] is called.
    pub fn new(options: ResolverOptions) -> Self {
        let git = GitStore::new(options.store_root.clone());
        Resolver {
            options,
            git,
            registries: Vec::new(),
            queue: VecDeque::new(),
            loaded: HashSet::new(),
            env_snippets: Vec::new(),
            use_snippets: Vec::new(),
            script_snippets: Vec::new(),
            plugin_paths: Vec::new(),
            symlink_plan: Vec::new(),
            allow_build_commands: false,
        }
    }

    /// Runs a full build starting from the manifest at `manifest_path`:
    /// loads registries, walks the dependency graph, emits scripts,
    /// rebuilds the home directory, and reconciles plugins.
    pub fn resolve(mut self, manifest_path: &Path) -> Result<BuildReport, ResolveError> {
        let span = info_span!("resolve", manifest = %manifest_path.display());
        let _enter = span.enter();

        if let Some(home) = &self.options.nupm_home {
            home::check_depth(home)?;
            if home.exists() && !self.options.delete_existing_home {
                return Err(HomeError::AlreadyExists(home.clone()).into());
            }
        }

        debug!("loading root package");
        let root = Package::from_file(manifest_path, true)?;
        let base_path = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        for mut registry_pkg in root.registries.clone().unwrap_or_default() {
            let registry_base = self.download_package(&mut registry_pkg)?;
            self.load_registry(&registry_pkg, &registry_base)?;
        }

        self.allow_build_commands = self.options.allow_build_commands.unwrap_or_else(|| {
            root.extra_data
                .as_ref()
                .and_then(|m| m.get("allow_build_commands"))
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(self.options.default_allow_build_commands)
        });

        self.queue.push_back((root, base_path));

        let mut loaded_count = 0;
        while let Some((package, package_base)) = self.queue.pop_front() {
            let canonical = path::normalize(&package_base);
            if self.loaded.contains(&canonical) {
                continue;
            }
            self.loaded.insert(canonical);
            loaded_count += 1;
            info!(package = %package.name, "loading package");
            interpret::dispatch(&mut self, package, package_base)?;
        }

        let mut report = BuildReport { packages_loaded: loaded_count, ..Default::default() };

        if let Some(script_path) = &self.options.script_file {
            debug!(path = %script_path.display(), "generating script");
            let script = home::render_full_script(
                self.options.nupm_home.as_deref(),
                &self.env_snippets,
                &self.use_snippets,
                &self.script_snippets,
            )?;
            home::write_atomic(script_path, &script)?;
            report.script_written = true;
        }
        if let Some(overlay_path) = &self.options.overlay_file {
            debug!(path = %overlay_path.display(), "generating overlay");
            let overlay =
                home::render_overlay_script(self.options.nupm_home.as_deref(), &self.env_snippets, &self.use_snippets)?;
            home::write_atomic(overlay_path, &overlay)?;
            report.overlay_written = true;
        }

        if let Some(home_dir) = self.options.nupm_home.clone() {
            debug!(path = %home_dir.display(), "preparing home directory");
            home::prepare(&home_dir, self.options.delete_existing_home)?;
        }
        // `linkin` symlinks target paths inside a package's own source tree
        // rather than the home directory, so this must apply unconditionally
        // even when no home directory is configured.
        debug!(count = self.symlink_plan.len(), "applying symlink plan");
        home::apply_symlinks(&self.symlink_plan)?;
        report.symlinks_applied = self.symlink_plan.len();

        if self.options.handle_nu_plugins {
            plugins::reconcile(&self.options.store_root, &self.plugin_paths)?;
        }

        Ok(report)
    }

    fn load_registry(&mut self, package: &Package, base_path: &Path) -> Result<(), ResolveError> {
        use crate::registry::{NumngRegistry, NupmRegistry};
        match package.package_format.as_deref() {
            Some("nupm") => {
                let registry_dir = base_path.join("registry");
                if !registry_dir.join("registry.nuon").is_file() {
                    return Err(ResolveError::Validation(
                        "failed to load nupm registry (registry/registry.nuon not found)".to_string(),
                    ));
                }
                self.registries.push(Box::new(NupmRegistry::open(registry_dir)?));
            },
            Some("numng") => {
                self.registries.push(Box::new(NumngRegistry::new(base_path.to_path_buf())));
            },
            _ => {
                return Err(ResolveError::Validation(
                    "failed to load registry (unknown or unsupported package_format)".to_string(),
                ));
            },
        }
        Ok(())
    }

    /// Enriches `package` from the first matching registry (unless it opts
    /// out), fetches its source, and returns the resolved base path.
    pub(crate) fn download_package(&mut self, package: &mut Package) -> Result<PathBuf, InterpretError> {
        if !self.registries.is_empty() && !package.ignores_registry() {
            let version = package.wanted_version();
            if let Some(found) = crate::registry::lookup(&self.registries, &package.name, version)? {
                package.include_data(&found);
            }
        }
        let source_uri = package.source_uri.clone().ok_or_else(|| {
            InterpretError::Validation(format!("failed to download {} (unknown source_uri)", package.name))
        })?;

        let base_path = match package.source_type.as_deref() {
            Some("git") | None => {
                let worktree = self.git.acquire(&source_uri, package.source_git_ref.as_deref(), self.options.pull_updates)?;
                match &package.source_path_offset {
                    Some(offset) => path::join_contained(&worktree, [offset])?,
                    None => worktree,
                }
            },
            Some(other) => {
                return Err(InterpretError::Validation(format!(
                    "failed to download {} (unknown or unsupported source-type: {other})",
                    package.name
                )));
            },
        };
        Ok(base_path)
    }

    pub(crate) fn enqueue(&mut self, package: Package, base_path: PathBuf) {
        self.queue.push_back((package, base_path));
    }

    pub(crate) fn register_module(&mut self, name: &str, source: &Path) {
        if let Some(home) = &self.options.nupm_home {
            let dst = home.join("modules").join(path::filesystem_safe(name));
            self.symlink_plan.push((source.to_path_buf(), dst));
        }
    }

    pub(crate) fn register_overlay(&mut self, name: &str, source: &Path) {
        if let Some(home) = &self.options.nupm_home {
            let dst = home.join("overlays").join(path::filesystem_safe(name));
            self.symlink_plan.push((source.to_path_buf(), dst));
        }
    }

    /// Plans a symlink unconditionally, independent of whether a home
    /// directory is configured — used for `linkin` targets, which live
    /// inside a package's own directory rather than under the home tree.
    pub(crate) fn register_linkin(&mut self, source: &Path, destination: &Path) {
        self.symlink_plan.push((source.to_path_buf(), destination.to_path_buf()));
    }

    pub(crate) fn register_binary(&mut self, name: &str, source: &Path) -> Result<(), InterpretError> {
        if self.options.nupm_home.is_none() {
            return Ok(());
        }
        mark_executable(source)?;
        let home = self.options.nupm_home.as_ref().unwrap();
        let dst = home.join("bin").join(path::filesystem_safe(name));
        self.symlink_plan.push((source.to_path_buf(), dst));
        Ok(())
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o100);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use tempfile::TempDir;

    use super::*;

    fn init_bare_origin(dir: &Path, files: &[(&str, &str)]) -> PathBuf {
        let origin = dir.join("origin");
        std::fs::create_dir_all(&origin).unwrap();
        for (name, contents) in files {
            std::fs::write(origin.join(name), contents).unwrap();
        }
        for args in [
            vec!["init", "--quiet"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "user.name", "test"],
            vec!["add", "."],
            vec!["commit", "--quiet", "-m", "init"],
        ] {
            assert!(Command::new("git").args(&args).current_dir(&origin).status().unwrap().success());
        }
        origin
    }

    fn default_branch(origin: &Path) -> String {
        let out = Command::new("git").args(["branch", "--show-current"]).current_dir(origin).output().unwrap();
        String::from_utf8(out.stdout).unwrap().trim().to_string()
    }

    #[test]
    fn enqueue_preserves_fifo_order() {
        let tmp = TempDir::new().unwrap();
        let mut r = Resolver::new(ResolverOptions::new(tmp.path().join("store")));
        let first = Package::from_value(&serde_json::json!({"name": "a"}), false).unwrap();
        let second = Package::from_value(&serde_json::json!({"name": "b"}), false).unwrap();
        r.enqueue(first, tmp.path().join("a"));
        r.enqueue(second, tmp.path().join("b"));
        let (front, _) = r.queue.pop_front().unwrap();
        assert_eq!(front.name, "a");
        let (next, _) = r.queue.pop_front().unwrap();
        assert_eq!(next.name, "b");
    }

    #[test]
    fn resolve_rejects_preexisting_home_without_delete_flag() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().join("a").join("b").join("home");
        std::fs::create_dir_all(&home).unwrap();

        let manifest_path = tmp.path().join("manifest.json");
        std::fs::write(&manifest_path, r#"{"name": "root"}"#).unwrap();

        let options = ResolverOptions {
            nupm_home: Some(home),
            delete_existing_home: false,
            ..ResolverOptions::new(tmp.path().join("store"))
        };
        let err = Resolver::new(options).resolve(&manifest_path).unwrap_err();
        assert!(matches!(err, ResolveError::Home(HomeError::AlreadyExists(_))));
    }

    #[test]
    fn two_dependencies_resolving_to_the_same_path_are_loaded_once() {
        let tmp = TempDir::new().unwrap();
        let origin = init_bare_origin(tmp.path(), &[("file.txt", "hello")]);
        let git_ref = default_branch(&origin);
        let url = format!("file://{}", origin.display());

        let manifest_path = tmp.path().join("manifest.json");
        std::fs::write(
            &manifest_path,
            serde_json::json!({
                "name": "root",
                "depends": [
                    {"name": "a", "source_uri": url, "git_ref": git_ref},
                    {"name": "a-again", "source_uri": url, "git_ref": git_ref},
                ],
            })
            .to_string(),
        )
        .unwrap();

        let resolver = Resolver::new(ResolverOptions::new(tmp.path().join("store")));
        let report = resolver.resolve(&manifest_path).unwrap();

        // Root plus a single dependency load, even though both `depends`
        // entries resolve to the same git worktree path.
        assert_eq!(report.packages_loaded, 2);
    }

    #[test]
    fn allow_build_commands_falls_back_to_root_extra_data() {
        let tmp = TempDir::new().unwrap();
        let manifest_path = tmp.path().join("manifest.json");
        std::fs::write(&manifest_path, r#"{"name": "root", "allow_build_commands": true}"#).unwrap();

        let root = Package::from_file(&manifest_path, true).unwrap();
        let resolver = Resolver::new(ResolverOptions::new(tmp.path().join("store")));
        let allowed = resolver.options.allow_build_commands.unwrap_or_else(|| {
            root.extra_data
                .as_ref()
                .and_then(|m| m.get("allow_build_commands"))
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false)
        });
        assert!(allowed);
    }
}
