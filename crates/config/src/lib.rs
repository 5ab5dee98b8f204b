//! Manages application configuration by loading settings from standard locations.
//!
//! This crate provides a unified configuration object (`Config`) that aggregates
//! settings from files and environment variables, making them accessible
//! globally via a lazily initialized static reference (`CONFIG`).

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use etcetera::BaseStrategy;
use figment::providers::{Env, Format, Toml};
use figment::{Figment, Metadata, Provider};
use serde::{Deserialize, Serialize};

/// The default configuration values
const DEFAULT_TOML_CONFIG: &str = include_str!("./numng.default.toml");

//================================================================================================
// Statics
//================================================================================================

/// Provides a lazily instantiated static reference to the application `Config`.
///
/// This static variable ensures that configuration is parsed only once from
/// canonical locations and then made immutably available throughout the
/// application's lifecycle.
pub static CONFIG: LazyLock<Config> = LazyLock::new(load_config);

//================================================================================================
// Types
//================================================================================================

/// Settings for the durable git-backed package store.
#[derive(Deserialize, Serialize)]
pub struct StoreConfig {
    /// The root directory packages are fetched and cached under.
    pub root: PathBuf,
}

/// Settings governing whether packages may run arbitrary build commands.
#[derive(Deserialize, Serialize, Default)]
pub struct BuildConfig {
    /// Whether a manifest that omits its own `allow_build_commands` setting
    /// may run build commands at all. The CLI's own `--allow-build-commands`
    /// flag, when given, takes precedence over this value.
    pub allow_build_commands: bool,
}

/// Represents the application's primary configuration structure.
#[derive(Deserialize, Serialize, Default)]
pub struct Config {
    /// Package-store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Build-command settings.
    #[serde(default)]
    pub build: BuildConfig,
}

//================================================================================================
// Impls
//================================================================================================

impl Default for StoreConfig {
    fn default() -> Self {
        Self { root: get_cache_dir().join("store") }
    }
}

impl Config {
    /// Constructs a `Figment` instance for configuration loading.
    ///
    /// This method builds a configuration provider by layering default settings,
    /// user-specific configuration files, a repository-local override, and
    /// environment variables.
    pub fn figment() -> Figment {
        let mut fig = Figment::from(Config::default()).merge(Toml::string(DEFAULT_TOML_CONFIG));

        if let Ok(c) = etcetera::choose_base_strategy() {
            let config = c.config_dir().join("numng.toml");
            fig = fig.admerge(Toml::file(config));
        }

        if let Some(repo_config) = find_repo_local_config(&std::env::current_dir().unwrap_or_default()) {
            fig = fig.admerge(Toml::file(repo_config));
        }

        fig.admerge(Env::prefixed("NUMNG_"))
    }

    /// Creates a `Config` instance from a given provider.
    pub fn from<T: Provider>(provider: T) -> Result<Config, Box<figment::Error>> {
        Figment::from(provider).extract().map_err(Box::new)
    }
}

impl Provider for Config {
    fn metadata(&self) -> figment::Metadata {
        Metadata::named("numng Config")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        figment::providers::Serialized::defaults(self).data()
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Determines the appropriate cache directory based on the operating system.
pub fn get_cache_dir() -> PathBuf {
    if let Ok(c) = etcetera::choose_base_strategy() {
        c.cache_dir().join("numng")
    } else {
        std::env::temp_dir().join("numng")
    }
}

/// The directory Nushell's own shell-config convention reserves for numng
/// (`~/.config/nushell/numng`, following the layout documented at
/// <https://github.com/nushell/nushell/discussions/9019>).
pub fn nu_config_dir() -> PathBuf {
    if let Ok(c) = etcetera::choose_base_strategy() {
        c.config_dir().join("nushell").join("numng")
    } else {
        std::env::temp_dir().join("nushell").join("numng")
    }
}

/// Walks upward from `start` looking for a `.git` directory, returning the
/// path to `.git/info/numng.toml` if one is found.
fn find_repo_local_config(start: &Path) -> Option<PathBuf> {
    let mut dir = start.canonicalize().ok()?;
    loop {
        let git_dir = dir.join(".git");
        if git_dir.is_dir() {
            return Some(git_dir.join("info/numng.toml"));
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Loads the application configuration using the default `Figment` provider.
///
/// This function is used to initialize the `CONFIG` static variable.
fn load_config() -> Config {
    Config::figment().extract().unwrap_or_else(|e| {
        tracing::error!(error = %e, "problem loading config from default sources, falling back to nearly empty configuration");
        Config::default()
    })
}
