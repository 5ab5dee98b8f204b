//! # numng-core
//!
//! The `numng-core` crate implements the resolver, fetcher, and loader-script
//! generator at the heart of numng, a package manager for Nushell
//! configuration modules, scripts, and plugins.
//!
//! ## Key Concepts
//!
//! A **package** is anything referenced from a manifest: a git repository
//! (optionally at a sub-path and ref), resolved through zero or more
//! **registries**, that declares modules, scripts, binaries, plugins, or
//! overlays in one of three supported formats (`numng`, `nupm`, `packer`).
//!
//! Resolution walks the dependency graph breadth-first, de-duplicating by
//! resolved source location rather than declared name, and emits a home
//! directory of symlinks plus one or two loader scripts that a shell can
//! source on startup.
//!
//! ## Architecture
//!
//! - [`version`] - lenient version constraint parsing and matching
//! - [`path`] - path containment and filesystem-safe name sanitization
//! - [`git`] - the git-backed package store (bare clone + worktree reuse)
//! - [`manifest`] - the `Package` record and its merge semantics
//! - [`registry`] - registry backends (per-file JSON, single nuon index)
//! - [`snippet`] - topological ordering of loader-script fragments
//! - [`home`] - home-directory materialization and script emission
//! - [`resolve`] - the resolver that ties the above together
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use std::path::{Path, PathBuf};
//!
//! use numng_core::resolve::{Resolver, ResolverOptions};
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut options = ResolverOptions::new(PathBuf::from("/var/cache/numng/store/git"));
//! options.nupm_home = Some(PathBuf::from("/var/cache/numng/nupm_home"));
//! options.script_file = Some(PathBuf::from("/tmp/load_script.nu"));
//! let report = Resolver::new(options).resolve(Path::new("numng.json"))?;
//! println!("loaded {} packages", report.packages_loaded);
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]

pub mod git;
pub mod home;
mod interpret;
pub mod manifest;
mod nuon;
pub mod path;
mod plugins;
pub mod registry;
pub mod resolve;
pub mod snippet;
pub mod version;

pub use manifest::Package;
pub use resolve::{Resolver, ResolverOptions};
