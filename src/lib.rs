//! numng, a package manager for Nushell configuration modules, scripts,
//! and plugins.

#![warn(missing_docs)]

pub mod cli;
