// src/config/mod.rs

//! Configuration loading and validation for jobkeeper.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate host settings and script digests (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigFile, HostSection, ProcessConfig, RawConfigFile, ScriptConfig, ScriptsSection};
pub use validate::validate_config;
