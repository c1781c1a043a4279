// src/config/mod.rs

//! Project configuration: loading and validation.
//!
//! Responsibilities:
//! - Define the YAML-backed data model (`model.rs`).
//! - Load a config file from disk, rewrite relative paths, fill defaults and
//!   autodetect Terraform versions (`loader.rs`).
//! - Validate invariants like module paths and hook well-formedness
//!   (`validate.rs`). Graph-level validation happens when the execution set
//!   is built, see [`crate::execution`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, search_config_file};
pub use model::{
    Dependency, FlagConfig, HookSpec, ModuleConfig, ModuleHooks, ProjectConfig, ProjectHooks,
    RemoteConfig, ToolConfig, Variable,
};
pub use validate::validate_config;
