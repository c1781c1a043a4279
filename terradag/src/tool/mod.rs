// src/tool/mod.rs

//! Per-execution Terraform session.
//!
//! A [`ToolSession`] owns one execution's work against Terraform: a
//! hard-linked sandbox of the code tree, the per-subcommand log files, and
//! the init/get/plan/apply/detach flows. Argument shapes follow the
//! Terraform version the session runs with.
//!
//! - [`session`] — construction, sandbox cloning, command plumbing.
//! - [`init`] — `init`/`remote config` and `get`.
//! - [`plan`] — `plan -detailed-exitcode` and change extraction.
//! - [`apply`] — `apply` with version-appropriate flags.
//! - [`detach`] — disabling the remote backend for safe local runs.
//! - [`backend`] — removing `backend` blocks from Terraform config text.

pub mod apply;
pub mod backend;
pub mod config;
pub mod detach;
pub mod init;
pub mod plan;
pub mod result;
pub mod session;

pub use config::ToolSessionConfig;
pub use result::{PlanSummary, ToolError, ToolOutput, ToolResult};
pub use session::ToolSession;
