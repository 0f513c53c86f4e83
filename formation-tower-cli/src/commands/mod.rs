//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`common`] - Tower assembly shared by `run` and `manual`
//! - [`config`] - Configuration management (init, show, path)
//! - [`manual`] - Interactive manual job submission
//! - [`run`] - Main command (serve every allowed fixture)

pub mod common;
pub mod config;
pub mod manual;
pub mod run;
