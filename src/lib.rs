//! Network configuration engine.
//!
//! Resolves per-device facts from a hierarchical data tree, renders them
//! into device configuration through ordered template sections, and deploys
//! the result to live devices with commit-confirm rollback protection.
//!
//! The public API is organised into layers:
//!
//! - **[`datatree`]** - hosts, lookup paths, fact sources and fact resolution
//! - **[`templates`]** - sections, templates and the rendering pipeline
//! - **[`drivers`]** - the driver lifecycle, commit-confirm and device backends
//! - **[`deploy`]** - batch execution of a driver method across hosts
//! - **[`commands`]** - top-level subcommand orchestration (`render`, `diff`, `apply`, ...)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod artifacts;
pub mod cancel;
pub mod cli;
pub mod commands;
pub mod datatree;
pub mod deploy;
pub mod drivers;
pub mod error;
pub mod logging;
pub mod parallel;
pub mod settings;
pub mod templates;
