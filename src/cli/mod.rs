//! Command-line interface for boxcut
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
#[path = "main.rs"]
mod main_impl;

#[cfg(feature = "server")]
pub use main_impl::ServeArgs;
pub use main_impl::{main, Cli, CliLogFormat, CliMaskSelection, Command, CutArgs, ModelArgs};
