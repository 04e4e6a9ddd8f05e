//! Command line interface module
//!
//! Argument parsing, configuration merging and the runner that migrates
//! every configured image in turn.

pub mod args;
pub mod runner;

pub use args::Args;
pub use runner::{RunSummary, Runner};
