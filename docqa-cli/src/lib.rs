//! # docqa-cli
//!
//! Library side of the `docqa` binary: configuration loading, log setup, and
//! the subcommands, kept here so they can be tested without a terminal.

pub mod commands;
pub mod config;
pub mod telemetry;

pub use commands::{App, IndexSummary, explain};
pub use config::{CliConfig, EmbedderKind};
