//! Subcommand implementations.

pub mod config;
pub mod infer;
pub mod server;
