//! # relay-cli
//!
//! Operator CLI for the message store: argument parsing, config loading, tracing setup
//! and command handlers.

pub mod cli;
pub mod logger;

pub use cli::{load_config, log_file, run, Cli, Commands};
pub use logger::init_tracing;
