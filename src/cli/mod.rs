//! CLI module for sharelink
//!
//! Provides command-line interface for:
//! - serve: Run the HTTP server
//! - check-config: Validate a configuration file
//! - keygen: Generate a signing secret
//! - token: Mint a bearer token for an actor

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{check_config, keygen, mint_token, run, run_command, serve};
pub use errors::{CliError, CliResult};
