//! CLI argument definitions using clap
//!
//! Commands:
//! - sharelink serve --config <path> [--port <port>]
//! - sharelink check-config --config <path>
//! - sharelink keygen [--bytes <n>]
//! - sharelink token --config <path> --subject <actor> [--ttl-minutes <n>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sharelink - signed download links with owner revocation
#[derive(Parser, Debug)]
#[command(name = "sharelink")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./sharelink.json")]
        config: PathBuf,

        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Load and validate a configuration file, then exit
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./sharelink.json")]
        config: PathBuf,
    },

    /// Print a random secret suitable for the signing keys
    Keygen {
        /// Secret length in bytes before encoding
        #[arg(long, default_value_t = 32)]
        bytes: usize,
    },

    /// Mint a bearer token for an actor
    Token {
        /// Path to configuration file
        #[arg(long, default_value = "./sharelink.json")]
        config: PathBuf,

        /// Actor ID placed in the `sub` claim
        #[arg(long)]
        subject: String,

        /// Token lifetime; defaults to the configured value
        #[arg(long)]
        ttl_minutes: Option<i64>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_command() {
        let cli = Cli::try_parse_from([
            "sharelink",
            "token",
            "--subject",
            "alice",
            "--ttl-minutes",
            "30",
        ])
        .unwrap();

        match cli.command {
            Command::Token {
                subject,
                ttl_minutes,
                config,
            } => {
                assert_eq!(subject, "alice");
                assert_eq!(ttl_minutes, Some(30));
                assert_eq!(config, PathBuf::from("./sharelink.json"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_serve_port() {
        let cli = Cli::try_parse_from(["sharelink", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(cli.command, Command::Serve { port: Some(9000), .. }));
    }
}
