//! CLI command implementations
//!
//! Commands that print something return it as a `String`; [`run_command`]
//! writes it to stdout.

use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use serde_json::json;

use crate::auth::JwtManager;
use crate::config::AppConfig;
use crate::http_server::HttpServer;
use crate::observability::init_tracing;

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config, port } => serve(&config, port),
        Command::CheckConfig { config } => {
            println!("{}", check_config(&config)?);
            Ok(())
        }
        Command::Keygen { bytes } => {
            println!("{}", keygen(bytes)?);
            Ok(())
        }
        Command::Token {
            config,
            subject,
            ttl_minutes,
        } => {
            println!("{}", mint_token(&config, &subject, ttl_minutes)?);
            Ok(())
        }
    }
}

/// Load the config, wire the service and serve until the process exits
pub fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    let mut config = AppConfig::load(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }

    init_tracing(config.logging.format, &config.logging.filter);
    tracing::info!(
        config = %config_path.display(),
        store_root = %config.store.root.display(),
        ledger = %config.ledger.path.display(),
        delivery = ?config.store.delivery,
        "starting sharelink"
    );

    let server = HttpServer::from_app_config(&config)
        .map_err(|e| CliError::BootFailed(format!("Failed to wire share service: {}", e)))?;

    // Start the async runtime and run the server
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::BootFailed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        server
            .start()
            .await
            .map_err(|e| CliError::BootFailed(format!("HTTP server failed: {}", e)))
    })?;

    Ok(())
}

/// Validate a configuration file and summarize it (secrets omitted)
pub fn check_config(config_path: &Path) -> CliResult<String> {
    let config = AppConfig::load(config_path)?;

    let summary = json!({
        "status": "ok",
        "listen": config.server.socket_addr(),
        "public_base_url": config.server.base_url(),
        "allowed_extensions": config.uploads.allowed_extensions,
        "max_size_bytes": config.uploads.max_size_bytes,
        "default_ttl_seconds": config.uploads.default_ttl_seconds,
        "max_ttl_seconds": config.uploads.max_ttl_seconds,
        "store_root": config.store.root.display().to_string(),
        "object_acl": config.store.object_acl.as_str(),
        "delivery": config.store.delivery,
        "ledger": config.ledger.path.display().to_string(),
        "upload_rate_limit": config.rate_limit,
    });

    serde_json::to_string_pretty(&summary)
        .map_err(|e| CliError::Output(format!("JSON error: {}", e)))
}

/// Generate a random URL-safe secret of `bytes` bytes
pub fn keygen(bytes: usize) -> CliResult<String> {
    if !(16..=1024).contains(&bytes) {
        return Err(CliError::InvalidArgument(
            "--bytes must be between 16 and 1024".to_string(),
        ));
    }
    let mut secret = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut secret);
    Ok(URL_SAFE_NO_PAD.encode(secret))
}

/// Mint a bearer JWT for `subject`
pub fn mint_token(config_path: &Path, subject: &str, ttl_minutes: Option<i64>) -> CliResult<String> {
    let config = AppConfig::load(config_path)?;
    let ttl = ttl_minutes.unwrap_or(config.signing.jwt_ttl_minutes);
    if ttl <= 0 {
        return Err(CliError::InvalidArgument("--ttl-minutes must be > 0".to_string()));
    }

    JwtManager::new(config.jwt_config())
        .generate_token_with_ttl(subject, chrono::Duration::minutes(ttl))
        .map_err(|e| CliError::InvalidArgument(e.to_string()))
}
