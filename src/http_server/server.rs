//! # HTTP Server
//!
//! Main HTTP server combining the health and share routers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::config::HttpServerConfig;
use super::health_routes::health_routes;
use super::ratelimit::RateLimiter;
use super::share_routes::{share_routes, ShareState, MULTIPART_OVERHEAD};
use crate::auth::JwtManager;
use crate::config::AppConfig;
use crate::sharing::{CapabilitySigner, FileLedger, ShareResult, ShareService};
use crate::store::LocalObjectStore;

/// HTTP server for the share API
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Wire the file ledger, local object store and share service from
    /// `config` and build the server around them
    pub fn from_app_config(config: &AppConfig) -> ShareResult<Self> {
        let state = build_state(config)?;
        Ok(Self::with_state(config.server.clone(), Arc::new(state)))
    }

    /// Create a server over an already wired state
    pub fn with_state(config: HttpServerConfig, state: Arc<ShareState>) -> Self {
        let router = Self::build_router(&config, state);
        Self { config, router }
    }

    /// Build the combined router with all endpoints
    pub fn build_router(config: &HttpServerConfig, state: Arc<ShareState>) -> Router {
        let body_limit = state
            .service
            .policy()
            .max_size
            .saturating_add(MULTIPART_OVERHEAD)
            .min(usize::MAX as u64) as usize;

        // Configure CORS from config
        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .merge(health_routes())
            .merge(share_routes(state))
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Start the HTTP server (async)
    pub async fn start(self) -> Result<(), std::io::Error> {
        let addr: SocketAddr = self
            .config
            .socket_addr()
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(
            %addr,
            public_base_url = %self.config.public_base_url,
            "sharelink listening"
        );
        axum::serve(
            listener,
            self.router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }
}

/// Construct the share state described by `config`
pub fn build_state(config: &AppConfig) -> ShareResult<ShareState> {
    let ledger = Arc::new(FileLedger::open(&config.ledger.path)?);
    let store = Arc::new(LocalObjectStore::new(
        config.store.root.clone(),
        config.server.base_url(),
        &config.signing.store_url_key(),
    ));

    let service = ShareService::new(
        config.upload_policy(),
        config.share_settings(),
        ledger,
        store.clone(),
        CapabilitySigner::new(config.signing.capability_secret.as_bytes()),
    );

    Ok(ShareState {
        service,
        jwt: JwtManager::new(config.jwt_config()),
        blobs: Some(store),
        public_base_url: config.server.base_url().to_string(),
        delivery: config.store.delivery,
        redirect_ttl_seconds: config.store.redirect_ttl_seconds,
        upload_limiter: RateLimiter::from_config(&config.rate_limit),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::UrlSigner;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.signing.capability_secret = "cap".to_string();
        config.signing.jwt_secret = "jwt".to_string();
        config.store.root = dir.path().join("objects");
        config.ledger.path = dir.path().join("ledger.json");
        config.server = HttpServerConfig::with_port(9090);
        config
    }

    #[test]
    fn test_server_from_config() {
        let dir = TempDir::new().unwrap();
        let server = HttpServer::from_app_config(&test_config(&dir)).unwrap();
        assert_eq!(server.socket_addr(), "0.0.0.0:9090");
        let _router = server.router();
    }

    #[test]
    fn test_store_urls_not_signed_with_capability_secret() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let state = build_state(&config).unwrap();
        let blobs = state.blobs.unwrap();
        let now = chrono::Utc::now();

        let signature = |signer: UrlSigner| {
            let url = signer.presign("http://h", "k.txt", 60, now);
            let sig = url.url.split("signature=").nth(1).unwrap().to_string();
            (url.expires_at.timestamp(), sig)
        };

        let (expires, sig) = signature(UrlSigner::new(b"cap"));
        assert!(blobs.verify_presigned("k.txt", expires, &sig).is_err());

        let (expires, sig) = signature(UrlSigner::new(&config.signing.store_url_key()));
        assert!(blobs.verify_presigned("k.txt", expires, &sig).is_ok());
    }

    #[test]
    fn test_state_uses_public_base_url() {
        let dir = TempDir::new().unwrap();
        let state = build_state(&test_config(&dir)).unwrap();
        assert_eq!(state.public_base_url, "http://localhost:9090");
        assert!(state.blobs.is_some());
        assert!(state.upload_limiter.is_some());
    }
}
