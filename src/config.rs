//! # Application Configuration
//!
//! `sharelink.json` is read once at startup, then individual fields may be
//! overridden from `SHARELINK_*` environment variables. Every field has a
//! default except the two signing secrets, which must be supplied.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::auth::JwtConfig;
use crate::http_server::{HttpServerConfig, RateLimitConfig};
use crate::observability::LogFormat;
use crate::sharing::{RetryPolicy, ShareSettings, UploadPolicy};
use crate::store::ObjectAcl;

const STORE_URL_KEY_LABEL: &[u8] = b"sharelink/store-url/v1";

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("Invalid config JSON: {0}")]
    Parse(String),

    #[error("Invalid value in {var}: {message}")]
    Env { var: String, message: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Whole-process configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Upload limits and link lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Empty means any content type
    #[serde(default)]
    pub allowed_content_types: Vec<String>,

    /// Maximum upload size (default 16 MiB)
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,

    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,

    /// Upper bound for requested link lifetimes (default 7 days)
    #[serde(default = "default_max_ttl_seconds")]
    pub max_ttl_seconds: u64,
}

fn default_allowed_extensions() -> Vec<String> {
    ["pdf", "doc", "docx", "txt", "png", "jpg", "jpeg", "gif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_size_bytes() -> u64 {
    16 * 1024 * 1024
}

fn default_ttl_seconds() -> u64 {
    3600
}

fn default_max_ttl_seconds() -> u64 {
    7 * 24 * 3600
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            allowed_content_types: Vec::new(),
            max_size_bytes: default_max_size_bytes(),
            default_ttl_seconds: default_ttl_seconds(),
            max_ttl_seconds: default_max_ttl_seconds(),
        }
    }
}

/// Secrets and JWT identity
#[derive(Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Key for capability tokens
    #[serde(default)]
    pub capability_secret: String,

    /// Key for presigned store URLs. Derived from `capability_secret`
    /// when empty.
    #[serde(default)]
    pub store_url_secret: String,

    /// Key for bearer JWTs
    #[serde(default)]
    pub jwt_secret: String,

    #[serde(default = "default_issuer")]
    pub issuer: String,

    #[serde(default = "default_issuer")]
    pub audience: String,

    /// Lifetime of tokens minted by `sharelink token`
    #[serde(default = "default_jwt_ttl_minutes")]
    pub jwt_ttl_minutes: i64,
}

fn default_issuer() -> String {
    "sharelink".to_string()
}

fn default_jwt_ttl_minutes() -> i64 {
    15
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            capability_secret: String::new(),
            store_url_secret: String::new(),
            jwt_secret: String::new(),
            issuer: default_issuer(),
            audience: default_issuer(),
            jwt_ttl_minutes: default_jwt_ttl_minutes(),
        }
    }
}

impl std::fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningConfig")
            .field("capability_secret", &"<redacted>")
            .field("store_url_secret", &"<redacted>")
            .field("jwt_secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("jwt_ttl_minutes", &self.jwt_ttl_minutes)
            .finish()
    }
}

impl SigningConfig {
    /// Key for presigned store URLs: `store_url_secret` when set, else
    /// HMAC-SHA256 of a fixed label under `capability_secret`
    pub fn store_url_key(&self) -> Vec<u8> {
        if !self.store_url_secret.is_empty() {
            return self.store_url_secret.as_bytes().to_vec();
        }
        let mut mac = Hmac::<Sha256>::new_from_slice(self.capability_secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(STORE_URL_KEY_LABEL);
        mac.finalize().into_bytes().to_vec()
    }
}

/// How `GET /files/:token` hands out bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Stream the bytes through the service
    #[default]
    Proxy,
    /// Answer with a short-lived presigned store URL
    Redirect,
}

impl std::str::FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proxy" => Ok(DeliveryMode::Proxy),
            "redirect" => Ok(DeliveryMode::Redirect),
            other => Err(format!("unknown delivery mode '{}'", other)),
        }
    }
}

/// Object store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory of the local object store
    #[serde(default = "default_store_root")]
    pub root: PathBuf,

    /// ACL applied to new objects
    #[serde(default)]
    pub object_acl: ObjectAcl,

    #[serde(default)]
    pub delivery: DeliveryMode,

    /// Lifetime of redirect URLs, further bounded by the link's own expiry
    #[serde(default = "default_redirect_ttl_seconds")]
    pub redirect_ttl_seconds: u64,
}

fn default_store_root() -> PathBuf {
    PathBuf::from("./data/objects")
}

fn default_redirect_ttl_seconds() -> u64 {
    60
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
            object_acl: ObjectAcl::default(),
            delivery: DeliveryMode::default(),
            redirect_ttl_seconds: default_redirect_ttl_seconds(),
        }
    }
}

/// Ledger persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("./data/ledger.json")
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

/// Store retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, StdDuration::from_millis(self.base_delay_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,

    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_filter(),
        }
    }
}

impl AppConfig {
    /// Load from a JSON file, apply environment overrides, validate
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut config = Self::from_json(&content)?;
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without overrides or validation
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `SHARELINK_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SHARELINK_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("SHARELINK_PORT") {
            self.server.port = parse_var("SHARELINK_PORT", &v)?;
        }
        if let Some(v) = lookup("SHARELINK_PUBLIC_BASE_URL") {
            self.server.public_base_url = v;
        }
        if let Some(v) = lookup("SHARELINK_ALLOWED_EXTENSIONS") {
            self.uploads.allowed_extensions = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = lookup("SHARELINK_MAX_CONTENT_LENGTH") {
            self.uploads.max_size_bytes = parse_var("SHARELINK_MAX_CONTENT_LENGTH", &v)?;
        }
        if let Some(v) = lookup("SHARELINK_CAPABILITY_SECRET") {
            self.signing.capability_secret = v;
        }
        if let Some(v) = lookup("SHARELINK_STORE_URL_SECRET") {
            self.signing.store_url_secret = v;
        }
        if let Some(v) = lookup("SHARELINK_JWT_SECRET") {
            self.signing.jwt_secret = v;
        }
        if let Some(v) = lookup("SHARELINK_STORE_ROOT") {
            self.store.root = PathBuf::from(v);
        }
        if let Some(v) = lookup("SHARELINK_DELIVERY") {
            self.store.delivery = v.parse().map_err(|message| ConfigError::Env {
                var: "SHARELINK_DELIVERY".to_string(),
                message,
            })?;
        }
        if let Some(v) = lookup("SHARELINK_UPLOAD_RATE_LIMIT") {
            self.rate_limit.upload_requests = parse_var("SHARELINK_UPLOAD_RATE_LIMIT", &v)?;
        }
        if let Some(v) = lookup("SHARELINK_LEDGER_PATH") {
            self.ledger.path = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.signing.capability_secret.is_empty() {
            return Err(ConfigError::Invalid("signing.capability_secret must be set".into()));
        }
        if self.signing.jwt_secret.is_empty() {
            return Err(ConfigError::Invalid("signing.jwt_secret must be set".into()));
        }
        if self.signing.jwt_ttl_minutes <= 0 {
            return Err(ConfigError::Invalid("signing.jwt_ttl_minutes must be > 0".into()));
        }
        if self.uploads.allowed_extensions.is_empty() {
            return Err(ConfigError::Invalid("uploads.allowed_extensions must not be empty".into()));
        }
        if self.uploads.max_size_bytes == 0 {
            return Err(ConfigError::Invalid("uploads.max_size_bytes must be > 0".into()));
        }
        if self.uploads.default_ttl_seconds == 0 {
            return Err(ConfigError::Invalid("uploads.default_ttl_seconds must be > 0".into()));
        }
        if self.uploads.max_ttl_seconds < self.uploads.default_ttl_seconds {
            return Err(ConfigError::Invalid(format!(
                "uploads.max_ttl_seconds ({}) is below uploads.default_ttl_seconds ({})",
                self.uploads.max_ttl_seconds, self.uploads.default_ttl_seconds
            )));
        }
        if self.store.redirect_ttl_seconds == 0 {
            return Err(ConfigError::Invalid("store.redirect_ttl_seconds must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be > 0".into()));
        }
        if self.rate_limit.enabled
            && (self.rate_limit.upload_requests == 0 || self.rate_limit.window_seconds == 0)
        {
            return Err(ConfigError::Invalid(
                "rate_limit.upload_requests and rate_limit.window_seconds must be > 0".into(),
            ));
        }
        if self.server.public_base_url.is_empty() {
            return Err(ConfigError::Invalid("server.public_base_url must be set".into()));
        }
        Ok(())
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::new(&self.uploads.allowed_extensions, self.uploads.max_size_bytes)
            .with_content_types(self.uploads.allowed_content_types.clone())
    }

    pub fn share_settings(&self) -> ShareSettings {
        ShareSettings {
            default_ttl_seconds: self.uploads.default_ttl_seconds,
            max_ttl_seconds: self.uploads.max_ttl_seconds,
            object_acl: self.store.object_acl,
            retry: self.retry.policy(),
            ..ShareSettings::default()
        }
    }

    pub fn jwt_config(&self) -> JwtConfig {
        JwtConfig {
            secret: self.signing.jwt_secret.clone(),
            access_token_ttl: chrono::Duration::minutes(self.signing.jwt_ttl_minutes),
            issuer: self.signing.issuer.clone(),
            audience: self.signing.audience.clone(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(var: &str, value: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var: var.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"{"signing": {"capability_secret": "c", "jwt_secret": "j"}}"#;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.uploads.max_size_bytes, 16 * 1024 * 1024);
        assert_eq!(config.uploads.default_ttl_seconds, 3600);
        assert!(config.uploads.allowed_extensions.contains(&"docx".to_string()));
        assert_eq!(config.store.delivery, DeliveryMode::Proxy);
        assert_eq!(config.store.object_acl, ObjectAcl::Private);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.upload_requests, 5);
        assert_eq!(config.rate_limit.window_seconds, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_store_url_key_is_separate() {
        let mut config = AppConfig::from_json(MINIMAL).unwrap();
        let derived = config.signing.store_url_key();
        assert_ne!(derived, b"c".to_vec());
        assert_eq!(derived, config.signing.store_url_key());
        assert_eq!(derived.len(), 32);

        config.signing.store_url_secret = "urls".to_string();
        assert_eq!(config.signing.store_url_key(), b"urls".to_vec());
    }

    #[test]
    fn test_missing_secrets_rejected() {
        let config = AppConfig::from_json("{}").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_max_below_default_rejected() {
        let mut config = AppConfig::from_json(MINIMAL).unwrap();
        config.uploads.max_ttl_seconds = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let mut config = AppConfig::from_json(MINIMAL).unwrap();
        config.rate_limit.upload_requests = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.rate_limit.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SHARELINK_PORT", "9000"),
            ("SHARELINK_ALLOWED_EXTENSIONS", "pdf, txt"),
            ("SHARELINK_MAX_CONTENT_LENGTH", "1024"),
            ("SHARELINK_DELIVERY", "redirect"),
            ("SHARELINK_UPLOAD_RATE_LIMIT", "20"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::from_json(MINIMAL).unwrap();
        config
            .apply_overrides(|var| vars.get(var).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.uploads.allowed_extensions, vec!["pdf", "txt"]);
        assert_eq!(config.uploads.max_size_bytes, 1024);
        assert_eq!(config.store.delivery, DeliveryMode::Redirect);
        assert_eq!(config.rate_limit.upload_requests, 20);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = AppConfig::from_json(MINIMAL).unwrap();
        let result = config.apply_overrides(|var| {
            (var == "SHARELINK_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Env { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sharelink.json");
        fs::write(&path, MINIMAL).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.signing.issuer, "sharelink");
        assert!(matches!(
            AppConfig::load(&dir.path().join("missing.json")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_secrets_not_debug_printed() {
        let config = AppConfig::from_json(MINIMAL).unwrap();
        let printed = format!("{:?}", config.signing);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("\"c\""));
    }
}
