// src/config.rs
//! Runtime configuration.
//!
//! Values are layered with the `config` crate: built-in defaults first, then
//! process environment variables (a `.env` file is loaded by `main` before
//! this runs). Keys are the lowercased variable names, e.g. `PINATA_JWT`
//! becomes `pinata_jwt`.
//!
//! ## Variables
//! - `PINATA_JWT`: pinning service bearer token (required)
//! - `PINATA_API_URL`: pinning API base (default: `https://api.pinata.cloud`)
//! - `IPFS_GATEWAYS`: comma separated gateway templates, `{cid}` is substituted
//! - `PUBLIC_GATEWAY_URL`: base used for `pdf_ipfs_url` in metadata
//! - `FRONTEND_BASE_URL`: base of the verification page encoded in QR codes
//! - `UPLOAD_TIMEOUT_SECS` / `FETCH_TIMEOUT_SECS`: per-call timeouts
//! - `BATCH_WORKERS`: concurrent rows in a batch (default: 10)
//! - `BIND_ADDR`: API listen address (default: `127.0.0.1:3000`)
//! - `INSTITUTION_ID`, `INSTITUTION_NAME`, `INSTITUTION_LOGO_PATH`: the issuing institution

use crate::services::batch_issuer::DEFAULT_WORKERS;
use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_GATEWAYS: &str = "https://ipfs.io/ipfs/{cid},\
https://cloudflare-ipfs.com/ipfs/{cid},\
https://gateway.pinata.cloud/ipfs/{cid},\
https://{cid}.ipfs.dweb.link";

/// Bearer credential for the pinning service.
///
/// Neither `Debug` nor `Display` reveal the token.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        ApiToken(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken([REDACTED])")
    }
}

impl fmt::Display for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub pinata_jwt: ApiToken,
    pub pinata_api_url: String,
    /// Comma separated, highest priority first
    pub ipfs_gateways: String,
    pub public_gateway_url: String,
    pub frontend_base_url: String,
    pub upload_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub batch_workers: usize,
    pub bind_addr: String,
    pub institution_id: String,
    pub institution_name: String,
    pub institution_logo_path: Option<String>,
}

impl AppConfig {
    /// Builds the configuration from defaults and the process environment.
    ///
    /// # Errors
    /// Returns `ConfigError` if `PINATA_JWT` is absent or a numeric value
    /// fails to parse.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_builder(Config::builder().add_source(Environment::default().try_parsing(true)))
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let cfg: AppConfig = builder
            .set_default("pinata_api_url", "https://api.pinata.cloud")?
            .set_default("ipfs_gateways", DEFAULT_GATEWAYS)?
            .set_default("public_gateway_url", "https://gateway.pinata.cloud/ipfs")?
            .set_default("frontend_base_url", "http://localhost:5173")?
            .set_default("upload_timeout_secs", 60)?
            .set_default("fetch_timeout_secs", 15)?
            .set_default("batch_workers", DEFAULT_WORKERS as i64)?
            .set_default("bind_addr", "127.0.0.1:3000")?
            .set_default("institution_id", "1")?
            .set_default("institution_name", "Unnamed Institution")?
            .build()?
            .try_deserialize()?;

        if cfg.pinata_jwt.is_empty() {
            return Err(ConfigError::Message("PINATA_JWT must not be empty".into()));
        }
        if cfg.batch_workers == 0 {
            return Err(ConfigError::Message("BATCH_WORKERS must be at least 1".into()));
        }
        Ok(cfg)
    }

    pub fn gateways(&self) -> Vec<String> {
        self.ipfs_gateways
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
