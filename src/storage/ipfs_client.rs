// src/storage/ipfs_client.rs
//! IPFS storage through a pinning service and public gateways.
//!
//! Provides the two primitives the certificate pipeline needs:
//! - Pinning binary files and JSON documents, returning their CID
//! - Fetching content back by CID from a prioritized list of gateways
//!
//! # Availability
//! Reads never depend on a single endpoint. Each gateway is tried in order
//! with its own timeout, and a failure (error status, empty body, timeout,
//! connection error) just moves on to the next one.
//!
//! # Security Considerations
//! - The pinning token is sent as a bearer credential and is never logged
//! - All pinned data is public; encrypt before storage if that matters

use crate::config::{ApiToken, AppConfig};
use crate::error::{FetchError, UploadError};
use bytes::Bytes;
use log::{debug, info, warn};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Longest slice of an error response body kept in `UploadError::Rejected`.
const MAX_ERROR_BODY: usize = 200;

const PIN_FILE_PATH: &str = "/pinning/pinFileToIPFS";
const PIN_JSON_PATH: &str = "/pinning/pinJSONToIPFS";

/// Connection settings for [`IpfsStorage`].
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Pinning API base, e.g. `https://api.pinata.cloud`
    pub api_url: String,
    pub token: ApiToken,
    /// Gateway templates in priority order; `{cid}` is substituted, or the
    /// CID is appended as the last path segment
    pub gateways: Vec<String>,
    /// Base of the public URL recorded for pinned files
    pub public_gateway: String,
    pub upload_timeout: Duration,
    pub fetch_timeout: Duration,
}

impl StorageSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        StorageSettings {
            api_url: config.pinata_api_url.clone(),
            token: config.pinata_jwt.clone(),
            gateways: config.gateways(),
            public_gateway: config.public_gateway_url.clone(),
            upload_timeout: config.upload_timeout(),
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

/// Response of the pinning endpoints.
#[derive(Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash", alias = "cid")]
    ipfs_hash: Option<String>,
}

/// Thread-safe pinning/gateway client.
///
/// Cloning is cheap: the HTTP connection pool and settings are shared.
#[derive(Clone)]
pub struct IpfsStorage {
    http: reqwest::Client,
    settings: Arc<StorageSettings>,
}

impl IpfsStorage {
    pub fn new(settings: StorageSettings) -> Self {
        IpfsStorage {
            http: reqwest::Client::new(),
            settings: Arc::new(settings),
        }
    }

    /// Pins a binary file.
    ///
    /// # Arguments
    /// * `file_name` - Name recorded by the pinning service
    /// * `data` - File contents
    /// * `content_type` - MIME type of `data`, e.g. `application/pdf`
    ///
    /// # Returns
    /// The CID of the pinned file
    pub async fn upload_file(
        &self,
        file_name: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, UploadError> {
        let size = data.len();
        let part = Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .map_err(UploadError::Transport)?;
        let request = self
            .http
            .post(self.endpoint(PIN_FILE_PATH))
            .multipart(Form::new().part("file", part));

        let cid = self.send_pin_request(request).await?;
        info!("Pinned file {} ({} bytes) as {}", file_name, size, cid);
        Ok(cid)
    }

    /// Pins a JSON-serializable value.
    ///
    /// # Returns
    /// The CID of the pinned JSON document
    pub async fn upload_json<T: Serialize>(&self, obj: &T) -> Result<String, UploadError> {
        let body = serde_json::to_vec(obj)?;
        let size = body.len();
        let request = self
            .http
            .post(self.endpoint(PIN_JSON_PATH))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);

        let cid = self.send_pin_request(request).await?;
        info!("Pinned json document ({} bytes) as {}", size, cid);
        Ok(cid)
    }

    /// Retrieves content by CID from the first gateway that serves it.
    ///
    /// # Errors
    /// `FetchError::Exhausted` when every configured gateway failed.
    pub async fn fetch(&self, cid: &str) -> Result<Bytes, FetchError> {
        for template in &self.settings.gateways {
            let url = gateway_url(template, cid);
            debug!("Trying gateway {}", url);

            let response = match self
                .http
                .get(&url)
                .timeout(self.settings.fetch_timeout)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!("Gateway {} failed: {}", url, e);
                    continue;
                }
            };
            let status = response.status();
            if !status.is_success() {
                warn!("Gateway {} failed: status {}", url, status);
                continue;
            }
            match response.bytes().await {
                Ok(body) if !body.is_empty() => {
                    info!("Fetched {} ({} bytes) from {}", cid, body.len(), url);
                    return Ok(body);
                }
                Ok(_) => warn!("Gateway {} failed: empty body", url),
                Err(e) => warn!("Gateway {} failed while reading body: {}", url, e),
            }
        }

        Err(FetchError::Exhausted {
            cid: cid.to_string(),
            attempted: self.settings.gateways.len(),
        })
    }

    /// Retrieves and deserializes a JSON document by CID.
    pub async fn fetch_json<T: DeserializeOwned>(&self, cid: &str) -> Result<T, FetchError> {
        let bytes = self.fetch(cid).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Public URL of pinned content, as recorded in certificate metadata.
    pub fn public_url(&self, cid: &str) -> String {
        format!("{}/{}", self.settings.public_gateway.trim_end_matches('/'), cid)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.settings.api_url.trim_end_matches('/'), path)
    }

    async fn send_pin_request(&self, request: reqwest::RequestBuilder) -> Result<String, UploadError> {
        let token = self.settings.token.expose();
        let response = request
            .bearer_auth(token.strip_prefix("Bearer ").unwrap_or(token).trim())
            .timeout(self.settings.upload_timeout)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.without_url()))?;

        let status = response.status();
        let body = response.text().await.map_err(UploadError::Transport)?;
        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        serde_json::from_str::<PinResponse>(&body)
            .ok()
            .and_then(|pin| pin.ipfs_hash)
            .filter(|cid| !cid.trim().is_empty())
            .ok_or(UploadError::MissingCid)
    }
}

/// Substitutes `cid` into a gateway template.
pub fn gateway_url(template: &str, cid: &str) -> String {
    if template.contains("{cid}") {
        template.replace("{cid}", cid)
    } else {
        format!("{}/{}", template.trim_end_matches('/'), cid)
    }
}

/// CID at the end of a gateway URL such as `https://gw/ipfs/<cid>`.
pub fn cid_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
}
