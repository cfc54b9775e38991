// src/main.rs

//! # Certificate Issuance Backend - Main Entry Point
//!
//! Issues achievement certificates as PDFs, pins them and their metadata to
//! IPFS through a pinning service, and re-issues them with a live
//! verification QR code.
//!
//! ## Architecture Overview
//! 1. **PDF Layer**: certificate rendering, QR encoding, overlay merging
//! 2. **Storage Layer**: pinning/gateway client, certificate records, institutions
//! 3. **Services Layer**: single and batch issuance, verification, HTTP API
//!
//! ## Environment Variables
//! See [`config`]. Only `PINATA_JWT` is required.

use crate::config::AppConfig;
use crate::services::api_server::ApiServer;
use crate::services::batch_issuer::BatchIssuer;
use crate::services::certificate_issuer::CertificateIssuer;
use crate::services::verifier::Verifier;
use crate::storage::certificate_records::InMemoryCertificateStore;
use crate::storage::institutions::StaticInstitutionDirectory;
use crate::storage::ipfs_client::{IpfsStorage, StorageSettings};
use anyhow::Context;
use dotenv::dotenv;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;

mod config;   // Environment configuration
mod error;    // Error types per pipeline stage
mod models;   // Data structures
mod pdf;      // Rendering, QR codes, overlays
mod services; // Business logic and API
mod storage;  // IPFS and local records

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load `.env` and initialize logging
/// 2. Build configuration
/// 3. Initialize storage and service components
/// 4. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load().context("invalid configuration")?;
    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("BIND_ADDR `{}` is not a socket address", config.bind_addr))?;

    let storage = IpfsStorage::new(StorageSettings::from_config(&config));
    info!(
        "Pinning via {} with {} fetch gateways",
        config.pinata_api_url,
        config.gateways().len()
    );

    let issuer = CertificateIssuer::new(
        storage.clone(),
        Arc::new(InMemoryCertificateStore::new()),
        &config.frontend_base_url,
    );
    let batch_issuer = BatchIssuer::new(issuer.clone(), config.batch_workers);
    let verifier = Verifier::new(storage);
    let institutions = Arc::new(StaticInstitutionDirectory::from_config(&config));

    let api_server = ApiServer::new(issuer, batch_issuer, verifier, institutions);

    info!("Available endpoints:");
    info!("- POST /issue-certificate");
    info!("- POST /update-certificate");
    info!("- POST /batch-issue-certificates");
    info!("- GET  /verify-certificate?cid=&reg_number=");
    info!("- GET  /certificate/:reg_number");

    api_server.run(addr).await.context("API server failed")
}
