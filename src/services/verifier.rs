// src/services/verifier.rs
//! Certificate verification service.
//!
//! A certificate is verified by resolving its public identifier (metadata
//! CID) through the gateways and checking that the pinned metadata belongs
//! to the registration number the verifier was given.

use crate::error::FetchError;
use crate::models::certificate::{MetadataCid, VerificationMetadata};
use crate::storage::ipfs_client::IpfsStorage;
use log::info;
use serde::Serialize;

/// Outcome of a verification lookup.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// `true` when the metadata's registration number matches the query
    pub valid: bool,
    #[serde(flatten)]
    pub metadata: VerificationMetadata,
}

/// Verifies certificates against their pinned metadata.
#[derive(Clone)]
pub struct Verifier {
    storage: IpfsStorage,
}

impl Verifier {
    pub fn new(storage: IpfsStorage) -> Self {
        Self { storage }
    }

    /// Looks up `cid` and compares its registration number with `reg_number`.
    ///
    /// # Returns
    /// - `Ok(Verification)` with `valid` set according to the comparison
    /// - `Err(FetchError::Exhausted)` if the metadata cannot be found
    /// - `Err(FetchError::Decode)` if the CID does not hold certificate metadata
    pub async fn verify(&self, cid: &MetadataCid, reg_number: &str) -> Result<Verification, FetchError> {
        let metadata: VerificationMetadata = self.storage.fetch_json(cid.as_str()).await?;
        let valid = metadata.reg_number.trim() == reg_number.trim();
        info!("Verified {} against {}: valid={}", cid, reg_number, valid);
        Ok(Verification { valid, metadata })
    }
}
