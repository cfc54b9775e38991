// src/services/batch_issuer.rs
//! Batch certificate issuance.
//!
//! Fans single-entry issuance out over many rows with a bounded number of
//! rows in flight. Each row runs as its own task and everything that goes
//! wrong with it, including a panic, ends up in that row's result.

use crate::error::RowError;
use crate::models::batch::{BatchOutcome, BatchResult, BatchRow, RawRow};
use crate::models::certificate::{Institution, IssuedCertificate};
use crate::services::certificate_issuer::CertificateIssuer;
use futures::stream::{self, StreamExt};
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;

/// Default number of rows processed concurrently.
pub const DEFAULT_WORKERS: usize = 10;

#[derive(Clone)]
pub struct BatchIssuer {
    issuer: CertificateIssuer,
    workers: usize,
}

impl BatchIssuer {
    pub fn new(issuer: CertificateIssuer, workers: usize) -> Self {
        Self {
            issuer,
            workers: workers.max(1),
        }
    }

    /// Issues one certificate per row.
    ///
    /// Always yields exactly one result per input row. Results come back in
    /// completion order; the report is joined back onto the rows in input
    /// order.
    pub async fn process(&self, institution: Arc<Institution>, rows: Vec<RawRow>) -> BatchOutcome {
        let started = Instant::now();
        info!(
            "Batch of {} rows for {} started with {} workers",
            rows.len(),
            institution.name,
            self.workers
        );

        let tasks = rows.iter().cloned().enumerate().map(|(index, raw)| {
            let issuer = self.issuer.clone();
            let institution = Arc::clone(&institution);
            async move {
                let reg_number = raw.reg_number();
                let row_started = Instant::now();
                let handle =
                    tokio::spawn(async move { issue_row(&issuer, &institution, &raw).await });

                let result = match handle.await {
                    Ok(Ok(issued)) => BatchResult::success(index, issued.reg_number, issued.cid),
                    Ok(Err(e)) => BatchResult::failure(index, reg_number, e),
                    Err(e) => BatchResult::failure(index, reg_number, RowError::Worker(e.to_string())),
                };
                if result.is_success() {
                    info!("Row {} ({}) issued in {:?}", index, result.reg_number, row_started.elapsed());
                } else {
                    warn!("Row {} ({}) failed: {}", index, result.reg_number, result.status);
                }
                result
            }
        });

        let results: Vec<BatchResult> = stream::iter(tasks)
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let outcome = BatchOutcome::join(&rows, results);
        info!(
            "Batch finished: {}/{} rows issued in {:?} ({} records on file)",
            outcome.succeeded(),
            rows.len(),
            started.elapsed(),
            self.issuer.records().count().unwrap_or_default()
        );
        outcome
    }
}

async fn issue_row(
    issuer: &CertificateIssuer,
    institution: &Institution,
    raw: &RawRow,
) -> Result<IssuedCertificate, RowError> {
    let row = BatchRow::try_from(raw)?;
    Ok(issuer.issue_row(institution, row).await?)
}
