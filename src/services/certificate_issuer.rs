// src/services/certificate_issuer.rs
//! Certificate Issuer Service
//!
//! Runs the two single-entry certificate flows:
//! - Issue: render (placeholder QR) → pin PDF → pin metadata → persist record
//! - Update: fetch metadata → fetch original PDF → overlay the real
//!   verification QR on page 1
//!
//! Rendering and merging are CPU bound and run on the blocking pool; every
//! network step goes through [`IpfsStorage`].

use crate::error::{IssueError, UpdateError};
use crate::models::batch::BatchRow;
use crate::models::certificate::{
    CertificateRequest, Institution, IssuedCertificate, MetadataCid, PdfCid, QrMode,
    VerificationMetadata,
};
use crate::pdf::overlay::{create_overlay, merge_overlay};
use crate::pdf::renderer::render_certificate;
use crate::storage::certificate_records::{CertificateRecord, CertificateRepository};
use crate::storage::ipfs_client::{cid_from_url, IpfsStorage};
use log::{debug, info};
use std::sync::Arc;
use std::time::Instant;

/// Issues and re-issues certificates.
///
/// Cloning shares the storage client and the record repository.
#[derive(Clone)]
pub struct CertificateIssuer {
    storage: IpfsStorage,
    records: Arc<dyn CertificateRepository>,
    /// Base URL of the verification frontend encoded in QR codes
    frontend_base_url: Arc<str>,
}

impl CertificateIssuer {
    pub fn new(
        storage: IpfsStorage,
        records: Arc<dyn CertificateRepository>,
        frontend_base_url: &str,
    ) -> Self {
        Self {
            storage,
            records,
            frontend_base_url: Arc::from(frontend_base_url),
        }
    }

    pub fn records(&self) -> &Arc<dyn CertificateRepository> {
        &self.records
    }

    /// Issues a certificate for one validated row, dated today.
    pub async fn issue_row(
        &self,
        institution: &Institution,
        row: BatchRow,
    ) -> Result<IssuedCertificate, IssueError> {
        self.issue(row.into_request(institution, today())).await
    }

    /// Issues a certificate.
    ///
    /// The PDF carries a placeholder QR code because its verification
    /// identifier (the metadata CID) only exists after both uploads.
    ///
    /// # Returns
    /// The metadata CID (public identifier), the PDF CID and the PDF's
    /// public gateway URL
    pub async fn issue(&self, request: CertificateRequest) -> Result<IssuedCertificate, IssueError> {
        let started = Instant::now();
        let file_name = pdf_file_name(&request);

        let rendered = {
            let request = request.clone();
            tokio::task::spawn_blocking(move || render_certificate(&request, QrMode::Dummy))
                .await
                .map_err(|e| IssueError::Worker(e.to_string()))??
        };
        debug!(
            "Rendered {} in {:?} (qr mode {})",
            file_name,
            started.elapsed(),
            rendered.mode.name()
        );

        let pdf_cid = PdfCid::new(
            self.storage
                .upload_file(&file_name, rendered.bytes, "application/pdf")
                .await?,
        );
        let pdf_url = self.storage.public_url(pdf_cid.as_str());

        let metadata = VerificationMetadata::describe(&request, pdf_url.clone());
        let cid = MetadataCid::new(self.storage.upload_json(&metadata).await?);

        self.records
            .save(CertificateRecord::from_metadata(&metadata, cid.clone()))?;

        info!(
            "Issued certificate {} for {} in {:?}",
            cid,
            request.reg_number,
            started.elapsed()
        );
        Ok(IssuedCertificate {
            reg_number: request.reg_number,
            cid,
            pdf_cid,
            pdf_url,
        })
    }

    /// Re-issues a certificate with its real verification QR code.
    ///
    /// The original PDF is not regenerated: a one-page overlay holding the
    /// QR code is merged onto its first page.
    ///
    /// # Arguments
    /// * `cid` - Metadata CID returned when the certificate was issued
    ///
    /// # Returns
    /// The merged PDF bytes
    pub async fn update_with_cid(&self, cid: &MetadataCid) -> Result<Vec<u8>, UpdateError> {
        let started = Instant::now();
        let metadata: VerificationMetadata = self.storage.fetch_json(cid.as_str()).await?;
        let pdf_cid = cid_from_url(&metadata.pdf_ipfs_url)
            .map(PdfCid::new)
            .ok_or_else(|| UpdateError::BadPdfUrl(metadata.pdf_ipfs_url.clone()))?;

        let original = self.storage.fetch(pdf_cid.as_str()).await?;

        let frontend_base_url = Arc::clone(&self.frontend_base_url);
        let metadata_cid = cid.clone();
        let reg_number = metadata.reg_number;
        let merged = tokio::task::spawn_blocking(move || {
            let overlay = create_overlay(&frontend_base_url, &metadata_cid, &reg_number)?;
            merge_overlay(&original, &overlay)
        })
        .await
        .map_err(|e| UpdateError::Worker(e.to_string()))??;

        info!(
            "Updated certificate {} (pdf {}) in {:?}",
            cid,
            pdf_cid,
            started.elapsed()
        );
        Ok(merged)
    }
}

/// Issue date as recorded on the certificate.
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// `<name>_<surname>_<course>.pdf`, whitespace and `/` replaced by `_`.
pub fn pdf_file_name(request: &CertificateRequest) -> String {
    let stem = format!(
        "{}_{}_{}",
        request.student_name.trim(),
        request.student_surname.trim(),
        request.course.trim()
    );
    let stem: String = stem
        .chars()
        .map(|c| if c.is_whitespace() || c == '/' { '_' } else { c })
        .collect();
    format!("{}.pdf", stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiToken;
    use crate::error::{FetchError, UploadError};
    use crate::storage::certificate_records::InMemoryCertificateStore;
    use crate::storage::ipfs_client::StorageSettings;
    use lopdf::Document;
    use mockito::{mock, Matcher};
    use serde_json::json;
    use std::time::Duration;
    use tokio_test::assert_err;

    const FRONTEND: &str = "https://verify.example.org";

    fn issuer(prefix: &str) -> (CertificateIssuer, Arc<InMemoryCertificateStore>) {
        let server = mockito::server_url();
        let storage = IpfsStorage::new(StorageSettings {
            api_url: format!("{}/{}", server, prefix),
            token: ApiToken::new("issuer-jwt"),
            gateways: vec![format!("{}/{}-gw/{{cid}}", server, prefix)],
            public_gateway: "https://gateway.example/ipfs".into(),
            upload_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(2),
        });
        let records = Arc::new(InMemoryCertificateStore::new());
        (CertificateIssuer::new(storage, records.clone(), FRONTEND), records)
    }

    fn request() -> CertificateRequest {
        CertificateRequest {
            student_name: "Ada".into(),
            student_surname: "Lovelace".into(),
            reg_number: "R001".into(),
            course: "Computer Science".into(),
            degree_class: "First Class".into(),
            institution_name: "Analytical University".into(),
            institution_logo: None,
            date_issued: "2024-05-01".into(),
        }
    }

    #[test]
    fn test_pdf_file_name() {
        assert_eq!(pdf_file_name(&request()), "Ada_Lovelace_Computer_Science.pdf");
    }

    #[test]
    fn test_today_format() {
        let date = today();
        assert_eq!(date.len(), 10);
        assert!(chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_ok());
    }

    #[tokio::test]
    async fn test_issue_pins_pdf_then_metadata() {
        let pdf_pin = mock("POST", "/issue-ok/pinning/pinFileToIPFS")
            .with_status(200)
            .with_body(r#"{"IpfsHash":"QmIssuedPdf"}"#)
            .expect(1)
            .create();
        let metadata_pin = mock("POST", "/issue-ok/pinning/pinJSONToIPFS")
            .match_body(Matcher::PartialJson(json!({
                "reg_number": "R001",
                "institution": "Analytical University",
                "pdf_ipfs_url": "https://gateway.example/ipfs/QmIssuedPdf"
            })))
            .with_status(200)
            .with_body(r#"{"IpfsHash":"QmIssuedMeta"}"#)
            .expect(1)
            .create();

        let (issuer, records) = issuer("issue-ok");
        let issued = issuer.issue(request()).await.unwrap();

        assert_eq!(issued.cid, MetadataCid::new("QmIssuedMeta"));
        assert_eq!(issued.pdf_cid, PdfCid::new("QmIssuedPdf"));
        assert_eq!(issued.pdf_url, "https://gateway.example/ipfs/QmIssuedPdf");
        let record = records.find_by_reg_number("R001").unwrap().unwrap();
        assert_eq!(record.cid.as_str(), "QmIssuedMeta");
        pdf_pin.assert();
        metadata_pin.assert();
    }

    #[tokio::test]
    async fn test_issue_stops_on_upload_failure() {
        let _pdf_pin = mock("POST", "/issue-fail/pinning/pinFileToIPFS")
            .with_status(503)
            .create();
        let metadata_pin = mock("POST", "/issue-fail/pinning/pinJSONToIPFS")
            .with_status(200)
            .with_body(r#"{"IpfsHash":"QmNever"}"#)
            .expect(0)
            .create();

        let (issuer, records) = issuer("issue-fail");
        let err = assert_err!(issuer.issue(request()).await);
        assert!(matches!(err, IssueError::Upload(UploadError::Rejected { status: 503, .. })));
        assert_eq!(records.count().unwrap(), 0);
        metadata_pin.assert();
    }

    #[tokio::test]
    async fn test_issue_rejects_incomplete_request() {
        let (issuer, _) = issuer("issue-invalid");
        let mut incomplete = request();
        incomplete.student_surname.clear();
        assert!(matches!(
            issuer.issue(incomplete).await,
            Err(IssueError::Render(_))
        ));
    }

    #[tokio::test]
    async fn test_update_overlays_original_pdf() {
        let original = render_certificate(&request(), QrMode::Dummy).unwrap().bytes;
        let _metadata = mock("GET", "/update-ok-gw/QmUpdMeta")
            .with_status(200)
            .with_body(
                json!({
                    "student_name": "Ada",
                    "student_surname": "Lovelace",
                    "reg_number": "R001",
                    "course": "Computer Science",
                    "degree_class": "First Class",
                    "institution": "Analytical University",
                    "date_issued": "2024-05-01",
                    "pdf_ipfs_url": "https://gateway.example/ipfs/QmUpdPdf"
                })
                .to_string(),
            )
            .create();
        let _pdf = mock("GET", "/update-ok-gw/QmUpdPdf")
            .with_status(200)
            .with_body(&original)
            .create();

        let (issuer, _) = issuer("update-ok");
        let merged = issuer.update_with_cid(&MetadataCid::new("QmUpdMeta")).await.unwrap();

        assert_ne!(merged, original);
        let doc = Document::load_mem(&merged).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        let content = doc.get_page_content(doc.get_pages()[&1]).unwrap();
        assert!(String::from_utf8_lossy(&content).contains(" Do"));
    }

    #[tokio::test]
    async fn test_update_unknown_cid_fails() {
        let _missing = mock("GET", "/update-missing-gw/QmGone").with_status(404).create();
        let (issuer, _) = issuer("update-missing");
        let err = assert_err!(issuer.update_with_cid(&MetadataCid::new("QmGone")).await);
        assert!(matches!(err, UpdateError::Fetch(FetchError::Exhausted { .. })));
    }

    #[tokio::test]
    async fn test_update_rejects_metadata_without_pdf_url() {
        let _metadata = mock("GET", "/update-badurl-gw/QmNoPdf")
            .with_status(200)
            .with_body(
                json!({
                    "student_name": "Ada",
                    "student_surname": "Lovelace",
                    "reg_number": "R001",
                    "course": "CS",
                    "degree_class": "First",
                    "institution": "AU",
                    "date_issued": "2024-05-01",
                    "pdf_ipfs_url": ""
                })
                .to_string(),
            )
            .create();
        let (issuer, _) = issuer("update-badurl");
        let err = assert_err!(issuer.update_with_cid(&MetadataCid::new("QmNoPdf")).await);
        assert!(matches!(err, UpdateError::BadPdfUrl(_)));
    }
}
