// src/models/certificate.rs
//! Certificate data model.
//!
//! Two content identifiers exist per issued certificate: one for the PDF
//! artifact and one for the JSON metadata describing it. They are kept as
//! distinct types so a PDF CID can never be handed out where the public
//! (metadata) identifier is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel QR payload used before the certificate's identifier exists.
pub const DUMMY_QR_PAYLOAD: &str = "DUMMY";

macro_rules! cid_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(cid: impl Into<String>) -> Self {
                $name(cid.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

cid_type!(
    /// CID of the uploaded certificate PDF.
    PdfCid
);
cid_type!(
    /// CID of the uploaded metadata JSON. This is the public verification
    /// identifier shared with students and verifiers.
    MetadataCid
);

/// The issuing institution, as read from the institution directory.
///
/// Read-only for the duration of any issuance.
#[derive(Debug, Clone)]
pub struct Institution {
    pub id: String,
    pub name: String,
    /// Raw logo image bytes (PNG or JPEG)
    pub logo: Option<Vec<u8>>,
}

/// Everything the renderer needs to draw one certificate.
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateRequest {
    pub student_name: String,
    pub student_surname: String,
    pub reg_number: String,
    pub course: String,
    pub degree_class: String,
    pub institution_name: String,
    pub institution_logo: Option<Vec<u8>>,
    /// Formatted `YYYY-MM-DD`
    pub date_issued: String,
}

impl CertificateRequest {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.student_name.trim(), self.student_surname.trim())
    }
}

/// What, if anything, the certificate's QR code encodes.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrMode {
    /// Live verification URL; the identifier is printed under the title block
    Real(String),
    /// Placeholder, used when the identifier does not exist yet
    Dummy,
    /// No QR code at all
    None,
}

impl QrMode {
    pub fn name(&self) -> &'static str {
        match self {
            QrMode::Real(_) => "real",
            QrMode::Dummy => "dummy",
            QrMode::None => "none",
        }
    }
}

/// A rendered single-page certificate.
#[derive(Debug, Clone)]
pub struct RenderedCertificate {
    pub bytes: Vec<u8>,
    pub mode: QrMode,
}

/// JSON document pinned next to each certificate PDF.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VerificationMetadata {
    pub student_name: String,
    pub student_surname: String,
    pub reg_number: String,
    pub course: String,
    pub degree_class: String,
    pub institution: String,
    pub date_issued: String,
    /// Public gateway URL of the PDF; its last path segment is the PDF CID
    pub pdf_ipfs_url: String,
}

impl VerificationMetadata {
    pub fn describe(request: &CertificateRequest, pdf_ipfs_url: String) -> Self {
        VerificationMetadata {
            student_name: request.student_name.clone(),
            student_surname: request.student_surname.clone(),
            reg_number: request.reg_number.clone(),
            course: request.course.clone(),
            degree_class: request.degree_class.clone(),
            institution: request.institution_name.clone(),
            date_issued: request.date_issued.clone(),
            pdf_ipfs_url,
        }
    }
}

/// Result of a successful single-entry issuance.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub reg_number: String,
    /// Public identifier (metadata CID)
    pub cid: MetadataCid,
    pub pdf_cid: PdfCid,
    pub pdf_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CertificateRequest {
        CertificateRequest {
            student_name: " Ada ".into(),
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
    fn test_full_name_trims_parts() {
        assert_eq!(request().full_name(), "Ada Lovelace");
    }

    #[test]
    fn test_metadata_json_shape() {
        let metadata = VerificationMetadata::describe(&request(), "https://gw/ipfs/QmPdf".into());
        let value = serde_json::to_value(&metadata).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "course", "date_issued", "degree_class", "institution", "pdf_ipfs_url",
                "reg_number", "student_name", "student_surname",
            ]
        );
        assert_eq!(value["institution"], "Analytical University");
    }

    #[test]
    fn test_cids_serialize_as_plain_strings() {
        let cid = MetadataCid::new("QmMeta");
        assert_eq!(serde_json::to_string(&cid).unwrap(), "\"QmMeta\"");
        assert_eq!(cid.to_string(), "QmMeta");
    }
}
