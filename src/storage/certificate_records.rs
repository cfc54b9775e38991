// src/storage/certificate_records.rs
//! Local records of issued certificates.
//!
//! Every successful issuance persists one [`CertificateRecord`] through a
//! [`CertificateRepository`]. The repository is shared between concurrent
//! batch rows, so implementations guard their own state.

use crate::error::PersistError;
use crate::models::certificate::{MetadataCid, VerificationMetadata};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

/// Persisted summary of an issued certificate.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub student_name: String,
    pub student_surname: String,
    pub reg_number: String,
    pub course: String,
    pub degree_class: String,
    pub date_issued: String,
    /// Public identifier of the certificate
    pub cid: MetadataCid,
}

impl CertificateRecord {
    pub fn from_metadata(metadata: &VerificationMetadata, cid: MetadataCid) -> Self {
        CertificateRecord {
            student_name: metadata.student_name.clone(),
            student_surname: metadata.student_surname.clone(),
            reg_number: metadata.reg_number.clone(),
            course: metadata.course.clone(),
            degree_class: metadata.degree_class.clone(),
            date_issued: metadata.date_issued.clone(),
            cid,
        }
    }
}

/// Storage for certificate records.
pub trait CertificateRepository: Send + Sync {
    /// Stores a record. An existing record for the same registration number
    /// is replaced.
    fn save(&self, record: CertificateRecord) -> Result<(), PersistError>;

    fn find_by_reg_number(&self, reg_number: &str) -> Result<Option<CertificateRecord>, PersistError>;

    fn count(&self) -> Result<usize, PersistError>;
}

/// In-memory repository keyed by registration number.
///
/// # Note
/// Records are lost on restart; a database-backed implementation can be
/// dropped in behind the same trait.
#[derive(Default)]
pub struct InMemoryCertificateStore {
    records: Mutex<HashMap<String, CertificateRecord>>,
}

impl InMemoryCertificateStore {
    pub fn new() -> Self {
        InMemoryCertificateStore::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CertificateRecord>>, PersistError> {
        self.records
            .lock()
            .map_err(|_| PersistError::Unavailable("record store lock poisoned".into()))
    }
}

impl CertificateRepository for InMemoryCertificateStore {
    fn save(&self, record: CertificateRecord) -> Result<(), PersistError> {
        self.lock()?.insert(record.reg_number.clone(), record);
        Ok(())
    }

    fn find_by_reg_number(&self, reg_number: &str) -> Result<Option<CertificateRecord>, PersistError> {
        Ok(self.lock()?.get(reg_number).cloned())
    }

    fn count(&self) -> Result<usize, PersistError> {
        Ok(self.lock()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn create_test_record(reg_number: &str, cid: &str) -> CertificateRecord {
        CertificateRecord {
            student_name: "Ada".into(),
            student_surname: "Lovelace".into(),
            reg_number: reg_number.into(),
            course: "Computer Science".into(),
            degree_class: "First Class".into(),
            date_issued: "2024-05-01".into(),
            cid: MetadataCid::new(cid),
        }
    }

    #[test]
    fn test_save_and_find() {
        let store = InMemoryCertificateStore::new();
        assert!(store.find_by_reg_number("R001").unwrap().is_none());

        store.save(create_test_record("R001", "QmOne")).unwrap();
        let found = store.find_by_reg_number("R001").unwrap().unwrap();
        assert_eq!(found.cid, MetadataCid::new("QmOne"));
    }

    #[test]
    fn test_reissue_replaces_record() {
        let store = InMemoryCertificateStore::new();
        store.save(create_test_record("R001", "QmOld")).unwrap();
        store.save(create_test_record("R002", "QmOther")).unwrap();
        store.save(create_test_record("R001", "QmNew")).unwrap();

        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(
            store.find_by_reg_number("R001").unwrap().unwrap().cid.as_str(),
            "QmNew"
        );
    }

    #[test]
    fn test_record_from_metadata() {
        let metadata = VerificationMetadata {
            student_name: "Ada".into(),
            student_surname: "Lovelace".into(),
            reg_number: "R001".into(),
            course: "Computer Science".into(),
            degree_class: "First Class".into(),
            institution: "Analytical University".into(),
            date_issued: "2024-05-01".into(),
            pdf_ipfs_url: "https://gw/ipfs/QmPdf".into(),
        };
        let record = CertificateRecord::from_metadata(&metadata, MetadataCid::new("QmOne"));
        assert_eq!(record, create_test_record("R001", "QmOne"));
    }

    #[test]
    fn test_concurrent_saves() {
        let store = Arc::new(InMemoryCertificateStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .save(create_test_record(&format!("R{:03}", i), "Qm"))
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.count().unwrap(), 8);
    }
}
