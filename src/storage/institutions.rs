// src/storage/institutions.rs
//! Institution lookup.
//!
//! Institution registration lives outside this service; issuance only needs
//! to resolve an id to the institution's name and logo.

use crate::config::AppConfig;
use crate::models::certificate::Institution;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;

pub trait InstitutionDirectory: Send + Sync {
    fn find(&self, id: &str) -> Option<Arc<Institution>>;
}

/// Fixed set of institutions, seeded at startup.
#[derive(Default)]
pub struct StaticInstitutionDirectory {
    institutions: HashMap<String, Arc<Institution>>,
}

impl StaticInstitutionDirectory {
    pub fn new(institutions: impl IntoIterator<Item = Institution>) -> Self {
        StaticInstitutionDirectory {
            institutions: institutions
                .into_iter()
                .map(|i| (i.id.clone(), Arc::new(i)))
                .collect(),
        }
    }

    /// Seeds the directory with the configured institution.
    ///
    /// The logo file is read once here. An unreadable logo is logged and the
    /// institution is registered without one.
    pub fn from_config(config: &AppConfig) -> Self {
        let logo = config.institution_logo_path.as_deref().and_then(|path| {
            match std::fs::read(path) {
                Ok(bytes) => {
                    info!("Loaded institution logo from {} ({} bytes)", path, bytes.len());
                    Some(bytes)
                }
                Err(e) => {
                    warn!("Cannot read institution logo {}: {}", path, e);
                    None
                }
            }
        });

        Self::new([Institution {
            id: config.institution_id.clone(),
            name: config.institution_name.clone(),
            logo,
        }])
    }
}

impl InstitutionDirectory for StaticInstitutionDirectory {
    fn find(&self, id: &str) -> Option<Arc<Institution>> {
        self.institutions.get(id.trim()).cloned()
    }
}
