// src/models/batch.rs
//! Batch issuance rows and per-row outcomes.
//!
//! Input rows arrive loosely typed (one string map per tabular row). They are
//! validated into [`BatchRow`] at the row boundary, so a missing column
//! becomes a typed [`ValidationError`] for that row only.

use crate::error::ValidationError;
use crate::models::certificate::{CertificateRequest, Institution, MetadataCid};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Placeholder registration number for rows that have none.
pub const UNKNOWN_REG_NUMBER: &str = "N/A";

/// One untyped input row, keyed by column name.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct RawRow(BTreeMap<String, Value>);

impl RawRow {
    #[cfg(test)]
    pub fn new() -> Self {
        RawRow::default()
    }

    #[cfg(test)]
    pub fn with(mut self, column: &str, value: &str) -> Self {
        self.0.insert(column.to_string(), Value::String(value.to_string()));
        self
    }

    /// Column value as text. Numbers are stringified, `null` counts as absent.
    pub fn get(&self, column: &str) -> Option<String> {
        match self.0.get(column)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Registration number for reporting, even when the row is invalid.
    pub fn reg_number(&self) -> String {
        self.get("reg_number")
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| UNKNOWN_REG_NUMBER.to_string())
    }

    fn required(&self, column: &'static str) -> Result<String, ValidationError> {
        self.get(column)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ValidationError::MissingColumn(column))
    }
}

/// A validated batch row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRow {
    pub student_name: String,
    pub student_surname: String,
    pub reg_number: String,
    pub course: String,
    pub degree_class: String,
}

impl TryFrom<&RawRow> for BatchRow {
    type Error = ValidationError;

    fn try_from(raw: &RawRow) -> Result<Self, Self::Error> {
        Ok(BatchRow {
            student_name: raw.required("student_name")?,
            student_surname: raw.required("student_surname")?,
            reg_number: raw.required("reg_number")?,
            course: raw.required("course")?,
            degree_class: raw.required("degree_class")?,
        })
    }
}

impl BatchRow {
    /// Certificate request for this student, issued by `institution`.
    pub fn into_request(self, institution: &Institution, date_issued: String) -> CertificateRequest {
        CertificateRequest {
            student_name: self.student_name,
            student_surname: self.student_surname,
            reg_number: self.reg_number,
            course: self.course,
            degree_class: self.degree_class,
            institution_name: institution.name.clone(),
            institution_logo: institution.logo.clone(),
            date_issued,
        }
    }
}

/// Outcome of one batch row.
///
/// Serializes as `{reg_number, cid, status: "success"}` or
/// `{reg_number, status: "error: <message>"}`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Position of the source row in the input
    #[serde(skip)]
    pub row_index: usize,
    pub reg_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<MetadataCid>,
    pub status: String,
}

impl BatchResult {
    pub fn success(row_index: usize, reg_number: String, cid: MetadataCid) -> Self {
        BatchResult {
            row_index,
            reg_number,
            cid: Some(cid),
            status: "success".to_string(),
        }
    }

    pub fn failure(row_index: usize, reg_number: String, error: impl std::fmt::Display) -> Self {
        BatchResult {
            row_index,
            reg_number,
            cid: None,
            status: format!("error: {}", error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.cid.is_some()
    }
}

/// One row of the batch report handed back to the tabular export layer.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BatchReportRow {
    pub student_name: String,
    pub student_surname: String,
    pub reg_number: String,
    pub course: String,
    pub degree_class: String,
    pub ipfs_cid: String,
    pub status: String,
}

/// Aggregate batch output: raw results (completion order) and the report
/// joined back onto the input rows (input order).
#[derive(Serialize, Debug, Clone)]
pub struct BatchOutcome {
    pub results: Vec<BatchResult>,
    pub report: Vec<BatchReportRow>,
}

impl BatchOutcome {
    /// Joins each result back onto the input row it came from.
    ///
    /// Rows are matched by position rather than by registration number so
    /// rows with a missing or duplicated `reg_number` still pair up
    /// exactly.
    pub fn join(rows: &[RawRow], results: Vec<BatchResult>) -> Self {
        let mut by_index: BTreeMap<usize, &BatchResult> = BTreeMap::new();
        for result in &results {
            by_index.insert(result.row_index, result);
        }

        let report = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let column = |name: &str| row.get(name).unwrap_or_default();
                let (reg_number, ipfs_cid, status) = match by_index.get(&index) {
                    Some(result) => (
                        result.reg_number.clone(),
                        result.cid.as_ref().map(|c| c.to_string()).unwrap_or_default(),
                        result.status.clone(),
                    ),
                    None => (row.reg_number(), String::new(), "error: no result".to_string()),
                };
                BatchReportRow {
                    student_name: column("student_name"),
                    student_surname: column("student_surname"),
                    reg_number,
                    course: column("course"),
                    degree_class: column("degree_class"),
                    ipfs_cid,
                    status,
                }
            })
            .collect();

        BatchOutcome { results, report }
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }
}
