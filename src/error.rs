// src/error.rs
//! Error taxonomy for the certificate pipeline.
//!
//! Each pipeline stage owns one error type. The single-entry flows
//! aggregate them into [`IssueError`] and [`UpdateError`]; the batch flow
//! folds everything that can go wrong with a row into [`RowError`], which is
//! then rendered into that row's `"error: ..."` status string.

use thiserror::Error;

/// Failures while laying out or serializing a certificate PDF.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A required request field was empty
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("qr encoding failed: {0}")]
    Qr(#[from] QrError),

    #[error("pdf serialization failed: {0}")]
    Pdf(#[from] lopdf::Error),
}

#[derive(Debug, Error)]
pub enum QrError {
    #[error("payload cannot be encoded as a qr code: {0}")]
    Encode(#[from] qrcode::types::QrError),

    #[error("invalid verification url: {0}")]
    Url(#[from] url::ParseError),
}

/// Failures talking to the pinning service.
///
/// Messages never contain the bearer token: only the endpoint, the status
/// and the (truncated) response body are reported.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("pinning service unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("pinning service rejected upload ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("pinning service response has no content identifier")]
    MissingCid,

    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("all {attempted} gateways exhausted for cid {cid}")]
    Exhausted { cid: String, attempted: usize },

    #[error("fetched payload is not valid json: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("{0} document has no pages")]
    NoPages(&'static str),

    #[error("{0} document is encrypted")]
    Encrypted(&'static str),

    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("overlay creation failed: {0}")]
    Overlay(#[from] QrError),
}

/// A batch row did not match the expected column schema.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required column `{0}`")]
    MissingColumn(&'static str),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("certificate store unavailable: {0}")]
    Unavailable(String),
}

/// Everything that can fail for a single batch row.
#[derive(Debug, Error)]
pub enum RowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("worker failed: {0}")]
    Worker(String),
}

/// Failure of the single-entry issuance flow.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("unknown institution `{0}`")]
    UnknownInstitution(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("worker failed: {0}")]
    Worker(String),
}

impl From<IssueError> for RowError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::Render(e) => RowError::Render(e),
            IssueError::Upload(e) => RowError::Upload(e),
            IssueError::Persist(e) => RowError::Persist(e),
            other => RowError::Worker(other.to_string()),
        }
    }
}

/// Failure of the re-issue (overlay) flow.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("metadata has no usable pdf url: `{0}`")]
    BadPdfUrl(String),

    #[error("worker failed: {0}")]
    Worker(String),
}
