// src/services/api_server.rs
//! API Server for the certificate issuance backend
//!
//! Thin HTTP adapter over the issuance services. Handlers translate requests
//! into service calls and service errors into status codes; no business
//! rules live here.
//!
//! The API is built using Axum and includes endpoints for:
//! - Single certificate issuance and batch issuance
//! - Re-issuing a certificate with its real verification QR code
//! - Public certificate verification and record lookup

use crate::error::{FetchError, IssueError, UpdateError};
use crate::models::batch::{BatchRow, RawRow};
use crate::models::certificate::MetadataCid;
use crate::services::batch_issuer::BatchIssuer;
use crate::services::certificate_issuer::CertificateIssuer;
use crate::services::verifier::Verifier;
use crate::storage::institutions::InstitutionDirectory;
use axum::{
    extract::{Json, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

// API request and response structures

/// Response for a successful single issuance
#[derive(Serialize, Deserialize)]
struct IssueCertificateResponse {
    message: String,
    /// Public identifier (metadata CID)
    cid: String,
    pdf_cid: String,
    pdf_url: String,
}

/// Request payload for re-issuing a certificate with a real QR code
#[derive(Serialize, Deserialize)]
struct UpdateCertificateRequest {
    cid: String,
}

/// Request payload for batch issuance
#[derive(Serialize, Deserialize)]
struct BatchIssueRequest {
    institution_id: String,
    rows: Vec<RawRow>,
}

/// Query parameters of the public verification endpoint
#[derive(Serialize, Deserialize)]
struct VerifyCertificateQuery {
    cid: String,
    reg_number: String,
}

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

/// API server state containing all service dependencies
#[derive(Clone)]
pub struct ApiServer {
    /// Single-entry issuance and re-issuance
    issuer: CertificateIssuer,

    /// Bounded concurrent batch issuance
    batch_issuer: BatchIssuer,

    /// Public certificate verification
    verifier: Verifier,

    /// Institutions allowed to issue
    institutions: Arc<dyn InstitutionDirectory>,
}

impl ApiServer {
    pub fn new(
        issuer: CertificateIssuer,
        batch_issuer: BatchIssuer,
        verifier: Verifier,
        institutions: Arc<dyn InstitutionDirectory>,
    ) -> Self {
        ApiServer {
            issuer,
            batch_issuer,
            verifier,
            institutions,
        }
    }

    /// Builds the router with all API routes.
    pub fn router(self) -> Router {
        Router::new()
            .route("/issue-certificate", post(Self::issue_certificate_handler))
            .route("/update-certificate", post(Self::update_certificate_handler))
            .route("/batch-issue-certificates", post(Self::batch_issue_certificates_handler))
            .route("/verify-certificate", get(Self::verify_certificate_handler))
            .route("/certificate/:reg_number", get(Self::get_certificate_handler))
            .layer(CorsLayer::permissive())
            .with_state(Arc::new(self))
    }

    /// Starts the API server and serves requests until the process exits
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:3000")
    pub async fn run(self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", listener.local_addr()?);
        axum::serve(listener, self.router()).await
    }

    // =====================
    // Issuance
    // =====================

    /// Issues a single certificate
    ///
    /// # Endpoint
    /// POST /issue-certificate
    ///
    /// # Request Body
    /// `institution_id` plus the student columns `student_name`,
    /// `student_surname`, `reg_number`, `course`, `degree_class`
    ///
    /// # Responses
    /// - 200 OK: Returns metadata CID, PDF CID and PDF URL
    /// - 400 Bad Request: Missing column
    /// - 404 Not Found: Unknown institution
    /// - 500 Internal Server Error: Rendering, upload or persistence failed
    async fn issue_certificate_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<RawRow>,
    ) -> Response {
        let Some(institution_id) = payload.get("institution_id") else {
            return error_response(StatusCode::BAD_REQUEST, "missing required column `institution_id`");
        };
        let Some(institution) = state.institutions.find(&institution_id) else {
            return error_response(
                StatusCode::NOT_FOUND,
                IssueError::UnknownInstitution(institution_id).to_string(),
            );
        };
        let row = match BatchRow::try_from(&payload) {
            Ok(row) => row,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        };

        match state.issuer.issue_row(&institution, row).await {
            Ok(issued) => (
                StatusCode::OK,
                Json(IssueCertificateResponse {
                    message: "Certificate issued successfully".into(),
                    cid: issued.cid.to_string(),
                    pdf_cid: issued.pdf_cid.to_string(),
                    pdf_url: issued.pdf_url,
                }),
            )
                .into_response(),
            Err(e) => {
                error!("Certificate issuance failed: {}", e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }

    /// Issues certificates for many rows concurrently
    ///
    /// # Endpoint
    /// POST /batch-issue-certificates
    ///
    /// # Request Body
    /// JSON payload with `institution_id` and `rows`, one object per
    /// tabular row
    ///
    /// # Responses
    /// - 200 OK: Per-row results and the joined report (individual rows may
    ///   carry an `error:` status)
    /// - 400 Bad Request: No rows
    /// - 404 Not Found: Unknown institution
    async fn batch_issue_certificates_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<BatchIssueRequest>,
    ) -> Response {
        let Some(institution) = state.institutions.find(&payload.institution_id) else {
            return error_response(
                StatusCode::NOT_FOUND,
                IssueError::UnknownInstitution(payload.institution_id).to_string(),
            );
        };
        if payload.rows.is_empty() {
            return error_response(StatusCode::BAD_REQUEST, "batch contains no rows");
        }

        let outcome = state.batch_issuer.process(institution, payload.rows).await;
        (StatusCode::OK, Json(outcome)).into_response()
    }

    /// Re-issues a certificate with its real verification QR code
    ///
    /// # Endpoint
    /// POST /update-certificate
    ///
    /// # Request Body
    /// `{"cid": "<metadata cid>"}`
    ///
    /// # Responses
    /// - 200 OK: The updated PDF as an attachment
    /// - 400 Bad Request: Empty CID
    /// - 404 Not Found: Metadata or PDF could not be fetched
    /// - 500 Internal Server Error: Merge failed
    async fn update_certificate_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<UpdateCertificateRequest>,
    ) -> Response {
        let cid = payload.cid.trim();
        if cid.is_empty() {
            return error_response(StatusCode::BAD_REQUEST, "cid must not be empty");
        }

        match state.issuer.update_with_cid(&MetadataCid::new(cid)).await {
            Ok(pdf) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/pdf"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"updated_certificate.pdf\"",
                    ),
                ],
                pdf,
            )
                .into_response(),
            Err(e @ UpdateError::Fetch(FetchError::Exhausted { .. })) => {
                warn!("Certificate {} not found: {}", cid, e);
                error_response(StatusCode::NOT_FOUND, e.to_string())
            }
            Err(e) => {
                error!("Updating certificate {} failed: {}", cid, e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }

    // =====================
    // Verification
    // =====================

    /// Verifies a certificate against its registration number
    ///
    /// # Endpoint
    /// GET /verify-certificate?cid=<metadata cid>&reg_number=<reg>
    ///
    /// # Responses
    /// - 200 OK: Certificate metadata with a `valid` flag
    /// - 404 Not Found: No metadata under that CID
    /// - 422 Unprocessable Entity: CID does not hold certificate metadata
    async fn verify_certificate_handler(
        State(state): State<Arc<ApiServer>>,
        Query(query): Query<VerifyCertificateQuery>,
    ) -> Response {
        match state
            .verifier
            .verify(&MetadataCid::new(query.cid.trim()), &query.reg_number)
            .await
        {
            Ok(verification) => (StatusCode::OK, Json(verification)).into_response(),
            Err(e @ FetchError::Exhausted { .. }) => error_response(StatusCode::NOT_FOUND, e.to_string()),
            Err(e @ FetchError::Decode(_)) => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
        }
    }

    /// Looks up the local record of an issued certificate
    ///
    /// # Endpoint
    /// GET /certificate/:reg_number
    ///
    /// # Responses
    /// - 200 OK: The stored record
    /// - 404 Not Found: No certificate issued for that registration number
    /// - 500 Internal Server Error: Record store unavailable
    async fn get_certificate_handler(
        State(state): State<Arc<ApiServer>>,
        Path(reg_number): Path<String>,
    ) -> Response {
        match state.issuer.records().find_by_reg_number(&reg_number) {
            Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
            Ok(None) => error_response(
                StatusCode::NOT_FOUND,
                format!("no certificate for registration number `{}`", reg_number),
            ),
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiToken;
    use crate::models::certificate::{CertificateRequest, Institution, QrMode};
    use crate::pdf::renderer::render_certificate;
    use crate::storage::certificate_records::InMemoryCertificateStore;
    use crate::storage::institutions::StaticInstitutionDirectory;
    use crate::storage::ipfs_client::{IpfsStorage, StorageSettings};
    use axum::body::Body;
    use axum::http::Request;
    use mockito::mock;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(prefix: &str) -> Router {
        let server = mockito::server_url();
        let storage = IpfsStorage::new(StorageSettings {
            api_url: format!("{}/{}", server, prefix),
            token: ApiToken::new("api-jwt"),
            gateways: vec![format!("{}/{}-gw/{{cid}}", server, prefix)],
            public_gateway: "https://gateway.example/ipfs".into(),
            upload_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(2),
        });
        let issuer = CertificateIssuer::new(
            storage.clone(),
            Arc::new(InMemoryCertificateStore::new()),
            "https://verify.example.org",
        );
        let institutions = StaticInstitutionDirectory::new([Institution {
            id: "1".into(),
            name: "Analytical University".into(),
            logo: None,
        }]);
        ApiServer::new(
            issuer.clone(),
            BatchIssuer::new(issuer, 4),
            Verifier::new(storage),
            Arc::new(institutions),
        )
        .router()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn student(reg_number: &str) -> Value {
        json!({
            "institution_id": "1",
            "student_name": "Ada",
            "student_surname": "Lovelace",
            "reg_number": reg_number,
            "course": "Computer Science",
            "degree_class": "First Class"
        })
    }

    fn mock_pinning(prefix: &str) -> (mockito::Mock, mockito::Mock) {
        let pdf = mock("POST", format!("/{}/pinning/pinFileToIPFS", prefix).as_str())
            .with_status(200)
            .with_body(r#"{"IpfsHash":"QmApiPdf"}"#)
            .create();
        let metadata = mock("POST", format!("/{}/pinning/pinJSONToIPFS", prefix).as_str())
            .with_status(200)
            .with_body(r#"{"IpfsHash":"QmApiMeta"}"#)
            .create();
        (pdf, metadata)
    }

    #[tokio::test]
    async fn test_issue_certificate() {
        let _mocks = mock_pinning("api-issue");
        let app = app("api-issue");

        let response = app
            .clone()
            .oneshot(post_json("/issue-certificate", student("R001")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["cid"], "QmApiMeta");
        assert_eq!(body["pdf_cid"], "QmApiPdf");
        assert_eq!(body["pdf_url"], "https://gateway.example/ipfs/QmApiPdf");

        let response = app.oneshot(get("/certificate/R001")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["cid"], "QmApiMeta");
    }

    #[tokio::test]
    async fn test_issue_certificate_validation() {
        let mut missing_course = student("R001");
        missing_course.as_object_mut().unwrap().remove("course");
        let response = app("api-issue-invalid")
            .oneshot(post_json("/issue-certificate", missing_course))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "missing required column `course`"
        );

        let mut unknown_institution = student("R001");
        unknown_institution["institution_id"] = json!(99);
        let response = app("api-issue-invalid")
            .oneshot(post_json("/issue-certificate", unknown_institution))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_batch_issue() {
        let _mocks = mock_pinning("api-batch");
        let mut no_reg = student("");
        no_reg.as_object_mut().unwrap().remove("reg_number");

        let response = app("api-batch")
            .oneshot(post_json(
                "/batch-issue-certificates",
                json!({"institution_id": "1", "rows": [student("R001"), no_reg, student("R003")]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["results"].as_array().unwrap().len(), 3);
        let report = body["report"].as_array().unwrap();
        assert_eq!(report[0]["ipfs_cid"], "QmApiMeta");
        assert_eq!(report[1]["reg_number"], "N/A");
        assert!(report[1]["status"].as_str().unwrap().starts_with("error:"));
    }

    #[tokio::test]
    async fn test_batch_issue_rejects_empty_and_unknown() {
        let response = app("api-batch-empty")
            .oneshot(post_json(
                "/batch-issue-certificates",
                json!({"institution_id": "1", "rows": []}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app("api-batch-empty")
            .oneshot(post_json(
                "/batch-issue-certificates",
                json!({"institution_id": "2", "rows": [student("R001")]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_certificate_returns_pdf() {
        let original = render_certificate(
            &CertificateRequest {
                student_name: "Ada".into(),
                student_surname: "Lovelace".into(),
                reg_number: "R001".into(),
                course: "Computer Science".into(),
                degree_class: "First Class".into(),
                institution_name: "Analytical University".into(),
                institution_logo: None,
                date_issued: "2024-05-01".into(),
            },
            QrMode::Dummy,
        )
        .unwrap()
        .bytes;
        let _metadata = mock("GET", "/api-update-gw/QmApiUpdMeta")
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
                    "pdf_ipfs_url": "https://gateway.example/ipfs/QmApiUpdPdf"
                })
                .to_string(),
            )
            .create();
        let _pdf = mock("GET", "/api-update-gw/QmApiUpdPdf")
            .with_status(200)
            .with_body(&original)
            .create();

        let response = app("api-update")
            .oneshot(post_json("/update-certificate", json!({"cid": "QmApiUpdMeta"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"updated_certificate.pdf\""
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
    }

    #[tokio::test]
    async fn test_update_certificate_errors() {
        let response = app("api-update-err")
            .oneshot(post_json("/update-certificate", json!({"cid": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let _missing = mock("GET", "/api-update-err-gw/QmApiGone").with_status(404).create();
        let response = app("api-update-err")
            .oneshot(post_json("/update-certificate", json!({"cid": "QmApiGone"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_verify_certificate() {
        let _metadata = mock("GET", "/api-verify-gw/QmApiVerify")
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
                    "pdf_ipfs_url": "https://gateway.example/ipfs/QmPdf"
                })
                .to_string(),
            )
            .create();
        let app = app("api-verify");

        let response = app
            .clone()
            .oneshot(get("/verify-certificate?cid=QmApiVerify&reg_number=R001"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["valid"], true);
        assert_eq!(body["course"], "Computer Science");

        let response = app
            .oneshot(get("/verify-certificate?cid=QmApiVerify&reg_number=R002"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["valid"], false);
    }

    #[tokio::test]
    async fn test_unknown_record_and_cors() {
        let response = app("api-cors")
            .oneshot(
                Request::builder()
                    .uri("/certificate/R404")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
