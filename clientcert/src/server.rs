//! HTTP API.
//!
//! `GET /api/certificate` reports the client certificate of the current
//! request. The two `POST` endpoints validate a certificate the caller kept
//! from an earlier `/api/certificate` response, either against the bundled
//! CA of its issuer or against CA certificates uploaded with the request.

use crate::error::{ApiError, MISSING_CA_FIELDS, MISSING_ISSUER_FIELDS};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use clientcert_lib::source::ProxyHeaders;
use clientcert_lib::{
    CaFile, CertificateResponse, CertificateSource, ChainValidator, ClientCertError,
    InboundRequest, PeerCertificate, ValidationResult,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<CertificateSource>,
    pub validator: Arc<ChainValidator>,
    pub listen: SocketAddr,
    /// Header names reported by `/api/server-info`.
    pub proxy_headers: Arc<ProxyHeaders>,
}

pub fn router(state: AppState, max_body: usize) -> Router {
    Router::new()
        .route("/api/certificate", get(certificate))
        .route("/api/server-info", get(server_info))
        .route("/api/validate-certificate", post(validate_known_issuer))
        .route("/api/validate-certificate-with-ca", post(validate_with_ca))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn certificate(
    State(state): State<AppState>,
    peer: Option<Extension<PeerCertificate>>,
    headers: HeaderMap,
) -> Json<CertificateResponse> {
    let request = InboundRequest {
        headers: &headers,
        peer: peer.as_ref().map(|Extension(p)| p),
    };
    let outcome = state.source.extract(&request);
    tracing::info!(
        mode = state.source.mode(),
        status = ?outcome.status(),
        "client certificate requested"
    );
    Json(CertificateResponse::from(&outcome))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfo {
    mode: &'static str,
    listen: String,
    proxy_headers: ForwardedHeaders,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ForwardedHeaders {
    verify: String,
    subject_dn: String,
}

async fn server_info(State(state): State<AppState>, headers: HeaderMap) -> Json<ServerInfo> {
    let forwarded = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or("not set")
            .to_string()
    };
    Json(ServerInfo {
        mode: state.source.mode(),
        listen: state.listen.to_string(),
        proxy_headers: ForwardedHeaders {
            verify: forwarded(&state.proxy_headers.verify),
            subject_dn: forwarded(&state.proxy_headers.subject_dn),
        },
    })
}

#[derive(Debug, Deserialize)]
struct KnownIssuerRequest {
    #[serde(default)]
    certificate: Option<String>,
    #[serde(default, rename = "issuerCN")]
    issuer_cn: Option<String>,
}

async fn validate_known_issuer(
    State(state): State<AppState>,
    payload: Result<Json<KnownIssuerRequest>, JsonRejection>,
) -> Result<Json<ValidationResult>, ApiError> {
    let Json(body) = payload.map_err(|e| rejected(e, MISSING_ISSUER_FIELDS))?;
    let (Some(certificate), Some(issuer_cn)) = (present(body.certificate), present(body.issuer_cn))
    else {
        return Err(ApiError::BadRequest(MISSING_ISSUER_FIELDS));
    };

    let validator = Arc::clone(&state.validator);
    let log_issuer = issuer_cn.clone();
    let result = tokio::task::spawn_blocking(move || {
        validator.validate_against_known_issuer(&certificate, &issuer_cn)
    })
    .await?
    .map_err(|e| missing_fields_or(e, MISSING_ISSUER_FIELDS))?;

    tracing::info!(
        issuer_cn = %log_issuer,
        valid = result.valid,
        diagnosis = ?result.diagnosis,
        ca_file = result.ca_file.as_deref(),
        "validated against known issuer"
    );
    Ok(Json(result))
}

/// An uploaded CA: bare PEM text or a named file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UploadedCa {
    Pem(String),
    Named { name: String, content: String },
}

impl UploadedCa {
    fn into_ca_file(self, index: usize) -> CaFile {
        match self {
            UploadedCa::Pem(pem) => CaFile {
                name: format!("ca-{}", index + 1),
                pem,
            },
            UploadedCa::Named { name, content } => CaFile { name, pem: content },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedCaRequest {
    #[serde(default)]
    certificate: Option<String>,
    #[serde(default)]
    ca_certificates: Option<Vec<UploadedCa>>,
}

async fn validate_with_ca(
    State(state): State<AppState>,
    payload: Result<Json<UploadedCaRequest>, JsonRejection>,
) -> Result<Json<ValidationResult>, ApiError> {
    let Json(body) = payload.map_err(|e| rejected(e, MISSING_CA_FIELDS))?;
    let Some(certificate) = present(body.certificate) else {
        return Err(ApiError::BadRequest(MISSING_CA_FIELDS));
    };
    let ca_files: Vec<CaFile> = body
        .ca_certificates
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, ca)| ca.into_ca_file(i))
        .collect();
    if ca_files.is_empty() {
        return Err(ApiError::BadRequest(MISSING_CA_FIELDS));
    }

    let names: Vec<String> = ca_files.iter().map(|ca| ca.name.clone()).collect();
    let validator = Arc::clone(&state.validator);
    let result = tokio::task::spawn_blocking(move || validator.validate(&certificate, &ca_files))
        .await?
        .map_err(|e| missing_fields_or(e, MISSING_CA_FIELDS))?;

    tracing::info!(
        ca_files = ?names,
        valid = result.valid,
        diagnosis = ?result.diagnosis,
        "validated against uploaded CAs"
    );
    Ok(Json(result))
}

fn present(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

fn rejected(rejection: JsonRejection, message: &'static str) -> ApiError {
    tracing::debug!(error = %rejection.body_text(), "unreadable validation request");
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge;
    }
    ApiError::BadRequest(message)
}

fn missing_fields_or(error: ClientCertError, message: &'static str) -> ApiError {
    match error {
        ClientCertError::MissingField(_) => ApiError::BadRequest(message),
        other => ApiError::Validation(other),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use clientcert_lib::{
        der_to_pem, DirectTlsSource, KnownIssuer, KnownIssuerRegistry, OpensslVerifier,
        ProxyHeaderSource, ValidationCache, X509Verifier,
    };
    use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
    use tower::ServiceExt;

    struct Issued {
        cert: rcgen::Certificate,
        key: KeyPair,
    }

    fn issue(cn: &str, ca: bool, issuer: Option<&Issued>) -> Issued {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, cn);
        if ca {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        }
        let cert = match issuer {
            Some(issuer) => params.signed_by(&key, &issuer.cert, &issuer.key),
            None => params.self_signed(&key),
        }
        .unwrap();
        Issued { cert, key }
    }

    struct Chain {
        root: Issued,
        intermediate: Issued,
        leaf: Issued,
    }

    fn chain() -> Chain {
        let root = issue("Test Root CA", true, None);
        let intermediate = issue("Test Intermediate CA", true, Some(&root));
        let leaf = issue("Jane Doe", false, Some(&intermediate));
        Chain {
            root,
            intermediate,
            leaf,
        }
    }

    fn validator() -> ChainValidator {
        ChainValidator::new(Arc::new(X509Verifier::new()), Arc::new(ValidationCache::new()))
            .with_system_bundles(Vec::new())
    }

    fn state(source: CertificateSource, validator: ChainValidator) -> AppState {
        AppState {
            source: Arc::new(source),
            validator: Arc::new(validator),
            listen: "127.0.0.1:3000".parse().unwrap(),
            proxy_headers: Arc::new(ProxyHeaders::default()),
        }
    }

    fn proxy_app() -> Router {
        let source = CertificateSource::ProxyHeaders(ProxyHeaderSource::default());
        router(state(source, validator()), 1024 * 1024)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    // ── /api/certificate ─────────────────────────────────────────

    #[tokio::test]
    async fn certificate_missing_in_proxy_mode() {
        let (status, body) = call(proxy_app(), get_req("/api/certificate")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "status": "missing" }));
    }

    #[tokio::test]
    async fn certificate_from_tls_connection() {
        let chain = chain();
        let source = CertificateSource::DirectTls(DirectTlsSource::new());
        let app = router(state(source, validator()), 1024 * 1024);

        let mut request = get_req("/api/certificate");
        request.extensions_mut().insert(PeerCertificate {
            chain: vec![chain.leaf.cert.der().to_vec()],
            authorized: false,
            authorization_error: Some("UNABLE_TO_GET_ISSUER_CERT_LOCALLY".into()),
        });
        let (status, body) = call(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "invalid");
        assert_eq!(body["authorizationError"], "UNABLE_TO_GET_ISSUER_CERT_LOCALLY");
        assert_eq!(body["certificate"]["subject"]["CN"], "Jane Doe");
        assert_eq!(body["certificate"]["issuer"]["CN"], "Test Intermediate CA");
        assert_eq!(
            body["certificate"]["raw"],
            der_to_pem(chain.leaf.cert.der())
        );
    }

    // ── /api/server-info ─────────────────────────────────────────

    #[tokio::test]
    async fn server_info_reports_forwarded_headers() {
        let request = Request::builder()
            .uri("/api/server-info")
            .header("x-ssl-client-subject-dn", "CN=Jane Doe")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(proxy_app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({
                "mode": "proxy",
                "listen": "127.0.0.1:3000",
                "proxyHeaders": { "verify": "not set", "subjectDn": "CN=Jane Doe" }
            })
        );
    }

    // ── /api/validate-certificate-with-ca ────────────────────────

    #[tokio::test]
    async fn with_ca_requires_certificate_and_cas() {
        let cases = [
            serde_json::json!({}),
            serde_json::json!({ "certificate": "" , "caCertificates": ["x"] }),
            serde_json::json!({ "certificate": "abc" }),
            serde_json::json!({ "certificate": "abc", "caCertificates": [] }),
        ];
        for body in cases {
            let (status, json) = call(
                proxy_app(),
                json_post("/api/validate-certificate-with-ca", body.clone()),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
            assert_eq!(json["error"], MISSING_CA_FIELDS);
        }
    }

    #[tokio::test]
    async fn with_ca_full_chain_is_valid() {
        let chain = chain();
        let body = serde_json::json!({
            "certificate": chain.leaf.cert.pem(),
            "caCertificates": [chain.intermediate.cert.pem(), chain.root.cert.pem()],
        });
        let (status, json) =
            call(proxy_app(), json_post("/api/validate-certificate-with-ca", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["valid"], true);
        assert!(json["details"].as_str().unwrap().contains("OK"));
    }

    #[tokio::test]
    async fn with_ca_accepts_named_files() {
        let chain = chain();
        let body = serde_json::json!({
            "certificate": chain.leaf.cert.pem(),
            "caCertificates": [
                { "name": "intermediate.pem", "content": chain.intermediate.cert.pem() },
                chain.root.cert.pem(),
            ],
        });
        let (status, json) =
            call(proxy_app(), json_post("/api/validate-certificate-with-ca", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["valid"], true);
    }

    #[tokio::test]
    async fn with_ca_missing_intermediate_is_diagnosed() {
        let chain = chain();
        let body = serde_json::json!({
            "certificate": chain.leaf.cert.pem(),
            "caCertificates": [chain.root.cert.pem()],
        });
        let (status, json) =
            call(proxy_app(), json_post("/api/validate-certificate-with-ca", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["valid"], false);
        assert_eq!(json["diagnosis"], "intermediate_missing");
        assert!(json["details"]
            .as_str()
            .unwrap()
            .contains("unable to get local issuer certificate"));
    }

    #[tokio::test]
    async fn verifier_that_cannot_run_is_a_server_error() {
        let verifier = OpensslVerifier::new().program("/nonexistent/openssl");
        let validator = ChainValidator::new(Arc::new(verifier), Arc::new(ValidationCache::new()));
        let source = CertificateSource::ProxyHeaders(ProxyHeaderSource::default());
        let app = router(state(source, validator), 1024 * 1024);

        let chain = chain();
        let body = serde_json::json!({
            "certificate": chain.leaf.cert.pem(),
            "caCertificates": [chain.root.cert.pem()],
        });
        let (status, json) = call(app, json_post("/api/validate-certificate-with-ca", body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], crate::error::INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let source = CertificateSource::ProxyHeaders(ProxyHeaderSource::default());
        let app = router(state(source, validator()), 64);
        let body = serde_json::json!({ "certificate": "A".repeat(128), "caCertificates": ["x"] });
        let (status, json) = call(app, json_post("/api/validate-certificate-with-ca", body)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["error"], crate::error::BODY_TOO_LARGE);
    }

    #[tokio::test]
    async fn oversized_body_with_content_length_is_json() {
        let source = CertificateSource::ProxyHeaders(ProxyHeaderSource::default());
        let app = router(state(source, validator()), 64);
        let body = serde_json::json!({ "certificate": "A".repeat(128), "issuerCN": "x" })
            .to_string();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/validate-certificate")
            .header("content-type", "application/json")
            .header("content-length", body.len())
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            response.headers()["content-type"],
            "application/json"
        );
        let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], crate::error::BODY_TOO_LARGE);
    }

    // ── /api/validate-certificate ────────────────────────────────

    #[tokio::test]
    async fn known_issuer_requires_both_fields() {
        for body in [
            serde_json::json!({ "certificate": "abc" }),
            serde_json::json!({ "issuerCN": "Test Intermediate CA" }),
        ] {
            let (status, json) =
                call(proxy_app(), json_post("/api/validate-certificate", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["error"], MISSING_ISSUER_FIELDS);
        }
    }

    #[tokio::test]
    async fn known_issuer_malformed_json_is_bad_request() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/validate-certificate")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, json) = call(proxy_app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], MISSING_ISSUER_FIELDS);
    }

    #[tokio::test]
    async fn known_issuer_uses_bundled_ca_file() {
        let chain = chain();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("test-chain.pem"),
            format!("{}\n{}", chain.intermediate.cert.pem(), chain.root.cert.pem()),
        )
        .unwrap();
        let registry =
            KnownIssuerRegistry::new(vec![KnownIssuer::new("Test Intermediate", "test-chain.pem")]);
        let validator = validator()
            .with_registry(registry)
            .with_ca_dir(dir.path());
        let source = CertificateSource::ProxyHeaders(ProxyHeaderSource::default());
        let app = router(state(source, validator), 1024 * 1024);

        let body = serde_json::json!({
            "certificate": chain.leaf.cert.pem(),
            "issuerCN": "Test Intermediate CA",
        });
        let (status, json) = call(app, json_post("/api/validate-certificate", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["valid"], true);
        assert_eq!(json["caFile"], "test-chain.pem");
    }

    #[tokio::test]
    async fn known_issuer_without_bundle_is_informational() {
        let chain = chain();
        let body = serde_json::json!({
            "certificate": chain.leaf.cert.pem(),
            "issuerCN": "Nobody Knows CA",
        });
        let (status, json) = call(proxy_app(), json_post("/api/validate-certificate", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["valid"], false);
        assert_eq!(json["diagnosis"], "ca_not_found");
        assert!(json["error"].as_str().unwrap().contains("Nobody Knows CA"));
    }
}
