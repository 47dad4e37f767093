#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Direct-TLS and proxy-header certificate sources.

mod common;

use clientcert_lib::source::PROXY_AUTHORIZATION_ERROR;
use clientcert_lib::*;
use http::{HeaderMap, HeaderValue};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

fn proxy_headers(cert_pem: &str) -> HeaderMap {
    let encoded = utf8_percent_encode(cert_pem, NON_ALPHANUMERIC).to_string();
    let mut headers = HeaderMap::new();
    let mut set = |name: &'static str, value: &str| {
        headers.insert(name, HeaderValue::from_str(value).unwrap());
    };
    set("x-ssl-client-cert", &encoded);
    set("x-ssl-client-verify", "NONE");
    set(
        "x-ssl-client-subject-dn",
        r"CN=Old\C5\99ich \C5\A0v\C3\A9da,O=\C4\8Cesk\C3\A1 po\C5\A1ta,C=CZ",
    );
    set("x-ssl-client-issuer-dn", "CN=Test Intermediate CA,O=Test PKI,C=CZ");
    set("x-ssl-client-serial", "0A1B2C");
    set("x-ssl-client-start-date", "Feb  3 23:57:06 2026 GMT");
    set("x-ssl-client-end-date", "Feb  3 23:57:06 2027 GMT");
    set("x-ssl-client-days-remaining", "42");
    headers
}

fn to_json(outcome: &CertificateOutcome) -> serde_json::Value {
    serde_json::to_value(CertificateResponse::from(outcome)).unwrap()
}

// ---------------------------------------------------------------------------
// Proxy headers
// ---------------------------------------------------------------------------

#[test]
fn proxy_without_certificate_is_missing() {
    let outcome = ProxyHeaderSource::default().extract(&HeaderMap::new());
    assert_eq!(outcome, CertificateOutcome::Missing);
    assert_eq!(to_json(&outcome), serde_json::json!({ "status": "missing" }));
}

#[test]
fn proxy_certificate_is_always_invalid() {
    let pki = common::pki();
    let outcome = ProxyHeaderSource::default().extract(&proxy_headers(&pki.leaf.pem()));
    assert_eq!(outcome.status(), SourceStatus::Invalid);

    let json = to_json(&outcome);
    assert_eq!(json["status"], "invalid");
    assert_eq!(json["authorizationError"], PROXY_AUTHORIZATION_ERROR);
}

#[test]
fn proxy_record_fields() {
    let pki = common::pki();
    let pem = pki.leaf.pem();
    let outcome = ProxyHeaderSource::default().extract(&proxy_headers(&pem));
    let record = outcome.record().unwrap();

    assert_eq!(record.subject()["CN"], "Oldřich Švéda");
    assert_eq!(record.subject()["O"], "Česká pošta");
    assert_eq!(record.issuer_common_name(), Some("Test Intermediate CA"));
    assert_eq!(record.serial_number(), Some("0A1B2C"));
    assert_eq!(record.days_remaining(), Some(42));
    assert_eq!(record.raw_pem(), pem);
    assert_eq!(record.fingerprint_sha256(), sha256_fingerprint(&pki.leaf.der()));
    assert_eq!(record.fingerprint_sha1(), sha1_fingerprint(&pki.leaf.der()));
    assert_ne!(record.fingerprint_sha256(), sha256_fingerprint(pem.as_bytes()));
    assert_eq!(record.subject_alt_names(), None);

    let view = CertificateView::from(record);
    assert_eq!(view.valid_from.as_deref(), Some("Feb  3 23:57:06 2026 GMT"));
    assert_eq!(view.valid_to.as_deref(), Some("Feb  3 23:57:06 2027 GMT"));
}

#[test]
fn proxy_ignores_unparsable_optional_headers() {
    let pki = common::pki();
    let mut headers = proxy_headers(&pki.leaf.pem());
    headers.insert("x-ssl-client-start-date", HeaderValue::from_static("yesterday"));
    headers.insert("x-ssl-client-days-remaining", HeaderValue::from_static("many"));
    headers.insert("x-ssl-client-fingerprint", HeaderValue::from_static("00:11"));

    let outcome = ProxyHeaderSource::default().extract(&headers);
    let record = outcome.record().unwrap();
    assert!(record.valid_from().is_none());
    assert_eq!(record.days_remaining(), None);
    // Computed value wins over the proxy's.
    assert_eq!(record.fingerprint_sha1(), sha1_fingerprint(&pki.leaf.der()));
}

#[test]
fn proxy_with_custom_prefix() {
    let pki = common::pki();
    let encoded = utf8_percent_encode(&pki.leaf.pem(), NON_ALPHANUMERIC).to_string();
    let mut headers = HeaderMap::new();
    headers.insert("x-tls-client-cert", HeaderValue::from_str(&encoded).unwrap());

    assert_eq!(
        ProxyHeaderSource::default().extract(&headers),
        CertificateOutcome::Missing
    );
    let outcome = ProxyHeaderSource::with_prefix("x-tls-").extract(&headers);
    assert_eq!(outcome.status(), SourceStatus::Invalid);
    assert!(outcome.record().unwrap().subject().is_empty());
}

#[test]
fn proxy_garbage_certificate_is_an_error() {
    let mut headers = HeaderMap::new();
    headers.insert("x-ssl-client-cert", HeaderValue::from_static("not%20a%20certificate"));
    let outcome = ProxyHeaderSource::default().extract(&headers);
    assert_eq!(outcome.status(), SourceStatus::Error);

    let json = to_json(&outcome);
    assert_eq!(json["status"], "error");
    assert!(json["error"].is_string());
    assert!(json.get("certificate").is_none());
}

// ---------------------------------------------------------------------------
// Direct TLS
// ---------------------------------------------------------------------------

fn peer(der: Vec<u8>, authorized: bool, error: Option<&str>) -> PeerCertificate {
    PeerCertificate {
        chain: vec![der],
        authorized,
        authorization_error: error.map(str::to_string),
    }
}

#[test]
fn direct_authorized_certificate_is_valid() {
    let pki = common::pki();
    let peer = peer(pki.leaf.der(), true, None);
    let outcome = DirectTlsSource::new().extract(Some(&peer));
    assert_eq!(outcome.status(), SourceStatus::Valid);

    let json = to_json(&outcome);
    assert_eq!(json["status"], "valid");
    assert!(json.get("authorizationError").is_none());

    let cert = &json["certificate"];
    assert_eq!(cert["subject"]["CN"], "Jane Doe");
    assert_eq!(cert["subject"]["O"], "Test PKI");
    assert_eq!(cert["issuer"]["CN"], "Test Intermediate CA");
    assert_eq!(cert["subjectaltname"], "DNS:client.example, IP Address:10.0.0.1");
    assert_eq!(
        cert["ext_key_usage"],
        // clientAuth, emailProtection in certificate order
        serde_json::json!(["1.3.6.1.5.5.7.3.2", "1.3.6.1.5.5.7.3.4"])
    );
    assert_eq!(cert["fingerprint256"], sha256_fingerprint(&pki.leaf.der()));
    assert_eq!(cert["raw"], der_to_pem(&pki.leaf.der()));

    let serial = cert["serialNumber"].as_str().unwrap();
    assert!(!serial.is_empty());
    assert!(serial.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    assert!(cert["valid_to"].as_str().unwrap().ends_with(" GMT"));
}

#[test]
fn direct_unauthorized_certificate_keeps_reason() {
    let pki = common::pki();
    let peer = peer(
        pki.leaf.der(),
        false,
        Some("UNABLE_TO_GET_ISSUER_CERT_LOCALLY"),
    );
    let json = to_json(&DirectTlsSource::new().extract(Some(&peer)));
    assert_eq!(json["status"], "invalid");
    assert_eq!(json["authorizationError"], "UNABLE_TO_GET_ISSUER_CERT_LOCALLY");
}

#[test]
fn direct_record_can_be_validated_later() {
    let pki = common::pki();
    let peer = peer(pki.leaf.der(), false, None);
    let outcome = DirectTlsSource::new().extract(Some(&peer));
    let record = outcome.record().unwrap();

    let validator = ChainValidator::new(
        std::sync::Arc::new(X509Verifier::new()),
        std::sync::Arc::new(ValidationCache::new()),
    );
    let result = validator
        .validate(record.raw_pem(), &[pki.chain_bundle()])
        .unwrap();
    assert!(result.valid);
}

// ---------------------------------------------------------------------------
// Source selection
// ---------------------------------------------------------------------------

#[test]
fn each_source_reads_only_its_own_input() {
    let pki = common::pki();
    let headers = proxy_headers(&pki.leaf.pem());
    let peer = peer(pki.leaf.der(), true, None);
    let request = InboundRequest {
        headers: &headers,
        peer: Some(&peer),
    };

    let direct = CertificateSource::DirectTls(DirectTlsSource::new());
    let proxy = CertificateSource::ProxyHeaders(ProxyHeaderSource::default());
    assert_eq!(direct.extract(&request).status(), SourceStatus::Valid);
    assert_eq!(proxy.extract(&request).status(), SourceStatus::Invalid);

    let bare = HeaderMap::new();
    let no_peer = InboundRequest {
        headers: &bare,
        peer: None,
    };
    assert_eq!(direct.extract(&no_peer), CertificateOutcome::Missing);
    assert_eq!(direct.mode(), "direct-tls");
    assert_eq!(proxy.mode(), "proxy");
}
