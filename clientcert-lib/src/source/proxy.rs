//! Certificates forwarded by a TLS-terminating reverse proxy.
//!
//! The proxy is configured to request a client certificate without
//! verifying it against any CA (nginx `ssl_verify_client optional_no_ca`)
//! and to forward it URL-encoded along with a few precomputed fields:
//!
//! ```text
//! x-ssl-client-cert             $ssl_client_escaped_cert
//! x-ssl-client-verify           $ssl_client_verify
//! x-ssl-client-subject-dn       $ssl_client_s_dn
//! x-ssl-client-issuer-dn        $ssl_client_i_dn
//! x-ssl-client-serial           $ssl_client_serial
//! x-ssl-client-fingerprint      $ssl_client_fingerprint
//! x-ssl-client-start-date       $ssl_client_v_start
//! x-ssl-client-end-date         $ssl_client_v_end
//! x-ssl-client-days-remaining   $ssl_client_v_remain
//! ```
//!
//! Because the proxy never checked the chain, a record from this source is
//! always reported `invalid`; trust is decided by a later explicit
//! validation.
//!
//! Fingerprints are computed over the DER bytes, like the Direct-TLS path,
//! so they match `openssl x509 -fingerprint` but not older dashboards that
//! hashed the forwarded PEM text.

use crate::convert;
use crate::dn::parse_dn;
use crate::fields::{
    CertificateOutcome, CertificateRecord, DateTime, NameMap, RecordFields, SourceVerification,
};
use crate::parser;
use crate::util;
use crate::ClientCertError;
use http::HeaderMap;
use percent_encoding::percent_decode_str;

pub const DEFAULT_HEADER_PREFIX: &str = "x-ssl-";

/// Authorization error reported for every proxy-forwarded certificate.
pub const PROXY_AUTHORIZATION_ERROR: &str =
    "CA validation disabled due to browser compatibility issue";

/// Names of the forwarded headers, all lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyHeaders {
    pub cert: String,
    pub verify: String,
    pub subject_dn: String,
    pub issuer_dn: String,
    pub serial: String,
    pub fingerprint: String,
    pub start_date: String,
    pub end_date: String,
    pub days_remaining: String,
}

impl ProxyHeaders {
    pub fn with_prefix(prefix: &str) -> Self {
        let name = |suffix: &str| format!("{}client-{}", prefix, suffix).to_ascii_lowercase();
        ProxyHeaders {
            cert: name("cert"),
            verify: name("verify"),
            subject_dn: name("subject-dn"),
            issuer_dn: name("issuer-dn"),
            serial: name("serial"),
            fingerprint: name("fingerprint"),
            start_date: name("start-date"),
            end_date: name("end-date"),
            days_remaining: name("days-remaining"),
        }
    }
}

impl Default for ProxyHeaders {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_HEADER_PREFIX)
    }
}

/// Reads the proxy's client-certificate headers.
#[derive(Debug, Clone, Default)]
pub struct ProxyHeaderSource {
    headers: ProxyHeaders,
}

impl ProxyHeaderSource {
    pub fn new(headers: ProxyHeaders) -> Self {
        ProxyHeaderSource { headers }
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self::new(ProxyHeaders::with_prefix(prefix))
    }

    pub fn header_names(&self) -> &ProxyHeaders {
        &self.headers
    }

    pub fn extract(&self, headers: &HeaderMap) -> CertificateOutcome {
        let encoded = match headers.get(self.headers.cert.as_str()) {
            None => return CertificateOutcome::Missing,
            Some(value) if value.is_empty() => return CertificateOutcome::Missing,
            Some(value) => match value.to_str() {
                Ok(text) => text,
                Err(_) => {
                    return CertificateOutcome::Error {
                        message: "client certificate header is not valid ASCII".into(),
                    }
                }
            },
        };

        match self.build_record(headers, encoded) {
            Ok(record) => CertificateOutcome::Presented(Box::new(record)),
            Err(e) => {
                tracing::warn!(error = %e, "could not read proxy-forwarded certificate");
                CertificateOutcome::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    fn build_record(
        &self,
        headers: &HeaderMap,
        encoded_cert: &str,
    ) -> Result<CertificateRecord, ClientCertError> {
        let pem = percent_decode_str(encoded_cert)
            .decode_utf8()
            .map_err(|e| ClientCertError::PemError(format!("URL-decoded certificate: {}", e)))?
            .into_owned();
        let der = convert::pem_to_der(util::ensure_pem_armor(&pem).as_bytes())?;
        // Only checked for well-formedness; the forwarded headers stay the
        // source of the record's fields.
        parser::parse_der(&der)?;

        let text = |name: &str| header_text(headers, name);
        if let Some(verify) = text(self.headers.verify.as_str()) {
            tracing::debug!(verify, "proxy client verification status");
        }

        let names = &self.headers;
        let fields = RecordFields {
            subject: text(names.subject_dn.as_str())
                .map(parse_dn)
                .unwrap_or_else(NameMap::new),
            issuer: text(names.issuer_dn.as_str())
                .map(parse_dn)
                .unwrap_or_else(NameMap::new),
            valid_from: text(names.start_date.as_str()).and_then(|t| parse_date(&names.start_date, t)),
            valid_to: text(names.end_date.as_str()).and_then(|t| parse_date(&names.end_date, t)),
            serial_number: text(names.serial.as_str()).map(str::to_string),
            subject_alt_names: None,
            ext_key_usage: None,
            days_remaining: text(names.days_remaining.as_str()).and_then(parse_days),
        };

        let record = CertificateRecord::new(
            fields,
            &der,
            pem,
            SourceVerification::Invalid {
                authorization_error: Some(PROXY_AUTHORIZATION_ERROR.to_string()),
            },
        );

        if let Some(reported) = text(self.headers.fingerprint.as_str()) {
            if normalize_fingerprint(reported) != normalize_fingerprint(record.fingerprint_sha1()) {
                tracing::warn!(
                    reported,
                    computed = record.fingerprint_sha1(),
                    "proxy fingerprint does not match the forwarded certificate"
                );
            }
        }

        Ok(record)
    }
}

fn header_text<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_date(header: &str, text: &str) -> Option<DateTime> {
    let parsed = DateTime::parse_openssl(text);
    if parsed.is_none() {
        tracing::warn!(header, text, "unrecognized proxy date");
    }
    parsed
}

fn parse_days(text: &str) -> Option<i64> {
    match text.parse() {
        Ok(days) => Some(days),
        Err(_) => {
            tracing::warn!(text, "unrecognized days-remaining value");
            None
        }
    }
}

fn normalize_fingerprint(text: &str) -> String {
    text.chars()
        .filter(|c| *c != ':')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
