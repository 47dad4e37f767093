//! In-process chain verification built on `x509-parser`.
//!
//! Mirrors what `openssl verify -CAfile bundle cert` checks and, more
//! importantly, how it words failures: the first error is reported as
//! `error N at D depth lookup: reason`, so output from this backend and from
//! the openssl executable classify the same way.

use super::chain::build_path;
use super::{ChainVerifier, TrustStore, VerifierOutput};
use crate::convert;
use crate::parser::build_dn;
use crate::ClientCertError;
use std::time::{SystemTime, UNIX_EPOCH};
use x509_parser::prelude::*;

/// OpenSSL `X509_V_ERR_*` codes this verifier can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum X509ErrorCode {
    UnableToGetIssuerCert,
    CertSignatureFailure,
    CertNotYetValid,
    CertHasExpired,
    DepthZeroSelfSigned,
    UnableToGetIssuerCertLocally,
    CertChainTooLong,
    InvalidCa,
}

impl X509ErrorCode {
    pub fn code(self) -> u32 {
        match self {
            X509ErrorCode::UnableToGetIssuerCert => 2,
            X509ErrorCode::CertSignatureFailure => 7,
            X509ErrorCode::CertNotYetValid => 9,
            X509ErrorCode::CertHasExpired => 10,
            X509ErrorCode::DepthZeroSelfSigned => 18,
            X509ErrorCode::UnableToGetIssuerCertLocally => 20,
            X509ErrorCode::CertChainTooLong => 22,
            X509ErrorCode::InvalidCa => 24,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            X509ErrorCode::UnableToGetIssuerCert => "unable to get issuer certificate",
            X509ErrorCode::CertSignatureFailure => "certificate signature failure",
            X509ErrorCode::CertNotYetValid => "certificate is not yet valid",
            X509ErrorCode::CertHasExpired => "certificate has expired",
            X509ErrorCode::DepthZeroSelfSigned => "self signed certificate",
            X509ErrorCode::UnableToGetIssuerCertLocally => "unable to get local issuer certificate",
            X509ErrorCode::CertChainTooLong => "certificate chain too long",
            X509ErrorCode::InvalidCa => "invalid CA certificate",
        }
    }
}

/// First verification error, with the certificate it was found at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyFailure {
    pub code: X509ErrorCode,
    pub depth: usize,
    pub subject: String,
}

impl VerifyFailure {
    pub(crate) fn at(code: X509ErrorCode, depth: usize, cert: &X509Certificate) -> Self {
        VerifyFailure {
            code,
            depth,
            subject: build_dn(cert.subject()).to_oneline(),
        }
    }

    /// Render the way `openssl verify` prints a failure.
    pub fn render(&self) -> String {
        format!(
            "{}\nerror {} at {} depth lookup: {}\nerror certificate: verification failed\n",
            self.subject,
            self.code.code(),
            self.depth,
            self.code.reason()
        )
    }
}

/// Verifies in-process. All bundle certificates are trust anchors; partial
/// chains are not accepted.
#[derive(Debug, Clone, Default)]
pub struct X509Verifier {
    at_time: Option<i64>,
}

impl X509Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify at a fixed Unix timestamp instead of the current time.
    pub fn at_time(mut self, timestamp: i64) -> Self {
        self.at_time = Some(timestamp);
        self
    }

    fn now(&self) -> i64 {
        self.at_time.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
                .unwrap_or(0)
        })
    }
}

impl ChainVerifier for X509Verifier {
    fn verify(&self, cert_pem: &str, ca_bundle_pem: &str) -> Result<VerifierOutput, ClientCertError> {
        let leaf_der = match convert::pem_to_der(cert_pem.as_bytes()) {
            Ok(der) => der,
            Err(e) => return Ok(VerifierOutput::failed(format!("unable to load certificate: {}", e))),
        };
        let leaf = match X509Certificate::from_der(&leaf_der) {
            Ok((_, cert)) => cert,
            Err(e) => return Ok(VerifierOutput::failed(format!("unable to load certificate: {}", e))),
        };
        let store = match TrustStore::from_pem(ca_bundle_pem.as_bytes()) {
            Ok(store) => store,
            Err(e) => return Ok(VerifierOutput::failed(format!("unable to load CA bundle: {}", e))),
        };

        let outcome = build_path(&leaf_der, leaf, &store)
            .and_then(|chain| check_chain_extensions(&chain).map(|()| chain))
            .and_then(|chain| check_signatures_and_time(&chain, self.now()));

        Ok(match outcome {
            Ok(()) => VerifierOutput::passed("certificate: OK\n"),
            Err(failure) => {
                tracing::debug!(
                    code = failure.code.code(),
                    depth = failure.depth,
                    "in-process verification failed"
                );
                VerifierOutput::failed(failure.render())
            }
        })
    }
}

/// Every certificate above the leaf must be a CA. Version 1 certificates
/// carry no extensions and are accepted as CAs.
fn check_chain_extensions(chain: &[X509Certificate]) -> Result<(), VerifyFailure> {
    for (depth, cert) in chain.iter().enumerate().skip(1) {
        let is_ca = match cert.basic_constraints() {
            Ok(Some(bc)) => bc.value.ca,
            Ok(None) => cert.version() == X509Version::V1,
            Err(_) => false,
        };
        if !is_ca {
            return Err(VerifyFailure::at(X509ErrorCode::InvalidCa, depth, cert));
        }
    }
    Ok(())
}

/// Walk from the anchor down to the leaf checking each signature against
/// the issuer's key and then the validity window. The anchor's own
/// self-signature is not checked.
fn check_signatures_and_time(chain: &[X509Certificate], now: i64) -> Result<(), VerifyFailure> {
    for (depth, cert) in chain.iter().enumerate().rev() {
        if let Some(issuer) = chain.get(depth + 1) {
            if cert.verify_signature(Some(issuer.public_key())).is_err() {
                return Err(VerifyFailure::at(
                    X509ErrorCode::CertSignatureFailure,
                    depth,
                    cert,
                ));
            }
        }

        let validity = cert.validity();
        if validity.not_before.timestamp() > now {
            return Err(VerifyFailure::at(X509ErrorCode::CertNotYetValid, depth, cert));
        }
        if validity.not_after.timestamp() < now {
            return Err(VerifyFailure::at(X509ErrorCode::CertHasExpired, depth, cert));
        }
    }
    Ok(())
}
