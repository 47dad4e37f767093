//! Certificates read from a TLS handshake the service terminated itself.

use crate::fields::{CertificateOutcome, SourceVerification};
use crate::parser;

/// Client certificate and authorization verdict of one TLS connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    /// DER certificates as sent by the client, leaf first.
    pub chain: Vec<Vec<u8>>,
    /// Whether the handshake-time check against the server's client-CA
    /// trust store passed.
    pub authorized: bool,
    /// Why it did not pass, as an OpenSSL-style code name or error text.
    pub authorization_error: Option<String>,
}

impl PeerCertificate {
    pub fn leaf(&self) -> Option<&[u8]> {
        self.chain.first().map(Vec::as_slice)
    }
}

/// Reads the peer certificate of the current connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectTlsSource;

impl DirectTlsSource {
    pub fn new() -> Self {
        DirectTlsSource
    }

    pub fn extract(&self, peer: Option<&PeerCertificate>) -> CertificateOutcome {
        let Some((peer, leaf)) = peer.and_then(|p| p.leaf().map(|leaf| (p, leaf))) else {
            return CertificateOutcome::Missing;
        };

        let parsed = match parser::parse_der(leaf) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "peer certificate could not be parsed");
                return CertificateOutcome::Error {
                    message: e.to_string(),
                };
            }
        };

        let verification = if peer.authorized {
            SourceVerification::Valid
        } else {
            SourceVerification::Invalid {
                authorization_error: peer.authorization_error.clone(),
            }
        };
        let pem = parsed.to_pem();
        CertificateOutcome::Presented(Box::new(parsed.into_record(pem, verification)))
    }
}
