//! clientcert-lib: inspection and chain validation of TLS client certificates.
//!
//! A browser-presented client certificate reaches this library either from a
//! TLS handshake the service terminated itself, or as headers forwarded by a
//! reverse proxy. [`CertificateSource`] turns both into one canonical
//! [`CertificateRecord`] (parsed names, fingerprints, PEM text). The
//! [`ChainValidator`] then checks the PEM against caller-supplied CA
//! certificates or a bundled CA file picked by issuer name, and explains
//! failures such as a missing intermediate in plain terms.

mod cache;
mod convert;
pub mod dn;
mod fields;
mod fingerprint;
pub mod oid;
mod parser;
mod registry;
pub mod source;
mod util;
pub mod verify;

pub use cache::{cache_key, ValidationCache};
pub use convert::{der_to_pem, pem_to_der};
pub use dn::parse_dn;
pub use fields::{
    CaFile, CertificateOutcome, CertificateRecord, CertificateResponse, CertificateView,
    DateTime, Diagnosis, DistinguishedName, NameMap, RecordFields, SourceStatus,
    SourceVerification, ValidationResult,
};
pub use fingerprint::{compute_fingerprint, sha1_fingerprint, sha256_fingerprint, DigestAlgorithm};
pub use parser::{parse_cert, parse_der, parse_pem, ParsedCertificate};
pub use registry::{KnownIssuer, KnownIssuerRegistry};
pub use source::{
    CertificateSource, DirectTlsSource, InboundRequest, PeerCertificate, ProxyHeaderSource,
};
pub use util::ensure_pem_armor;
pub use verify::{
    parse_pem_chain, sweep_stale_temp_files, ChainValidator, ChainVerifier, OpensslVerifier,
    TrustStore, VerifierOutput, X509Verifier,
};

/// Errors returned by clientcert-lib.
#[derive(Debug, thiserror::Error)]
pub enum ClientCertError {
    #[error("Failed to parse certificate: {0}")]
    ParseError(String),

    #[error("Invalid PEM format: {0}")]
    PemError(String),

    #[error("Invalid DER format: {0}")]
    DerError(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Certificate verifier could not run: {0}")]
    VerifierExecution(String),

    #[error("Certificate verifier timed out after {0:?}")]
    VerifierTimeout(std::time::Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
