//! Certificate chain validation against caller-supplied or known CAs.
//!
//! The actual chain check is delegated to a [`ChainVerifier`]: either the
//! `openssl verify` executable ([`OpensslVerifier`]) or the in-process
//! [`X509Verifier`]. [`ChainValidator`] prepares the input, picks CA files
//! for the known-issuer path, caches those outcomes and classifies failures.

mod chain;
pub mod diagnosis;
mod openssl;
mod trust_store;
mod x509;

use crate::cache::{cache_key, ValidationCache};
use crate::fields::{Diagnosis, ValidationResult};
use crate::registry::KnownIssuerRegistry;
use crate::util;
use crate::ClientCertError;
use std::path::PathBuf;
use std::sync::Arc;
use x509_parser::prelude::*;

pub use openssl::{
    sweep_stale_temp_files, OpensslVerifier, DEFAULT_VERIFY_TIMEOUT, TEMP_FILE_PREFIX,
};
pub use trust_store::{find_system_ca_bundle, system_ca_bundle_candidates, TrustStore};
pub use x509::{VerifyFailure, X509ErrorCode, X509Verifier};

/// Default directory of bundled CA files named by the registry.
pub const DEFAULT_CA_DIR: &str = "ca-certificates";

const UPLOAD_SUCCESS: &str = "Certificate successfully verified against uploaded CA certificates";
const KNOWN_ISSUER_SUCCESS: &str = "Certificate is valid";

/// What a verifier reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierOutput {
    /// The verifier accepted the chain.
    pub passed: bool,
    /// Human-readable output, success token or diagnostics.
    pub text: String,
}

impl VerifierOutput {
    pub fn passed(text: impl Into<String>) -> Self {
        VerifierOutput {
            passed: true,
            text: text.into(),
        }
    }

    pub fn failed(text: impl Into<String>) -> Self {
        VerifierOutput {
            passed: false,
            text: text.into(),
        }
    }
}

/// An external chain-verification capability.
///
/// Implementations block. A chain that does not verify is `Ok` with
/// `passed == false`; `Err` means verification could not be carried out.
pub trait ChainVerifier: Send + Sync {
    fn verify(&self, cert_pem: &str, ca_bundle_pem: &str) -> Result<VerifierOutput, ClientCertError>;
}

/// Parse a PEM-encoded file containing one or more certificates into
/// individual DER-encoded certificates.
pub fn parse_pem_chain(input: &[u8]) -> Result<Vec<Vec<u8>>, ClientCertError> {
    let mut certs = Vec::new();

    for pem_result in Pem::iter_from_buffer(input) {
        match pem_result {
            Ok(pem) => {
                if pem.label == "CERTIFICATE" || pem.label == "TRUSTED CERTIFICATE" {
                    certs.push(pem.contents);
                }
            }
            Err(e) => {
                // If we already have some certs, stop at first error (trailing garbage)
                if !certs.is_empty() {
                    break;
                }
                return Err(ClientCertError::PemError(format!("failed to parse PEM: {}", e)));
            }
        }
    }

    if certs.is_empty() {
        return Err(ClientCertError::PemError(
            "no certificates found in PEM input".into(),
        ));
    }

    Ok(certs)
}

/// Validates certificates and explains failures.
///
/// Cheap to share behind an `Arc`; every method takes `&self` and blocks
/// for as long as the verifier runs.
pub struct ChainValidator {
    verifier: Arc<dyn ChainVerifier>,
    cache: Arc<ValidationCache>,
    registry: KnownIssuerRegistry,
    ca_dir: PathBuf,
    system_bundles: Vec<PathBuf>,
}

impl std::fmt::Debug for ChainValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainValidator")
            .field("cached", &self.cache.len())
            .field("ca_dir", &self.ca_dir)
            .field("system_bundles", &self.system_bundles)
            .finish()
    }
}

impl ChainValidator {
    /// Validator with the built-in registry, CA files under
    /// [`DEFAULT_CA_DIR`] and the system bundle locations.
    pub fn new(verifier: Arc<dyn ChainVerifier>, cache: Arc<ValidationCache>) -> Self {
        ChainValidator {
            verifier,
            cache,
            registry: KnownIssuerRegistry::builtin(),
            ca_dir: PathBuf::from(DEFAULT_CA_DIR),
            system_bundles: system_ca_bundle_candidates(),
        }
    }

    pub fn with_registry(mut self, registry: KnownIssuerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_ca_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ca_dir = dir.into();
        self
    }

    /// Replace the system bundle fallback list. An empty list disables it.
    pub fn with_system_bundles(mut self, bundles: Vec<PathBuf>) -> Self {
        self.system_bundles = bundles;
        self
    }

    pub fn cache(&self) -> &ValidationCache {
        &self.cache
    }

    /// Validate `certificate_pem` against caller-supplied CAs, bundled in
    /// the given order. Outcomes are not cached.
    pub fn validate<S: AsRef<str>>(
        &self,
        certificate_pem: &str,
        ca_certificates: &[S],
    ) -> Result<ValidationResult, ClientCertError> {
        if certificate_pem.trim().is_empty() {
            return Err(ClientCertError::MissingField("certificate"));
        }
        if ca_certificates.is_empty() {
            return Err(ClientCertError::MissingField("caCertificates"));
        }

        let pem = util::ensure_pem_armor(certificate_pem);
        let bundle = ca_certificates
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<&str>>()
            .join("\n");

        tracing::debug!(ca_count = ca_certificates.len(), "validating against supplied CAs");
        match self.run_verifier(&pem, &bundle)? {
            Verification::Completed(output) if output.passed => {
                Ok(ValidationResult::verified(UPLOAD_SUCCESS).with_details(output.text))
            }
            Verification::Completed(output) => Ok(diagnosis::failure_result(&output.text)),
            Verification::TimedOut(result) => Ok(result),
        }
    }

    /// Validate against the CA bundle registered for `issuer_cn`, falling
    /// back to the system bundle.
    ///
    /// Completed verifications are cached by certificate text only, so a
    /// later call with the same certificate returns the first outcome
    /// without running the verifier. "CA not found" and timeouts are not
    /// cached.
    pub fn validate_against_known_issuer(
        &self,
        certificate_pem: &str,
        issuer_cn: &str,
    ) -> Result<ValidationResult, ClientCertError> {
        if certificate_pem.trim().is_empty() {
            return Err(ClientCertError::MissingField("certificate"));
        }
        if issuer_cn.trim().is_empty() {
            return Err(ClientCertError::MissingField("issuerCN"));
        }

        let key = cache_key(certificate_pem);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(%key, "validation cache hit");
            return Ok(hit);
        }

        let Some(ca_path) = self.locate_ca_bundle(issuer_cn) else {
            tracing::info!(issuer_cn, "no CA bundle found for issuer");
            return Ok(ca_not_found(issuer_cn));
        };
        let ca_file = ca_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ca_path.display().to_string());
        let bundle = std::fs::read_to_string(&ca_path)?;

        let pem = util::ensure_pem_armor(certificate_pem);
        let result = match self.run_verifier(&pem, &bundle)? {
            Verification::Completed(output) if output.passed => {
                ValidationResult::verified(KNOWN_ISSUER_SUCCESS).with_ca_file(ca_file)
            }
            Verification::Completed(output) => {
                diagnosis::failure_result(&output.text).with_ca_file(ca_file)
            }
            Verification::TimedOut(result) => return Ok(result),
        };

        self.cache.put(key, result.clone());
        Ok(result)
    }

    /// The CA bundle the known-issuer path would use: the registry's file
    /// if it exists under the CA directory, else the first existing system
    /// bundle.
    pub fn locate_ca_bundle(&self, issuer_cn: &str) -> Option<PathBuf> {
        let registered = self
            .registry
            .resolve(issuer_cn)
            .map(|file| self.ca_dir.join(file))
            .filter(|path| path.is_file());
        if registered.is_some() {
            return registered;
        }
        self.system_bundles.iter().find(|p| p.is_file()).cloned()
    }

    fn run_verifier(&self, pem: &str, bundle: &str) -> Result<Verification, ClientCertError> {
        match self.verifier.verify(pem, bundle) {
            Ok(output) => Ok(Verification::Completed(output)),
            Err(ClientCertError::VerifierTimeout(limit)) => {
                tracing::warn!(?limit, "certificate verification timed out");
                Ok(Verification::TimedOut(ValidationResult::failed(
                    Diagnosis::Timeout,
                    format!("Certificate verification timed out after {:?}", limit),
                )))
            }
            Err(e) => Err(e),
        }
    }
}

enum Verification {
    Completed(VerifierOutput),
    TimedOut(ValidationResult),
}

fn ca_not_found(issuer_cn: &str) -> ValidationResult {
    let result = ValidationResult::failed(
        Diagnosis::CaNotFound,
        format!("CA certificate not found for issuer: {}", issuer_cn),
    );
    match diagnosis::guidance(Diagnosis::CaNotFound) {
        Some(text) => result.with_message(text),
        None => result,
    }
}
