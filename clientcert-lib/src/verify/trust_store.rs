//! Trust anchors for one verification, and system CA bundle discovery.
//!
//! A [`TrustStore`] is built from the CA bundle handed to a verifier. Every
//! certificate in it is trusted, the way `openssl verify -CAfile` treats its
//! bundle.

use crate::ClientCertError;
use std::collections::HashMap;
use std::path::PathBuf;
use x509_parser::prelude::*;

/// Directories probed for a `ca-certificates.crt` bundle when no registry
/// entry matches an issuer, in order.
pub(crate) const SYSTEM_CA_DIRS: &[&str] = &[
    "/etc/ssl/certs",
    "/usr/local/share/ca-certificates",
    "/etc/pki/tls/certs",
];

pub(crate) const SYSTEM_CA_BUNDLE_NAME: &str = "ca-certificates.crt";

/// A set of trusted CA certificates, indexed by raw subject name.
pub struct TrustStore {
    certs_by_subject: HashMap<Vec<u8>, Vec<Vec<u8>>>,
    count: usize,
}

impl std::fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustStore")
            .field("count", &self.count)
            .finish()
    }
}

impl TrustStore {
    /// Create an empty trust store.
    pub fn new() -> Self {
        TrustStore {
            certs_by_subject: HashMap::new(),
            count: 0,
        }
    }

    /// Create a trust store from a PEM bundle. Blocks that are not
    /// parseable certificates are skipped.
    pub fn from_pem(pem_data: &[u8]) -> Result<Self, ClientCertError> {
        let mut store = TrustStore::new();
        store.add_pem_bundle(pem_data)?;
        Ok(store)
    }

    /// Add a DER-encoded certificate to the trust store.
    pub fn add_der(&mut self, der: &[u8]) -> Result<(), ClientCertError> {
        let (_, x509) = X509Certificate::from_der(der)
            .map_err(|e| ClientCertError::DerError(format!("{}", e)))?;

        let subject_raw = x509.subject().as_raw().to_vec();
        self.certs_by_subject
            .entry(subject_raw)
            .or_default()
            .push(der.to_vec());
        self.count += 1;

        Ok(())
    }

    /// Add all certificates from a PEM bundle. Returns the number of
    /// certificates actually added.
    pub fn add_pem_bundle(&mut self, pem_data: &[u8]) -> Result<usize, ClientCertError> {
        let certs = super::parse_pem_chain(pem_data)?;
        let mut added = 0;
        for cert_der in certs {
            if self.add_der(&cert_der).is_ok() {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Trusted certificates whose subject matches the given issuer name.
    pub(crate) fn find_by_subject_raw(&self, subject_raw: &[u8]) -> &[Vec<u8>] {
        self.certs_by_subject
            .get(subject_raw)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of certificates in the store.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check if a DER-encoded certificate is in the trust store.
    pub fn contains(&self, der: &[u8]) -> bool {
        match X509Certificate::from_der(der) {
            Ok((_, x509)) => self
                .find_by_subject_raw(x509.subject().as_raw())
                .iter()
                .any(|c| c == der),
            Err(_) => false,
        }
    }
}

impl Default for TrustStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Candidate system CA bundle files, most specific first:
/// `SSL_CERT_FILE`, the file found by `openssl-probe`, then
/// `ca-certificates.crt` in each of the well-known directories.
///
/// Paths are returned whether or not they exist.
pub fn system_ca_bundle_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(path) = std::env::var("SSL_CERT_FILE") {
        candidates.push(PathBuf::from(path));
    }
    if let Some(file) = openssl_probe::probe().cert_file {
        candidates.push(file);
    }
    for dir in SYSTEM_CA_DIRS {
        candidates.push(PathBuf::from(dir).join(SYSTEM_CA_BUNDLE_NAME));
    }

    candidates.dedup();
    candidates
}

/// Find the first existing system CA bundle.
pub fn find_system_ca_bundle() -> Option<PathBuf> {
    system_ca_bundle_candidates()
        .into_iter()
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_end_with_well_known_locations() {
        let candidates = system_ca_bundle_candidates();
        let tail: Vec<PathBuf> = SYSTEM_CA_DIRS
            .iter()
            .map(|d| PathBuf::from(d).join(SYSTEM_CA_BUNDLE_NAME))
            .collect();
        assert!(candidates.ends_with(&tail));
    }

    #[test]
    fn empty_store() {
        let store = TrustStore::new();
        assert!(store.is_empty());
        assert!(!store.contains(b"not a certificate"));
        assert!(store.find_by_subject_raw(b"nobody").is_empty());
    }
}
