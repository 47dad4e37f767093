//! Certificate path building from a leaf up to a trust anchor.
//!
//! Every issuer comes from the trust store; there is no separate pool of
//! untrusted intermediates. The path ends at the first self-issued
//! certificate, and a path that cannot be completed is reported with the
//! OpenSSL error code and depth at which the lookup failed.

use super::x509::{VerifyFailure, X509ErrorCode};
use super::TrustStore;
use x509_parser::prelude::*;

/// Maximum chain depth to prevent infinite loops during chain building.
pub(crate) const MAX_CHAIN_DEPTH: usize = 32;

/// Build the path `leaf → ... → self-issued anchor`.
///
/// When several trusted certificates share the issuer name, the first one
/// whose key verifies the current certificate is taken; if none does, the
/// first candidate is taken and the signature check reports the failure.
pub(crate) fn build_path<'a>(
    leaf_der: &[u8],
    leaf: X509Certificate<'a>,
    store: &'a TrustStore,
) -> Result<Vec<X509Certificate<'a>>, VerifyFailure> {
    let leaf_trusted = store.contains(leaf_der);
    let mut chain = vec![leaf];

    loop {
        let depth = chain.len() - 1;
        let Some(current) = chain.last() else {
            return Ok(chain);
        };

        let issuer_raw = current.issuer().as_raw();
        if current.subject().as_raw() == issuer_raw {
            if depth == 0 && !leaf_trusted {
                return Err(VerifyFailure::at(
                    X509ErrorCode::DepthZeroSelfSigned,
                    depth,
                    current,
                ));
            }
            return Ok(chain);
        }

        if chain.len() > MAX_CHAIN_DEPTH {
            return Err(VerifyFailure::at(
                X509ErrorCode::CertChainTooLong,
                depth,
                current,
            ));
        }

        let mut candidates: Vec<X509Certificate<'a>> = store
            .find_by_subject_raw(issuer_raw)
            .iter()
            .filter_map(|der| X509Certificate::from_der(der).ok().map(|(_, cert)| cert))
            .collect();

        if candidates.is_empty() {
            // The error code says whether the top of the path came from
            // the trust store (2) or is the untrusted leaf itself (20).
            let code = if depth == 0 {
                X509ErrorCode::UnableToGetIssuerCertLocally
            } else {
                X509ErrorCode::UnableToGetIssuerCert
            };
            return Err(VerifyFailure::at(code, depth, current));
        }

        let pick = candidates
            .iter()
            .position(|c| current.verify_signature(Some(c.public_key())).is_ok())
            .unwrap_or(0);
        let next = candidates.swap_remove(pick);
        chain.push(next);
    }
}
