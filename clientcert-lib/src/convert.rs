//! PEM <-> DER format conversion.

use crate::util;
use crate::ClientCertError;

/// Convert DER-encoded certificate bytes to a PEM string.
pub fn der_to_pem(der: &[u8]) -> String {
    format!(
        "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
        util::base64_wrap(der)
    )
}

/// Convert a PEM-encoded certificate to DER bytes.
///
/// Only the first PEM block is read; its label must name a certificate.
pub fn pem_to_der(pem: &[u8]) -> Result<Vec<u8>, ClientCertError> {
    let (_, block) = x509_parser::pem::parse_x509_pem(pem)
        .map_err(|e| ClientCertError::PemError(format!("{}", e)))?;

    if block.label != "CERTIFICATE"
        && block.label != "TRUSTED CERTIFICATE"
        && block.label != "X509 CERTIFICATE"
    {
        return Err(ClientCertError::PemError(format!(
            "expected CERTIFICATE, got {}",
            block.label
        )));
    }
    if block.contents.is_empty() {
        return Err(ClientCertError::PemError("empty certificate block".into()));
    }

    Ok(block.contents)
}
