//! Certificate parsing from PEM and DER formats.
//!
//! Produces the fields a TLS stack would hand over for a peer certificate:
//! structured subject/issuer names, validity, serial, SAN text and EKU OIDs.

use crate::convert;
use crate::fields::{
    CertificateRecord, DateTime, DistinguishedName, RecordFields, SourceVerification,
};
use crate::oid;
use crate::util;
use crate::ClientCertError;
use x509_parser::prelude::*;

/// Fields of one parsed certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCertificate {
    pub subject: DistinguishedName,
    pub issuer: DistinguishedName,
    pub not_before: DateTime,
    pub not_after: DateTime,
    /// Uppercase hex, no separators, leading zero bytes stripped.
    pub serial: String,
    /// OpenSSL-style SAN text, `DNS:a.example, IP Address:10.0.0.1`.
    pub subject_alt_names: Option<String>,
    /// Dotted EKU OIDs in certificate order.
    pub ext_key_usage: Option<Vec<String>>,
    /// Exact certificate bytes, without trailing data.
    pub der: Vec<u8>,
}

impl ParsedCertificate {
    /// Whether subject and issuer are the same name.
    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }

    pub fn to_pem(&self) -> String {
        convert::der_to_pem(&self.der)
    }

    /// Build a canonical record, keeping `raw_pem` as the caller received it.
    pub fn into_record(self, raw_pem: String, verification: SourceVerification) -> CertificateRecord {
        let fields = RecordFields {
            subject: self.subject.to_map(),
            issuer: self.issuer.to_map(),
            valid_from: Some(self.not_before),
            valid_to: Some(self.not_after),
            serial_number: Some(self.serial),
            subject_alt_names: self.subject_alt_names,
            ext_key_usage: self.ext_key_usage,
            days_remaining: None,
        };
        CertificateRecord::new(fields, &self.der, raw_pem, verification)
    }
}

/// Parse a certificate from PEM or DER (auto-detected).
///
/// If the input begins with `-----BEGIN` (after stripping whitespace), it is
/// treated as PEM. Otherwise it is treated as DER.
pub fn parse_cert(input: &[u8]) -> Result<ParsedCertificate, ClientCertError> {
    if input.is_empty() {
        return Err(ClientCertError::ParseError("empty input".into()));
    }

    if util::is_pem(input) {
        parse_pem(input)
    } else {
        parse_der(input)
    }
}

/// Parse a certificate from PEM format.
pub fn parse_pem(input: &[u8]) -> Result<ParsedCertificate, ClientCertError> {
    let der = convert::pem_to_der(input)?;
    parse_der(&der)
}

/// Parse a certificate from DER format.
pub fn parse_der(input: &[u8]) -> Result<ParsedCertificate, ClientCertError> {
    let (remaining, x509) = X509Certificate::from_der(input)
        .map_err(|e| ClientCertError::DerError(format!("{}", e)))?;

    // Use only the actual certificate bytes, not any trailing data,
    // so that fingerprints are computed over the correct content.
    let cert_len = input.len() - remaining.len();
    let cert_der = input.get(..cert_len).unwrap_or(input);
    build_parsed_certificate(&x509, cert_der)
}

fn build_parsed_certificate(
    x509: &X509Certificate,
    raw_der: &[u8],
) -> Result<ParsedCertificate, ClientCertError> {
    let tbs = &x509.tbs_certificate;

    if tbs.version.0 > 2 {
        return Err(ClientCertError::ParseError(format!(
            "unsupported X.509 version {} (expected v1, v2, or v3)",
            tbs.version.0 + 1
        )));
    }

    let subject_alt_names = match x509.subject_alternative_name() {
        Ok(Some(san)) => Some(format_san(&san.value.general_names)),
        Ok(None) => None,
        Err(e) => {
            return Err(ClientCertError::ParseError(format!(
                "invalid subjectAltName extension: {}",
                e
            )))
        }
    };

    Ok(ParsedCertificate {
        subject: build_dn(&tbs.subject),
        issuer: build_dn(&tbs.issuer),
        not_before: DateTime::from_timestamp(tbs.validity.not_before.timestamp()),
        not_after: DateTime::from_timestamp(tbs.validity.not_after.timestamp()),
        serial: format_serial(tbs.raw_serial()),
        subject_alt_names,
        ext_key_usage: extended_key_usage_oids(tbs.extensions()),
        der: raw_der.to_vec(),
    })
}

/// Format a serial number as uppercase hex without separators, stripping
/// leading zero bytes but keeping at least one byte.
fn format_serial(raw: &[u8]) -> String {
    let stripped = match raw.iter().position(|&b| b != 0) {
        Some(pos) => raw.get(pos..).unwrap_or(raw),
        None => raw.get(raw.len().saturating_sub(1)..).unwrap_or(raw),
    };
    hex::encode_upper(stripped)
}

pub(crate) fn build_dn(name: &X509Name) -> DistinguishedName {
    let mut components = Vec::new();
    for rdn in name.iter() {
        for attr in rdn.iter() {
            let key = oid::oid_short_name(&attr.attr_type().to_id_string());
            let value = attr.as_str().unwrap_or("<binary>").to_string();
            components.push((key, value));
        }
    }
    DistinguishedName { components }
}

/// Read the EKU extension's OID sequence directly so certificate order is
/// kept; the typed extension only exposes flags.
fn extended_key_usage_oids(extensions: &[X509Extension]) -> Option<Vec<String>> {
    let ext = extensions
        .iter()
        .find(|e| e.oid.to_id_string() == oid::EXT_EXTENDED_KEY_USAGE)?;
    let (_, parsed) = x509_parser::der_parser::parse_der(ext.value).ok()?;
    let seq = parsed.as_sequence().ok()?;
    Some(
        seq.iter()
            .filter_map(|item| item.as_oid().ok().map(|o| o.to_id_string()))
            .collect(),
    )
}

fn format_san(names: &[GeneralName]) -> String {
    names
        .iter()
        .map(format_general_name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_general_name(gn: &GeneralName) -> String {
    match gn {
        GeneralName::DNSName(name) => format!("DNS:{}", name),
        GeneralName::RFC822Name(email) => format!("email:{}", email),
        GeneralName::IPAddress(ip_bytes) => format!("IP Address:{}", format_ip_bytes(ip_bytes)),
        GeneralName::URI(uri) => format!("URI:{}", uri),
        GeneralName::DirectoryName(dn) => format!("DirName:{}", build_dn(dn).to_oneline()),
        GeneralName::RegisteredID(id) => format!("Registered ID:{}", id.to_id_string()),
        _ => "othername:<unsupported>".to_string(),
    }
}

/// IPv4 dotted, IPv6 as eight uncompressed uppercase groups (OpenSSL style).
pub(crate) fn format_ip_bytes(bytes: &[u8]) -> String {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        std::net::Ipv4Addr::from(octets).to_string()
    } else if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
        std::net::Ipv6Addr::from(octets)
            .segments()
            .iter()
            .map(|s| format!("{:X}", s))
            .collect::<Vec<_>>()
            .join(":")
    } else {
        hex::encode(bytes)
    }
}
