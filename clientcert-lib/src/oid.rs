//! OID string constants for the attributes and extensions this crate reads.
//!
//! Distinguished-name attributes follow RFC 4519 / X.520; extensions follow
//! RFC 5280 Section 4.2.

// ── X.509 Distinguished Name attributes (RFC 4519 / X.520) ──────────────

pub const COMMON_NAME: &str = "2.5.4.3";
pub const SURNAME: &str = "2.5.4.4";
pub const SERIAL_NUMBER: &str = "2.5.4.5";
pub const COUNTRY: &str = "2.5.4.6";
pub const LOCALITY: &str = "2.5.4.7";
pub const STATE_OR_PROVINCE: &str = "2.5.4.8";
pub const STREET_ADDRESS: &str = "2.5.4.9";
pub const ORGANIZATION: &str = "2.5.4.10";
pub const ORGANIZATIONAL_UNIT: &str = "2.5.4.11";
pub const TITLE: &str = "2.5.4.12";
pub const POSTAL_CODE: &str = "2.5.4.17";
pub const GIVEN_NAME: &str = "2.5.4.42";
pub const EMAIL_ADDRESS: &str = "1.2.840.113549.1.9.1"; // PKCS#9
pub const DOMAIN_COMPONENT: &str = "0.9.2342.19200300.100.1.25";

// ── Certificate extensions (RFC 5280 Section 4.2) ────────────────────────

pub const EXT_EXTENDED_KEY_USAGE: &str = "2.5.29.37";

/// Map a DN attribute OID to the short key used in subject/issuer maps
/// (`CN`, `O`, `emailAddress`, ...). Unknown OIDs are returned dotted.
pub fn oid_short_name(oid: &str) -> String {
    match oid {
        COMMON_NAME => "CN",
        SURNAME => "SN",
        SERIAL_NUMBER => "serialNumber",
        COUNTRY => "C",
        LOCALITY => "L",
        STATE_OR_PROVINCE => "ST",
        STREET_ADDRESS => "street",
        ORGANIZATION => "O",
        ORGANIZATIONAL_UNIT => "OU",
        TITLE => "title",
        POSTAL_CODE => "postalCode",
        GIVEN_NAME => "GN",
        EMAIL_ADDRESS => "emailAddress",
        DOMAIN_COMPONENT => "DC",
        other => other,
    }
    .to_string()
}
