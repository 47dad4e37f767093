//! Certificate data types shared by the source adapters, the validator and
//! the HTTP surface.

use crate::fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute key (`CN`, `O`, `emailAddress`, ...) to value.
pub type NameMap = BTreeMap<String, String>;

/// Distinguished name with ordered components, as read from a parsed
/// certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    /// Ordered list of (attribute_type, value) pairs.
    /// Attribute types use short names where known (e.g., "CN", "O", "C").
    pub components: Vec<(String, String)>,
}

impl DistinguishedName {
    /// Format as a comma-separated one-line string matching OpenSSL's default format.
    /// Example: "C = US, O = Org, CN = example.com"
    pub fn to_oneline(&self) -> String {
        let mut result = String::new();
        for (i, (k, v)) in self.components.iter().enumerate() {
            if i > 0 {
                result.push_str(", ");
            }
            result.push_str(k);
            result.push_str(" = ");
            for ch in v.chars() {
                match ch {
                    '\\' => result.push_str("\\\\"),
                    ',' => result.push_str("\\,"),
                    '=' => result.push_str("\\="),
                    _ => result.push(ch),
                }
            }
        }
        result
    }

    /// Collapse into a key/value map. Repeated attributes keep the last value.
    pub fn to_map(&self) -> NameMap {
        self.components.iter().cloned().collect()
    }
}

impl std::fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_oneline())
    }
}

/// Date-time representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateTime {
    /// ISO 8601 formatted string.
    pub iso8601: String,
    /// Unix timestamp.
    pub timestamp: i64,
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

impl DateTime {
    pub fn from_timestamp(ts: i64) -> Self {
        let iso8601 = match ::time::OffsetDateTime::from_unix_timestamp(ts) {
            Ok(dt) => format!(
                "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
                dt.year(),
                u8::from(dt.month()),
                dt.day(),
                dt.hour(),
                dt.minute(),
                dt.second()
            ),
            Err(_) => format!("{}", ts),
        };
        DateTime {
            iso8601,
            timestamp: ts,
        }
    }

    /// Parse OpenSSL's textual date, `Feb  3 23:57:06 2026 GMT`, which is
    /// also what nginx forwards in its validity headers.
    pub fn parse_openssl(text: &str) -> Option<Self> {
        let mut fields = text.split_whitespace();
        let month_name = fields.next()?;
        let day: u8 = fields.next()?.parse().ok()?;
        let clock = fields.next()?;
        let year: i32 = fields.next()?.parse().ok()?;
        if fields.next() != Some("GMT") || fields.next().is_some() {
            return None;
        }

        let month_index = MONTHS.iter().position(|m| *m == month_name)?;
        let month = ::time::Month::try_from(u8::try_from(month_index + 1).ok()?).ok()?;
        let mut hms = clock.split(':').map(|p| p.parse::<u8>().ok());
        let (hour, minute, second) = (hms.next()??, hms.next()??, hms.next()??);

        let date = ::time::Date::from_calendar_date(year, month, day).ok()?;
        let clock = ::time::Time::from_hms(hour, minute, second).ok()?;
        let ts = ::time::PrimitiveDateTime::new(date, clock)
            .assume_utc()
            .unix_timestamp();
        Some(Self::from_timestamp(ts))
    }

    /// Format in OpenSSL's default date style: `Feb  3 23:57:06 2026 GMT`.
    pub fn to_openssl(&self) -> String {
        match ::time::OffsetDateTime::from_unix_timestamp(self.timestamp) {
            Ok(dt) => {
                let month = MONTHS
                    .get(usize::from(u8::from(dt.month())).saturating_sub(1))
                    .copied()
                    .unwrap_or("???");
                format!(
                    "{} {:2} {:02}:{:02}:{:02} {} GMT",
                    month,
                    dt.day(),
                    dt.hour(),
                    dt.minute(),
                    dt.second(),
                    dt.year()
                )
            }
            Err(_) => self.iso8601.clone(),
        }
    }
}

impl std::fmt::Display for DateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_openssl())
    }
}

/// What the transport or proxy layer concluded about the certificate,
/// independent of any later chain validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceVerification {
    /// Handshake-time chain validation against the server trust store passed.
    Valid,
    /// Not validated, or validation failed; the reason when one is known.
    Invalid { authorization_error: Option<String> },
}

/// Status reported to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Missing,
    Invalid,
    Valid,
    Error,
}

/// Descriptive fields of a certificate record; fingerprints are not part of
/// this because they are always derived from the certificate bytes.
#[derive(Debug, Clone, Default)]
pub struct RecordFields {
    pub subject: NameMap,
    pub issuer: NameMap,
    pub valid_from: Option<DateTime>,
    pub valid_to: Option<DateTime>,
    /// Serial number in the source's own format.
    pub serial_number: Option<String>,
    /// Raw SAN text (`DNS:a.example, email:b@example`).
    pub subject_alt_names: Option<String>,
    /// Extended Key Usage OIDs in certificate order.
    pub ext_key_usage: Option<Vec<String>>,
    /// Proxy-reported days until expiry.
    pub days_remaining: Option<i64>,
}

/// A presented client certificate in canonical form. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    subject: NameMap,
    issuer: NameMap,
    valid_from: Option<DateTime>,
    valid_to: Option<DateTime>,
    serial_number: Option<String>,
    fingerprint_sha1: String,
    fingerprint_sha256: String,
    subject_alt_names: Option<String>,
    ext_key_usage: Option<Vec<String>>,
    days_remaining: Option<i64>,
    raw_pem: String,
    verification: SourceVerification,
}

impl CertificateRecord {
    /// Build a record. Fingerprints are computed here from `der`.
    pub fn new(
        fields: RecordFields,
        der: &[u8],
        raw_pem: String,
        verification: SourceVerification,
    ) -> Self {
        CertificateRecord {
            subject: fields.subject,
            issuer: fields.issuer,
            valid_from: fields.valid_from,
            valid_to: fields.valid_to,
            serial_number: fields.serial_number,
            fingerprint_sha1: fingerprint::sha1_fingerprint(der),
            fingerprint_sha256: fingerprint::sha256_fingerprint(der),
            subject_alt_names: fields.subject_alt_names,
            ext_key_usage: fields.ext_key_usage,
            days_remaining: fields.days_remaining,
            raw_pem,
            verification,
        }
    }

    pub fn subject(&self) -> &NameMap {
        &self.subject
    }

    pub fn issuer(&self) -> &NameMap {
        &self.issuer
    }

    /// Issuer Common Name, the key into the known-issuer registry.
    pub fn issuer_common_name(&self) -> Option<&str> {
        self.issuer.get("CN").map(String::as_str)
    }

    pub fn valid_from(&self) -> Option<&DateTime> {
        self.valid_from.as_ref()
    }

    pub fn valid_to(&self) -> Option<&DateTime> {
        self.valid_to.as_ref()
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    pub fn fingerprint_sha1(&self) -> &str {
        &self.fingerprint_sha1
    }

    pub fn fingerprint_sha256(&self) -> &str {
        &self.fingerprint_sha256
    }

    pub fn subject_alt_names(&self) -> Option<&str> {
        self.subject_alt_names.as_deref()
    }

    pub fn ext_key_usage(&self) -> Option<&[String]> {
        self.ext_key_usage.as_deref()
    }

    pub fn days_remaining(&self) -> Option<i64> {
        self.days_remaining
    }

    pub fn raw_pem(&self) -> &str {
        &self.raw_pem
    }

    pub fn verification(&self) -> &SourceVerification {
        &self.verification
    }

    pub fn status(&self) -> SourceStatus {
        match self.verification {
            SourceVerification::Valid => SourceStatus::Valid,
            SourceVerification::Invalid { .. } => SourceStatus::Invalid,
        }
    }
}

/// Result of asking a certificate source for the client certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateOutcome {
    /// No certificate was presented. Not a failure.
    Missing,
    /// Input from the transport/proxy could not be parsed.
    Error { message: String },
    /// A certificate was presented and parsed.
    Presented(Box<CertificateRecord>),
}

impl CertificateOutcome {
    pub fn status(&self) -> SourceStatus {
        match self {
            CertificateOutcome::Missing => SourceStatus::Missing,
            CertificateOutcome::Error { .. } => SourceStatus::Error,
            CertificateOutcome::Presented(record) => record.status(),
        }
    }

    pub fn record(&self) -> Option<&CertificateRecord> {
        match self {
            CertificateOutcome::Presented(record) => Some(record),
            _ => None,
        }
    }
}

/// JSON body of `GET /api/certificate`.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateResponse {
    pub status: SourceStatus,
    #[serde(rename = "authorizationError", skip_serializing_if = "Option::is_none")]
    pub authorization_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The `certificate` object of a [`CertificateResponse`].
#[derive(Debug, Clone, Serialize)]
pub struct CertificateView {
    pub subject: NameMap,
    pub issuer: NameMap,
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
    #[serde(rename = "serialNumber")]
    pub serial_number: Option<String>,
    pub fingerprint: String,
    pub fingerprint256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjectaltname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext_key_usage: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<i64>,
    pub raw: String,
}

impl From<&CertificateRecord> for CertificateView {
    fn from(record: &CertificateRecord) -> Self {
        CertificateView {
            subject: record.subject.clone(),
            issuer: record.issuer.clone(),
            valid_from: record.valid_from.as_ref().map(DateTime::to_openssl),
            valid_to: record.valid_to.as_ref().map(DateTime::to_openssl),
            serial_number: record.serial_number.clone(),
            fingerprint: record.fingerprint_sha1.clone(),
            fingerprint256: record.fingerprint_sha256.clone(),
            subjectaltname: record.subject_alt_names.clone(),
            ext_key_usage: record.ext_key_usage.clone(),
            days_remaining: record.days_remaining,
            raw: record.raw_pem.clone(),
        }
    }
}

impl From<&CertificateOutcome> for CertificateResponse {
    fn from(outcome: &CertificateOutcome) -> Self {
        match outcome {
            CertificateOutcome::Missing => CertificateResponse {
                status: SourceStatus::Missing,
                authorization_error: None,
                certificate: None,
                error: None,
            },
            CertificateOutcome::Error { message } => CertificateResponse {
                status: SourceStatus::Error,
                authorization_error: None,
                certificate: None,
                error: Some(message.clone()),
            },
            CertificateOutcome::Presented(record) => {
                let authorization_error = match &record.verification {
                    SourceVerification::Valid => None,
                    SourceVerification::Invalid {
                        authorization_error,
                    } => authorization_error.clone(),
                };
                CertificateResponse {
                    status: record.status(),
                    authorization_error,
                    certificate: Some(CertificateView::from(record.as_ref())),
                    error: None,
                }
            }
        }
    }
}

/// A CA certificate supplied for one validation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaFile {
    /// Display name (usually the uploaded file name).
    pub name: String,
    /// PEM text.
    pub pem: String,
}

impl AsRef<str> for CaFile {
    fn as_ref(&self) -> &str {
        &self.pem
    }
}

/// Machine-readable reason attached to a failed [`ValidationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnosis {
    /// The root that issued the supplied intermediate is missing.
    RootMissing,
    /// The intermediate that issued the certificate is missing.
    IntermediateMissing,
    /// Some issuer in the chain is missing; the verifier did not say which.
    ChainIncomplete,
    /// The certificate is self-signed and not among the supplied CAs.
    SelfSigned,
    /// No CA bundle could be located for the issuer.
    CaNotFound,
    /// The verifier did not finish within its time bound.
    Timeout,
    /// Any other verifier failure.
    Other,
}

/// Outcome of one chain validation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Raw verifier output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// File name of the CA bundle used by the known-issuer path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<Diagnosis>,
}

impl ValidationResult {
    pub fn verified(message: impl Into<String>) -> Self {
        ValidationResult {
            valid: true,
            message: Some(message.into()),
            error: None,
            details: None,
            ca_file: None,
            diagnosis: None,
        }
    }

    pub fn failed(diagnosis: Diagnosis, error: impl Into<String>) -> Self {
        ValidationResult {
            valid: false,
            message: None,
            error: Some(error.into()),
            details: None,
            ca_file: None,
            diagnosis: Some(diagnosis),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_ca_file(mut self, ca_file: impl Into<String>) -> Self {
        self.ca_file = Some(ca_file.into());
        self
    }
}
