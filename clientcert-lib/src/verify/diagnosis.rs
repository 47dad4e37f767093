//! Turning raw verifier output into actionable guidance.
//!
//! This is string matching against whatever the verifier printed and is
//! only as good as the wording it recognizes. Rules are tried in order and
//! the first rule with a matching pattern wins; inside a rule, refinements
//! are tried in order before falling back to the rule's own diagnosis.
//! Matching is case-sensitive.

use crate::fields::{Diagnosis, ValidationResult};

struct Rule {
    patterns: &'static [&'static str],
    refinements: &'static [(&'static str, Diagnosis)],
    fallback: Diagnosis,
}

const RULES: &[Rule] = &[
    Rule {
        patterns: &[
            "unable to get issuer certificate",
            "unable to get local issuer certificate",
        ],
        refinements: &[
            ("error 2 at 1 depth", Diagnosis::RootMissing),
            ("error 20 at 0 depth", Diagnosis::IntermediateMissing),
        ],
        fallback: Diagnosis::ChainIncomplete,
    },
    Rule {
        patterns: &["self signed certificate", "self-signed certificate"],
        refinements: &[],
        fallback: Diagnosis::SelfSigned,
    },
];

/// Classify a failed verification's output.
pub fn classify(output: &str) -> Diagnosis {
    for rule in RULES {
        if !rule.patterns.iter().any(|p| output.contains(p)) {
            continue;
        }
        return rule
            .refinements
            .iter()
            .find(|(pattern, _)| output.contains(pattern))
            .map(|(_, diagnosis)| *diagnosis)
            .unwrap_or(rule.fallback);
    }
    Diagnosis::Other
}

/// Remediation text shown for a diagnosis. `Other` has none; its verifier
/// error is passed through instead.
pub fn guidance(diagnosis: Diagnosis) -> Option<&'static str> {
    match diagnosis {
        Diagnosis::RootMissing => Some(
            "Certificate chain is incomplete: missing the Root CA certificate that issued your intermediate CA",
        ),
        Diagnosis::IntermediateMissing => Some(
            "Certificate chain is incomplete: missing the Intermediate CA certificate that issued your certificate",
        ),
        Diagnosis::ChainIncomplete => Some(
            "Certificate chain is incomplete: missing one or more Intermediate CA certificates in the certificate chain",
        ),
        Diagnosis::SelfSigned => {
            Some("The certificate is self-signed and cannot be verified against a CA")
        }
        Diagnosis::CaNotFound => {
            Some("CA certificate needs to be added to the system for validation")
        }
        Diagnosis::Timeout | Diagnosis::Other => None,
    }
}

const CHAIN_HINT: &str = "Make sure to upload the complete certificate chain";

const GENERIC_FAILURE: &str =
    "The certificate could not be verified against the provided CA certificates";

/// Build the failed [`ValidationResult`] for raw verifier output.
pub fn failure_result(output: &str) -> ValidationResult {
    let diagnosis = classify(output);
    let error = match guidance(diagnosis) {
        Some(text) => text.to_string(),
        None => verifier_error_line(output).unwrap_or(GENERIC_FAILURE).to_string(),
    };

    let result = ValidationResult::failed(diagnosis, error).with_details(output);
    match diagnosis {
        Diagnosis::RootMissing | Diagnosis::IntermediateMissing | Diagnosis::ChainIncomplete => {
            result.with_message(CHAIN_HINT)
        }
        _ => result,
    }
}

/// The verifier's own error line, or its whole trimmed output when no line
/// starts with `error`.
fn verifier_error_line(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("error"))
        .or_else(|| Some(output.trim()).filter(|t| !t.is_empty()))
}
