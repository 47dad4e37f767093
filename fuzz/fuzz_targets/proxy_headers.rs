#![no_main]

use clientcert_lib::{CertificateResponse, ProxyHeaderSource, SourceStatus};
use http::{HeaderMap, HeaderValue};
use libfuzzer_sys::fuzz_target;

const HEADERS: [&str; 9] = [
    "x-ssl-client-cert",
    "x-ssl-client-verify",
    "x-ssl-client-subject-dn",
    "x-ssl-client-issuer-dn",
    "x-ssl-client-serial",
    "x-ssl-client-fingerprint",
    "x-ssl-client-start-date",
    "x-ssl-client-end-date",
    "x-ssl-client-days-remaining",
];

fuzz_target!(|data: &[u8]| {
    // Split the input on NUL bytes, one chunk per forwarded header.
    let mut headers = HeaderMap::new();
    for (name, chunk) in HEADERS.iter().zip(data.split(|b| *b == 0)) {
        if let Ok(value) = HeaderValue::from_bytes(chunk) {
            headers.insert(*name, value);
        }
    }

    let outcome = ProxyHeaderSource::default().extract(&headers);
    assert_ne!(outcome.status(), SourceStatus::Valid);
    let _ = CertificateResponse::from(&outcome);
});
