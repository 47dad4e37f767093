#![no_main]

use clientcert_lib::{parse_cert, CertificateResponse, PeerCertificate, DirectTlsSource};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // A client may send any bytes as its certificate; reporting it must
    // never panic.
    let peer = PeerCertificate {
        chain: vec![data.to_vec()],
        authorized: false,
        authorization_error: None,
    };
    let outcome = DirectTlsSource::new().extract(Some(&peer));
    let _ = CertificateResponse::from(&outcome);

    if let Ok(cert) = parse_cert(data) {
        let pem = cert.to_pem();
        let _ = cert.is_self_issued();
        let _ = clientcert_lib::pem_to_der(pem.as_bytes());
    }
});
