//! Certificate fingerprint (digest) computation.

use crate::util;
use digest::Digest;

/// Digest algorithm for fingerprint computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
}

/// Compute the fingerprint of raw certificate bytes.
///
/// Returns a colon-separated uppercase hex string (e.g., "AB:CD:EF:...").
/// Empty input yields an empty string rather than the digest of nothing:
/// there is no certificate to identify.
pub fn compute_fingerprint(bytes: &[u8], algorithm: DigestAlgorithm) -> String {
    if bytes.is_empty() {
        return String::new();
    }

    let hash_bytes: Vec<u8> = match algorithm {
        DigestAlgorithm::Sha1 => sha1::Sha1::digest(bytes).to_vec(),
        DigestAlgorithm::Sha256 => sha2::Sha256::digest(bytes).to_vec(),
    };

    util::hex_colon_upper(&hash_bytes)
}

/// SHA-1 fingerprint, 20 colon-separated byte pairs.
pub fn sha1_fingerprint(bytes: &[u8]) -> String {
    compute_fingerprint(bytes, DigestAlgorithm::Sha1)
}

/// SHA-256 fingerprint, 32 colon-separated byte pairs.
pub fn sha256_fingerprint(bytes: &[u8]) -> String {
    compute_fingerprint(bytes, DigestAlgorithm::Sha256)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_fingerprint(b"abc"),
            "BA:78:16:BF:8F:01:CF:EA:41:41:40:DE:5D:AE:22:23:\
             B0:03:61:A3:96:17:7A:9C:B4:10:FF:61:F2:00:15:AD"
        );
    }

    #[test]
    fn sha1_known_vector() {
        assert_eq!(
            sha1_fingerprint(b"abc"),
            "A9:99:3E:36:47:06:81:6A:BA:3E:25:71:78:50:C2:6C:9C:D0:D8:9D"
        );
    }

    #[test]
    fn sha256_shape_is_32_uppercase_pairs() {
        let fp = sha256_fingerprint(b"client certificate bytes");
        let pairs: Vec<&str> = fp.split(':').collect();
        assert_eq!(pairs.len(), 32);
        assert!(pairs
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())));
        assert_eq!(fp, sha256_fingerprint(b"client certificate bytes"));
    }

    #[test]
    fn empty_input_has_no_fingerprint() {
        assert_eq!(sha1_fingerprint(&[]), "");
        assert_eq!(sha256_fingerprint(&[]), "");
    }
}
