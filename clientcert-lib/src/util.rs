//! Shared encoding utilities.

use base64::Engine;

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// Format bytes as colon-separated uppercase hex (e.g., "AB:CD:EF").
pub fn hex_colon_upper(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Encode bytes as base64 with PEM-style 64-character line wrapping.
pub fn base64_wrap(data: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    wrap_lines(&encoded)
}

fn wrap_lines(encoded: &str) -> String {
    encoded
        .as_bytes()
        .chunks(64)
        .filter_map(|c| std::str::from_utf8(c).ok())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether the input looks like PEM (begins with `-----BEGIN` after whitespace).
pub fn is_pem(input: &[u8]) -> bool {
    let start = input
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(input.len());
    input.get(start..).is_some_and(|rest| rest.starts_with(b"-----BEGIN"))
}

/// Make sure certificate text carries standard PEM armor.
///
/// Text that already contains a `BEGIN CERTIFICATE` line is returned as is.
/// Bare base64 (as delivered by some TLS stacks) has its whitespace stripped,
/// is re-wrapped at 64 columns and gets the delimiters added.
pub fn ensure_pem_armor(text: &str) -> String {
    if text.contains(PEM_BEGIN) {
        return text.to_string();
    }
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    format!("{}\n{}\n{}\n", PEM_BEGIN, wrap_lines(&compact), PEM_END)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hex_colon_pairs() {
        assert_eq!(hex_colon_upper(&[0xab, 0x01, 0xff]), "AB:01:FF");
        assert_eq!(hex_colon_upper(&[]), "");
    }

    #[test]
    fn armor_left_alone_when_present() {
        let pem = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n";
        assert_eq!(ensure_pem_armor(pem), pem);
    }

    #[test]
    fn armor_added_to_bare_base64() {
        let bare = "A".repeat(100);
        let wrapped = ensure_pem_armor(&bare);
        let lines: Vec<&str> = wrapped.lines().collect();
        assert_eq!(lines.first().copied(), Some(PEM_BEGIN));
        assert_eq!(lines.get(1).map(|l| l.len()), Some(64));
        assert_eq!(lines.get(2).map(|l| l.len()), Some(36));
        assert_eq!(lines.last().copied(), Some(PEM_END));
    }

    #[test]
    fn armor_strips_embedded_whitespace() {
        let wrapped = ensure_pem_armor("  QUJD\nREVG \r\n");
        assert!(wrapped.contains("\nQUJDREVG\n"));
    }

    #[test]
    fn pem_detection() {
        assert!(is_pem(b"\n  -----BEGIN CERTIFICATE-----"));
        assert!(!is_pem(&[0x30, 0x82, 0x01]));
        assert!(!is_pem(b""));
    }
}
