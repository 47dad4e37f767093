//! Known issuers and the bundled CA files that cover them.

/// One registry entry: issuer CNs containing `pattern` are checked against
/// the CA file `file_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownIssuer {
    pub pattern: String,
    pub file_name: String,
}

impl KnownIssuer {
    pub fn new(pattern: impl Into<String>, file_name: impl Into<String>) -> Self {
        KnownIssuer {
            pattern: pattern.into(),
            file_name: file_name.into(),
        }
    }
}

/// Built-in entries, in lookup order.
const BUILTIN: &[(&str, &str)] = &[
    ("PostSignum Qualified CA 4", "postsignum-qualified-ca4-chain.pem"),
    ("PostSignum Public CA 4", "postsignum-public-ca4-chain.pem"),
    ("PostSignum Root QCA 4", "postsignum-root-qca4.pem"),
    ("DigiCert Global Root CA", "digicert-global-root-ca.pem"),
    ("DigiCert Global Root G2", "digicert-global-root-g2.pem"),
    ("Let's Encrypt Authority X3", "lets-encrypt-x3.pem"),
    ("ISRG Root X1", "isrg-root-x1.pem"),
    ("GlobalSign Root CA", "globalsign-root-ca.pem"),
    ("GeoTrust Global CA", "geotrust-global-ca.pem"),
    ("Symantec Class 3 Secure Server CA", "symantec-class3-ca.pem"),
    (
        "VeriSign Class 3 Public Primary Certification Authority",
        "verisign-class3-ca.pem",
    ),
];

/// Ordered issuer-substring → CA file mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownIssuerRegistry {
    entries: Vec<KnownIssuer>,
}

impl KnownIssuerRegistry {
    pub fn new(entries: Vec<KnownIssuer>) -> Self {
        KnownIssuerRegistry { entries }
    }

    pub fn builtin() -> Self {
        Self::new(
            BUILTIN
                .iter()
                .map(|(pattern, file)| KnownIssuer::new(*pattern, *file))
                .collect(),
        )
    }

    /// CA file of the first entry whose pattern occurs in `issuer_cn`.
    pub fn resolve(&self, issuer_cn: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| issuer_cn.contains(entry.pattern.as_str()))
            .map(|entry| entry.file_name.as_str())
    }

    pub fn entries(&self) -> &[KnownIssuer] {
        &self.entries
    }
}

impl Default for KnownIssuerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_match() {
        let registry = KnownIssuerRegistry::builtin();
        assert_eq!(
            registry.resolve("PostSignum Qualified CA 4"),
            Some("postsignum-qualified-ca4-chain.pem")
        );
        assert_eq!(
            registry.resolve("Česká pošta PostSignum Public CA 4 (test)"),
            Some("postsignum-public-ca4-chain.pem")
        );
        assert_eq!(registry.resolve("Example Corp Issuing CA"), None);
        assert_eq!(registry.resolve(""), None);
    }

    #[test]
    fn first_declared_entry_wins() {
        let registry = KnownIssuerRegistry::new(vec![
            KnownIssuer::new("Root", "first.pem"),
            KnownIssuer::new("Example Root", "second.pem"),
        ]);
        assert_eq!(registry.resolve("Example Root CA"), Some("first.pem"));
    }

    #[test]
    fn builtin_order_is_stable() {
        let registry = KnownIssuerRegistry::builtin();
        assert_eq!(registry.entries().len(), BUILTIN.len());
        assert_eq!(
            registry.entries().first().map(|e| e.pattern.as_str()),
            Some("PostSignum Qualified CA 4")
        );
        // "DigiCert Global Root CA" does not occur in "...Root G2".
        assert_eq!(
            registry.resolve("DigiCert Global Root G2"),
            Some("digicert-global-root-g2.pem")
        );
    }
}
