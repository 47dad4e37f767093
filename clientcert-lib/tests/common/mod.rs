//! Certificate fixtures generated at test time.

#![allow(dead_code, unused_macros)]

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, SanType,
};

pub struct Issued {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl Issued {
    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    pub fn der(&self) -> Vec<u8> {
        self.cert.der().to_vec()
    }
}

/// Root → intermediate → client leaf.
pub struct Pki {
    pub root: Issued,
    pub intermediate: Issued,
    pub leaf: Issued,
}

impl Pki {
    pub fn chain_bundle(&self) -> String {
        format!("{}\n{}", self.intermediate.pem(), self.root.pem())
    }
}

fn named(cn: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, "CZ");
    dn.push(DnType::OrganizationName, "Test PKI");
    dn.push(DnType::CommonName, cn);
    dn
}

fn ca_params(cn: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name = named(cn);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
}

fn client_params(cn: &str) -> CertificateParams {
    let mut params = CertificateParams::new(vec!["client.example".to_string()]).unwrap();
    params
        .subject_alt_names
        .push(SanType::IpAddress("10.0.0.1".parse().unwrap()));
    params.distinguished_name = named(cn);
    params.is_ca = IsCa::NoCa;
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ClientAuth,
        ExtendedKeyUsagePurpose::EmailProtection,
    ];
    params
}

pub fn root(cn: &str) -> Issued {
    let key = KeyPair::generate().unwrap();
    let cert = ca_params(cn).self_signed(&key).unwrap();
    Issued { cert, key }
}

pub fn intermediate(cn: &str, issuer: &Issued) -> Issued {
    let key = KeyPair::generate().unwrap();
    let cert = ca_params(cn)
        .signed_by(&key, &issuer.cert, &issuer.key)
        .unwrap();
    Issued { cert, key }
}

pub fn client(cn: &str, issuer: &Issued) -> Issued {
    let key = KeyPair::generate().unwrap();
    let cert = client_params(cn)
        .signed_by(&key, &issuer.cert, &issuer.key)
        .unwrap();
    Issued { cert, key }
}

pub fn self_signed_client(cn: &str) -> Issued {
    let key = KeyPair::generate().unwrap();
    let cert = client_params(cn).self_signed(&key).unwrap();
    Issued { cert, key }
}

pub fn pki() -> Pki {
    let root = root("Test Root CA");
    let intermediate = intermediate("Test Intermediate CA", &root);
    let leaf = client("Jane Doe", &intermediate);
    Pki {
        root,
        intermediate,
        leaf,
    }
}

/// Strip PEM armor and line breaks, leaving bare base64.
pub fn bare_base64(pem: &str) -> String {
    pem.lines()
        .filter(|line| !line.starts_with("-----"))
        .collect::<String>()
}

pub fn openssl_available() -> bool {
    std::process::Command::new("openssl")
        .arg("version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Skip the current test when the openssl executable is not installed.
macro_rules! require_openssl {
    () => {
        if !common::openssl_available() {
            eprintln!("Skipping: openssl executable not found on PATH");
            return;
        }
    };
}
