//! Service configuration: command-line flags with `CLIENTCERT_*`
//! environment fallbacks.

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use clientcert_lib::source::{ProxyHeaders, DEFAULT_HEADER_PREFIX};
use clientcert_lib::{
    verify::{DEFAULT_CA_DIR, DEFAULT_VERIFY_TIMEOUT},
    CertificateSource, ChainVerifier, DirectTlsSource, OpensslVerifier,
    ProxyHeaderSource, X509Verifier,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default request body limit for the validation endpoints (50 MiB).
pub const DEFAULT_MAX_BODY: usize = 50 * 1024 * 1024;

/// How client certificates reach the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Terminate TLS here and read the peer certificate of each connection
    Direct,
    /// Sit behind a TLS-terminating proxy that forwards the certificate in headers
    Proxy,
}

/// Chain-verification backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VerifierKind {
    /// Run `openssl verify`
    Openssl,
    /// Verify in-process
    X509,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Flags of the `serve` subcommand.
#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "CLIENTCERT_LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Where client certificates come from
    #[arg(long, env = "CLIENTCERT_MODE", value_enum, default_value_t = Mode::Proxy)]
    pub mode: Mode,

    /// Server certificate chain (PEM), direct mode only
    #[arg(long, env = "CLIENTCERT_TLS_CERT", required_if_eq("mode", "direct"))]
    pub tls_cert: Option<PathBuf>,

    /// Server private key (PEM), direct mode only
    #[arg(long, env = "CLIENTCERT_TLS_KEY", required_if_eq("mode", "direct"))]
    pub tls_key: Option<PathBuf>,

    /// CA bundle used to authorize client certificates during the handshake
    /// (default: system trust store)
    #[arg(long, env = "CLIENTCERT_CLIENT_CA")]
    pub client_ca: Option<PathBuf>,

    /// Prefix of the proxy-forwarded header set
    #[arg(long, env = "CLIENTCERT_HEADER_PREFIX", default_value = DEFAULT_HEADER_PREFIX)]
    pub header_prefix: String,

    /// Directory holding the bundled CA files of known issuers
    #[arg(long, env = "CLIENTCERT_CA_DIR", default_value = DEFAULT_CA_DIR)]
    pub ca_dir: PathBuf,

    /// Chain-verification backend
    #[arg(long, env = "CLIENTCERT_VERIFIER", value_enum, default_value_t = VerifierKind::Openssl)]
    pub verifier: VerifierKind,

    /// Path of the openssl executable
    #[arg(long, env = "CLIENTCERT_OPENSSL", default_value = "openssl")]
    pub openssl: PathBuf,

    /// Upper bound on one `openssl verify` run (e.g. 10s, 1m, or plain
    /// seconds; default 10s). Rejected with `--verifier x509`.
    #[arg(long, env = "CLIENTCERT_VERIFY_TIMEOUT", value_parser = crate::parse_duration)]
    pub verify_timeout: Option<Duration>,

    /// Directory for ephemeral PEM files (default: OS temp dir)
    #[arg(long, env = "CLIENTCERT_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Request body limit in bytes for the validation endpoints
    #[arg(long, env = "CLIENTCERT_MAX_BODY", default_value_t = DEFAULT_MAX_BODY)]
    pub max_body: usize,
}

impl ServeArgs {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn proxy_headers(&self) -> ProxyHeaders {
        ProxyHeaders::with_prefix(&self.header_prefix)
    }

    pub fn certificate_source(&self) -> CertificateSource {
        match self.mode {
            Mode::Direct => CertificateSource::DirectTls(DirectTlsSource::new()),
            Mode::Proxy => {
                CertificateSource::ProxyHeaders(ProxyHeaderSource::new(self.proxy_headers()))
            }
        }
    }

    pub fn chain_verifier(&self) -> Result<Arc<dyn ChainVerifier>> {
        let temp_dir = match self.verifier {
            VerifierKind::Openssl => {
                let temp_dir = self.temp_dir();
                std::fs::create_dir_all(&temp_dir).with_context(|| {
                    format!("Failed to create temp directory: {}", temp_dir.display())
                })?;
                Some(temp_dir)
            }
            VerifierKind::X509 => None,
        };
        build_verifier(self.verifier, &self.openssl, self.verify_timeout, temp_dir)
    }
}

/// Build the selected chain verifier. A timeout only bounds the external
/// `openssl` process; the in-process verifier refuses one.
pub fn build_verifier(
    kind: VerifierKind,
    openssl: &Path,
    timeout: Option<Duration>,
    temp_dir: Option<PathBuf>,
) -> Result<Arc<dyn ChainVerifier>> {
    let verifier: Arc<dyn ChainVerifier> = match kind {
        VerifierKind::Openssl => {
            let mut verifier = OpensslVerifier::new()
                .program(openssl)
                .timeout(timeout.unwrap_or(DEFAULT_VERIFY_TIMEOUT));
            if let Some(dir) = temp_dir {
                verifier = verifier.temp_dir(dir);
            }
            Arc::new(verifier)
        }
        VerifierKind::X509 => {
            if timeout.is_some() {
                bail!("--verify-timeout applies only to the openssl verifier");
            }
            Arc::new(X509Verifier::new())
        }
    };
    Ok(verifier)
}
