//! TLS termination for direct mode.
//!
//! Browsers are asked for a client certificate but never refused because of
//! it. The handshake accepts whatever the client sends; afterwards each
//! connection's chain is checked against the client-CA trust store and the
//! verdict travels with every request on that connection as a
//! [`PeerCertificate`] extension.

use anyhow::{anyhow, Context, Result};
use axum::Router;
use clientcert_lib::PeerCertificate;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::WebPkiClientVerifier;
use rustls::{
    CertificateError, DigitallySignedStruct, DistinguishedName, RootCertStore, ServerConfig,
    SignatureScheme,
};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open certificate file: {}", path.display()))?;
    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read certificates: {}", path.display()))?;
    if certs.is_empty() {
        anyhow::bail!("No certificates found in {}", path.display());
    }
    Ok(certs)
}

pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open key file: {}", path.display()))?;
    rustls_pemfile::private_key(&mut std::io::BufReader::new(file))
        .with_context(|| format!("Failed to read private key: {}", path.display()))?
        .ok_or_else(|| anyhow!("No private key found in {}", path.display()))
}

/// Checks a client's chain against the configured client-CA trust store.
#[derive(Debug, Clone)]
pub struct ClientAuthorizer {
    inner: Arc<dyn ClientCertVerifier>,
}

impl ClientAuthorizer {
    pub fn new(roots: RootCertStore) -> Result<Self> {
        let inner = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider())
            .allow_unauthenticated()
            .build()
            .context("Failed to build client certificate verifier")?;
        Ok(ClientAuthorizer { inner })
    }

    pub fn from_bundle(path: &Path) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(load_certs(path)?);
        tracing::info!(
            bundle = %path.display(),
            added,
            ignored,
            "loaded client CA trust store"
        );
        Self::new(roots)
    }

    /// Verdict for the chain a client sent, leaf first.
    pub fn authorize(&self, chain: &[CertificateDer<'_>]) -> Option<PeerCertificate> {
        let (leaf, intermediates) = chain.split_first()?;
        let verdict = self
            .inner
            .verify_client_cert(leaf, intermediates, UnixTime::now());
        let authorization_error = verdict.err().map(|e| authorization_error_name(&e));
        Some(PeerCertificate {
            chain: chain.iter().map(|c| c.as_ref().to_vec()).collect(),
            authorized: authorization_error.is_none(),
            authorization_error,
        })
    }

    fn tolerant(&self) -> Arc<dyn ClientCertVerifier> {
        Arc::new(TolerantClientVerifier {
            inner: Arc::clone(&self.inner),
        })
    }
}

/// OpenSSL-style name for a rustls verification error, falling back to
/// the error text.
pub fn authorization_error_name(error: &rustls::Error) -> String {
    let name = match error {
        rustls::Error::InvalidCertificate(cert_error) => match cert_error {
            CertificateError::UnknownIssuer => Some("UNABLE_TO_GET_ISSUER_CERT_LOCALLY"),
            CertificateError::Expired | CertificateError::ExpiredContext { .. } => {
                Some("CERT_HAS_EXPIRED")
            }
            CertificateError::NotValidYet | CertificateError::NotValidYetContext { .. } => {
                Some("CERT_NOT_YET_VALID")
            }
            CertificateError::BadSignature => Some("CERT_SIGNATURE_FAILURE"),
            _ => None,
        },
        _ => None,
    };
    name.map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

/// Requests a client certificate and accepts any. Handshake signatures are
/// still checked so the client must hold the key of the certificate it sent.
#[derive(Debug)]
struct TolerantClientVerifier {
    inner: Arc<dyn ClientCertVerifier>,
}

impl ClientCertVerifier for TolerantClientVerifier {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    // No hints: the browser should offer every installed certificate, not
    // only those issued by the trusted CAs.
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

pub fn server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    authorizer: &ClientAuthorizer,
) -> Result<Arc<ServerConfig>> {
    let mut config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .context("Failed to select TLS protocol versions")?
        .with_client_cert_verifier(authorizer.tolerant())
        .with_single_cert(certs, key)
        .context("Failed to set server certificate")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// Accept TLS connections until `shutdown` resolves, serving `app` on each.
pub async fn serve(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    authorizer: ClientAuthorizer,
    app: Router,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let acceptor = TlsAcceptor::from(config);
    tokio::pin!(shutdown);

    loop {
        let (stream, remote) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept connection");
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        let acceptor = acceptor.clone();
        let authorizer = authorizer.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let tls = match acceptor.accept(stream).await {
                Ok(tls) => tls,
                Err(e) => {
                    tracing::debug!(%remote, error = %e, "TLS handshake failed");
                    return;
                }
            };

            let peer = tls
                .get_ref()
                .1
                .peer_certificates()
                .and_then(|chain| authorizer.authorize(chain));
            match &peer {
                Some(p) => tracing::debug!(
                    %remote,
                    authorized = p.authorized,
                    error = p.authorization_error.as_deref(),
                    "client certificate presented"
                ),
                None => tracing::debug!(%remote, "no client certificate presented"),
            }

            let service = hyper::service::service_fn(move |mut request: http::Request<Incoming>| {
                if let Some(peer) = &peer {
                    request.extensions_mut().insert(peer.clone());
                }
                app.clone().oneshot(request)
            });
            if let Err(e) = auto::Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(tls), service)
                .await
            {
                tracing::debug!(%remote, error = %e, "connection closed with error");
            }
        });
    }

    Ok(())
}
