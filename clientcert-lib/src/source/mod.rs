//! Where a client certificate comes from.
//!
//! A deployment either terminates TLS itself ([`DirectTlsSource`]) or sits
//! behind a TLS-terminating reverse proxy that forwards the certificate in
//! headers ([`ProxyHeaderSource`]). The choice is made once at startup; both
//! produce the same [`CertificateOutcome`].

mod direct;
mod proxy;

pub use direct::{DirectTlsSource, PeerCertificate};
pub use proxy::{ProxyHeaderSource, ProxyHeaders, DEFAULT_HEADER_PREFIX, PROXY_AUTHORIZATION_ERROR};

use crate::fields::CertificateOutcome;
use http::HeaderMap;

/// What a source may look at for one request.
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    pub headers: &'a HeaderMap,
    /// Peer certificate of the connection the request arrived on, when the
    /// service terminated TLS itself and the client sent one.
    pub peer: Option<&'a PeerCertificate>,
}

/// The configured certificate source.
#[derive(Debug, Clone)]
pub enum CertificateSource {
    DirectTls(DirectTlsSource),
    ProxyHeaders(ProxyHeaderSource),
}

impl CertificateSource {
    /// Read the client certificate for one request. Never fails; malformed
    /// input becomes [`CertificateOutcome::Error`].
    pub fn extract(&self, request: &InboundRequest<'_>) -> CertificateOutcome {
        match self {
            CertificateSource::DirectTls(source) => source.extract(request.peer),
            CertificateSource::ProxyHeaders(source) => source.extract(request.headers),
        }
    }

    /// Short name for logs and `/api/server-info`.
    pub fn mode(&self) -> &'static str {
        match self {
            CertificateSource::DirectTls(_) => "direct-tls",
            CertificateSource::ProxyHeaders(_) => "proxy",
        }
    }
}
