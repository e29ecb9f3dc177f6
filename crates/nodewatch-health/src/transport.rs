//! HTTP transport used by probes and metadata fetches.
//!
//! The [`Transport`] trait is the seam between request building and the
//! network. [`HyperTransport`] opens one HTTP/1.1 connection per request
//! over plain TCP or rustls, which matches the one-shot nature of probes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::TransportError;

const USER_AGENT: &str = concat!("nodewatch/", env!("CARGO_PKG_VERSION"));

/// Boxed future returned by [`Transport::execute`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>>;

/// Performs a single HTTP request. No retries, no timeout; callers bound it.
pub trait Transport: Send + Sync {
    fn execute(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// An outgoing request with an absolute URL.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: http::Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn post(url: impl Into<String>, body: Bytes) -> Self {
        Self {
            method: http::Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: http::StatusCode,
    pub body: Bytes,
}

/// Scheme, address and request target extracted from a URL.
struct Target {
    tls: bool,
    host: String,
    port: u16,
    authority: String,
    path: String,
}

impl Target {
    fn parse(url: &str) -> Result<Self, TransportError> {
        let invalid = |reason: &str| TransportError::InvalidEndpoint {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let uri: http::Uri = url.parse().map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
        let tls = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            Some(other) => return Err(invalid(&format!("unsupported scheme {other}"))),
            None => return Err(invalid("missing scheme")),
        };
        let authority = uri.authority().ok_or_else(|| invalid("missing host"))?;
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = authority.port_u16().unwrap_or(if tls { 443 } else { 80 });
        let path = uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Ok(Self {
            tls,
            host,
            port,
            authority: authority.as_str().to_string(),
            path,
        })
    }
}

/// HTTP/1.1 client over TCP, with TLS for `https` URLs.
#[derive(Clone)]
pub struct HyperTransport {
    connector: TlsConnector,
}

impl HyperTransport {
    /// Build a transport trusting the Mozilla root certificate store.
    pub fn new() -> Result<Self, TransportError> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Tls(format!("tls protocol version error: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self::with_tls_config(Arc::new(config)))
    }

    /// Build a transport from a pre-configured rustls client config.
    pub fn with_tls_config(config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            connector: TlsConnector::from(config),
        }
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let target = Target::parse(&request.url)?;

        let mut builder = http::Request::builder()
            .method(request.method)
            .uri(target.path.as_str())
            .header("host", target.authority.as_str())
            .header("user-agent", USER_AGENT);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }
        let req = builder
            .body(Full::new(request.body))
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let stream = TcpStream::connect((target.host.as_str(), target.port))
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if target.tls {
            let server_name = rustls::pki_types::ServerName::try_from(target.host.clone())
                .map_err(|e| TransportError::InvalidEndpoint {
                    url: request.url.clone(),
                    reason: e.to_string(),
                })?;
            let tls_stream = self
                .connector
                .connect(server_name, stream)
                .await
                .map_err(|e| TransportError::Tls(e.to_string()))?;
            exchange(TokioIo::new(tls_stream), req, &request.url).await
        } else {
            exchange(TokioIo::new(stream), req, &request.url).await
        }
    }
}

impl Transport for HyperTransport {
    fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
        Box::pin(self.send(request))
    }
}

/// Run one request over an established connection and buffer the response.
async fn exchange<S>(
    io: TokioIo<S>,
    req: http::Request<Full<Bytes>>,
    url: &str,
) -> Result<HttpResponse, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| TransportError::Http(e.to_string()))?;

    // Drive the connection in the background.
    let url_owned = url.to_string();
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, url = %url_owned, "connection closed with error");
        }
    });

    let response = sender
        .send_request(req)
        .await
        .map_err(|e| TransportError::Http(e.to_string()))?;
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| TransportError::Http(e.to_string()))?
        .to_bytes();

    debug!(%url, %status, bytes = body.len(), "http exchange complete");
    Ok(HttpResponse { status, body })
}
