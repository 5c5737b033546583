//! Forwarding to the single upstream collector.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the upstream (path and query joined)
//! - Strip hop-by-hop headers in both directions
//! - Append the transport peer to X-Forwarded-For
//! - Stream bodies through without buffering
//! - Speak TLS to `https` upstreams (webpki roots)
//!
//! A single attempt is made per request; failures surface as [`UpstreamError`].

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{
        uri::{Authority, InvalidUri, InvalidUriParts, PathAndQuery, Scheme},
        HeaderValue, Request, Uri, Version,
    },
    response::Response,
};
use futures_util::future::BoxFuture;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use url::Url;

use crate::http::response::strip_hop_by_hop;
use crate::identity::client_ip::X_FORWARDED_FOR;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure while forwarding a request.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream uri: {0}")]
    Uri(#[from] InvalidUriParts),

    #[error("upstream connection failed: {0}")]
    Connect(#[source] BoxError),

    #[error("upstream protocol error: {0}")]
    Protocol(#[source] BoxError),
}

impl From<hyper_util::client::legacy::Error> for UpstreamError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        if err.is_connect() {
            UpstreamError::Connect(Box::new(err))
        } else {
            UpstreamError::Protocol(Box::new(err))
        }
    }
}

/// The "forward to upstream" capability the pipeline drives.
pub trait Upstream: Send + Sync {
    fn forward(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response, UpstreamError>>;
}

/// Where requests go: scheme and authority, plus an optional path/query prefix.
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
    base_query: Option<String>,
}

/// Error building an [`UpstreamTarget`] from a URL string.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error("upstream url has no host")]
    MissingHost,

    #[error("unsupported upstream scheme `{0}`")]
    Scheme(String),

    #[error(transparent)]
    Authority(#[from] InvalidUri),
}

impl UpstreamTarget {
    pub fn parse(raw: &str) -> Result<Self, TargetError> {
        let url = Url::parse(raw)?;
        let host = url.host_str().ok_or(TargetError::MissingHost)?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let scheme = match url.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            other => return Err(TargetError::Scheme(other.to_string())),
        };

        Ok(Self {
            scheme,
            authority: authority.parse()?,
            base_path: url.path().to_string(),
            base_query: url.query().map(str::to_string),
        })
    }

    /// Map an inbound URI onto the upstream.
    pub fn rewrite(&self, original: &Uri) -> Result<Uri, UpstreamError> {
        let path = join_paths(&self.base_path, original.path());
        let query = match (self.base_query.as_deref(), original.query()) {
            (Some(base), Some(q)) if !base.is_empty() && !q.is_empty() => {
                Some(format!("{}&{}", base, q))
            }
            (Some(base), Some(q)) => Some(format!("{}{}", base, q)),
            (Some(base), None) => Some(base.to_string()),
            (None, Some(q)) => Some(q.to_string()),
            (None, None) => None,
        };
        let path_and_query = match query {
            Some(q) => format!("{}?{}", path, q),
            None => path,
        };

        let mut parts = axum::http::uri::Parts::default();
        parts.scheme = Some(self.scheme.clone());
        parts.authority = Some(self.authority.clone());
        parts.path_and_query = PathAndQuery::try_from(path_and_query).ok();
        Ok(Uri::from_parts(parts)?)
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }
}

/// Join with exactly one slash between the two halves.
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

/// Upstream reached over HTTP/1.1, plain or TLS, with hyper's pooled client.
#[derive(Clone)]
pub struct HttpUpstream {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    target: UpstreamTarget,
}

impl HttpUpstream {
    pub fn new(target: UpstreamTarget, pool_idle_timeout: Duration) -> Self {
        // Err only means a provider is already installed.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(pool_idle_timeout)
            .build(connector);
        Self { client, target }
    }

    fn prepare(&self, mut request: Request<Body>) -> Result<Request<Body>, UpstreamError> {
        let peer_ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        *request.uri_mut() = self.target.rewrite(request.uri())?;
        *request.version_mut() = Version::HTTP_11;

        let headers = request.headers_mut();
        strip_hop_by_hop(headers);

        if let Some(ip) = peer_ip {
            let prior: Vec<String> = headers
                .get_all(X_FORWARDED_FOR)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .map(str::to_string)
                .collect();
            let chain = if prior.is_empty() {
                ip.to_string()
            } else {
                format!("{}, {}", prior.join(", "), ip)
            };
            if let Ok(value) = HeaderValue::from_str(&chain) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }

        Ok(request)
    }
}

impl Upstream for HttpUpstream {
    fn forward(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response, UpstreamError>> {
        Box::pin(async move {
            let request = self.prepare(request)?;
            let response = self.client.request(request).await?;

            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Ok(Response::from_parts(parts, Body::new(body)))
        })
    }
}

impl std::fmt::Debug for HttpUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpUpstream")
            .field("target", &self.target)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(raw: &str) -> UpstreamTarget {
        UpstreamTarget::parse(raw).unwrap()
    }

    #[test]
    fn rewrites_onto_bare_host() {
        let t = target("http://sgtm:8080");
        let uri: Uri = "/g/collect?v=2&tid=G-1".parse().unwrap();
        assert_eq!(
            t.rewrite(&uri).unwrap().to_string(),
            "http://sgtm:8080/g/collect?v=2&tid=G-1"
        );
    }

    #[test]
    fn https_target_keeps_scheme() {
        let t = target("https://sgtm.example.com/tagging?x=1");
        assert_eq!(t.scheme(), &Scheme::HTTPS);
        assert_eq!(t.authority().as_str(), "sgtm.example.com");

        let uri: Uri = "/g/collect?v=2".parse().unwrap();
        assert_eq!(
            t.rewrite(&uri).unwrap().to_string(),
            "https://sgtm.example.com/tagging/g/collect?x=1&v=2"
        );

        let t = target("https://sgtm.example.com:443");
        assert_eq!(t.authority().as_str(), "sgtm.example.com");
        let t = target("https://sgtm.example.com:8443");
        assert_eq!(t.authority().as_str(), "sgtm.example.com:8443");
    }

    #[test]
    fn other_schemes_are_rejected() {
        for raw in ["ftp://collector", "ws://collector"] {
            assert!(
                matches!(UpstreamTarget::parse(raw), Err(TargetError::Scheme(_))),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn joins_base_path_and_query() {
        let t = target("http://collector/base/?key=abc");
        let uri: Uri = "/collect?v=2".parse().unwrap();
        assert_eq!(
            t.rewrite(&uri).unwrap().to_string(),
            "http://collector/base/collect?key=abc&v=2"
        );

        let t = target("http://collector/base");
        let uri: Uri = "/collect".parse().unwrap();
        assert_eq!(t.rewrite(&uri).unwrap().to_string(), "http://collector/base/collect");
    }

    #[test]
    fn join_paths_single_slash() {
        assert_eq!(join_paths("/a/", "/b"), "/a/b");
        assert_eq!(join_paths("/a", "b"), "/a/b");
        assert_eq!(join_paths("/a", "/b"), "/a/b");
        assert_eq!(join_paths("/", "/"), "/");
    }

    #[test]
    fn default_port_is_omitted() {
        let t = target("http://collector:80");
        assert_eq!(t.authority().as_str(), "collector");
    }

    #[test]
    fn prepare_sets_forwarded_for_and_strips_hop_headers() {
        let upstream = HttpUpstream::new(target("http://127.0.0.1:9"), Duration::from_secs(1));
        let mut request = Request::builder()
            .uri("/collect")
            .header("host", "tags.example.com")
            .header("x-forwarded-for", "1.2.3.4")
            .header("connection", "keep-alive")
            .header("keep-alive", "timeout=5")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo("10.0.0.7:4444".parse::<SocketAddr>().unwrap()));

        let prepared = upstream.prepare(request).unwrap();

        assert_eq!(prepared.uri().to_string(), "http://127.0.0.1:9/collect");
        assert_eq!(prepared.headers()["x-forwarded-for"], "1.2.3.4, 10.0.0.7");
        assert_eq!(prepared.headers()["host"], "tags.example.com");
        assert!(prepared.headers().get("connection").is_none());
        assert!(prepared.headers().get("keep-alive").is_none());
    }

    #[tokio::test]
    async fn unreachable_upstream_is_connect_error() {
        // Port 9 (discard) on localhost is not expected to be listening.
        let upstream = HttpUpstream::new(target("http://127.0.0.1:9"), Duration::from_secs(1));
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        let err = upstream.forward(request).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Connect(_)));
    }
}
