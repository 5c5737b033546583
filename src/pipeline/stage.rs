//! Stage contracts shared by every transformation.

use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;

use axum::{
    body::{Body, Bytes},
    extract::ConnectInfo,
    http::{header, Request},
    response::Response,
};

use crate::identity::client_ip;

/// Per-request facts computed once before any stage runs.
///
/// Both fields hold the raw header bytes; identity hashing uses them as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Resolved client IP. Not guaranteed to parse as an address.
    pub client_ip: Bytes,
    /// The `User-Agent` header, empty when absent.
    pub user_agent: Bytes,
}

impl RequestContext {
    pub fn new(client_ip: impl Into<Bytes>, user_agent: impl Into<Bytes>) -> Self {
        Self {
            client_ip: client_ip.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Client IP as text, for address parsing and logs.
    pub fn client_ip_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.client_ip)
    }

    /// User-Agent as text, for signature matching and logs.
    pub fn user_agent_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.user_agent)
    }

    /// Build the context from an inbound request. The transport peer is read
    /// from the `ConnectInfo` extension axum attaches.
    pub fn from_request(request: &Request<Body>) -> Self {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();

        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .map(|v| Bytes::copy_from_slice(v.as_bytes()))
            .unwrap_or_default();

        Self {
            client_ip: client_ip::resolve(request.headers(), &peer),
            user_agent,
        }
    }
}

/// What a request stage decided.
#[derive(Debug)]
pub enum StageOutcome {
    /// Hand the (possibly mutated) request to the next stage.
    Continue,
    /// Stop here and answer the client with this response.
    Respond(Response),
}

/// A transformation applied to the request before it is forwarded.
pub trait RequestStage: Send + Sync + fmt::Debug {
    /// Stage identifier for logging/metrics.
    fn name(&self) -> &'static str;

    /// Inspect and optionally mutate the outbound request.
    fn on_request(&self, ctx: &RequestContext, request: &mut Request<Body>) -> StageOutcome;
}

/// A transformation applied to a successful upstream response.
pub trait ResponseStage: Send + Sync + fmt::Debug {
    /// Stage identifier for logging/metrics.
    fn name(&self) -> &'static str;

    fn on_response(&self, response: &mut Response);
}
