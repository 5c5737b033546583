//! Request/response transformation pipeline.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → RequestContext (client IP + User-Agent, resolved once)
//!     → ip_blocklist   (may answer 403)
//!     → bot_detection  (sets X-Bot, may answer 403)
//!     → user_id        (sets identity header)
//!     → upstream forward (502 on failure, response stages skipped)
//!     → cookie_keeper  (rewrites Set-Cookie)
//!     → client
//! ```
//!
//! # Design Decisions
//! - Disabled stages are never constructed, so they cost nothing per request
//! - Built once at startup and shared through `Arc`; no state is mutated afterwards
//! - The first stage that answers ends the request

pub mod stage;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderName, Request},
    response::Response,
};
use thiserror::Error;

use crate::config::PowerupsConfig;
use crate::http::cookie_keeper::CookieKeeper;
use crate::http::response::bad_gateway;
use crate::http::upstream::Upstream;
use crate::identity::UserIdStage;
use crate::observability::metrics;
use crate::security::{BotClassifier, BotDetectionStage, IpBlocklist, IpBlocklistStage};

pub use stage::{RequestContext, RequestStage, ResponseStage, StageOutcome};

/// Error constructing the pipeline from configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid header name `{0}`")]
    HeaderName(String),

    #[error("failed to compile bot signatures: {0}")]
    BotPattern(#[from] regex::Error),
}

/// The ordered chain of stages around one upstream.
pub struct Pipeline {
    request_stages: Vec<Box<dyn RequestStage>>,
    response_stages: Vec<Box<dyn ResponseStage>>,
    upstream: Arc<dyn Upstream>,
}

impl Pipeline {
    /// Assemble a pipeline from explicit stages.
    pub fn new(
        request_stages: Vec<Box<dyn RequestStage>>,
        response_stages: Vec<Box<dyn ResponseStage>>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Self {
            request_stages,
            response_stages,
            upstream,
        }
    }

    /// Build the enabled stages in their fixed order.
    pub fn from_config(
        powerups: &PowerupsConfig,
        upstream: Arc<dyn Upstream>,
    ) -> Result<Self, BuildError> {
        let mut request_stages: Vec<Box<dyn RequestStage>> = Vec::new();
        let mut response_stages: Vec<Box<dyn ResponseStage>> = Vec::new();

        if let Some(cfg) = powerups.ip_blocklist() {
            let blocklist = IpBlocklist::from_entries(cfg.ips.as_slice());
            tracing::info!(
                entries = cfg.ips.len(),
                effective = blocklist.len(),
                "IP blocklist enabled"
            );
            request_stages.push(Box::new(IpBlocklistStage::new(blocklist)));
        }

        if let Some(cfg) = powerups.bot_detection() {
            let header = header_name(&cfg.header_name)?;
            tracing::info!(
                block = cfg.block_bots,
                header = %header,
                "Bot detection enabled"
            );
            request_stages.push(Box::new(BotDetectionStage::new(
                BotClassifier::new()?,
                header,
                cfg.block_bots,
            )));
        }

        if let Some(cfg) = powerups.user_id() {
            let header = header_name(&cfg.header)?;
            if cfg.salt.is_empty() {
                tracing::warn!("User ID enabled with an empty salt; tokens are guessable");
            }
            tracing::info!(header = %header, "User ID enabled");
            request_stages.push(Box::new(UserIdStage::new(header, cfg.salt.clone())));
        }

        if let Some(cfg) = powerups.cookie_keeper() {
            tracing::info!(max_age = cfg.max_age, "Cookie keeper enabled");
            response_stages.push(Box::new(CookieKeeper::new(cfg.max_age)));
        }

        Ok(Self::new(request_stages, response_stages, upstream))
    }

    /// Names of the active stages, request side first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.request_stages
            .iter()
            .map(|s| s.name())
            .chain(self.response_stages.iter().map(|s| s.name()))
            .collect()
    }

    /// Run one request through every stage and the upstream.
    pub async fn handle(&self, mut request: Request<Body>) -> Response {
        let ctx = RequestContext::from_request(&request);

        for stage in &self.request_stages {
            if let StageOutcome::Respond(response) = stage.on_request(&ctx, &mut request) {
                tracing::debug!(
                    stage = stage.name(),
                    client_ip = %ctx.client_ip_str(),
                    status = %response.status(),
                    "Request short-circuited"
                );
                metrics::record_short_circuit(stage.name());
                return response;
            }
        }

        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let mut response = match self.upstream.forward(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(method = %method, path = %path, error = %e, "Upstream error");
                metrics::record_upstream_error();
                return bad_gateway();
            }
        };

        for stage in &self.response_stages {
            stage.on_response(&mut response);
        }

        response
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("request_stages", &self.request_stages)
            .field("response_stages", &self.response_stages)
            .finish_non_exhaustive()
    }
}

fn header_name(name: &str) -> Result<HeaderName, BuildError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| BuildError::HeaderName(name.to_string()))
}
