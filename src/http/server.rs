//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the health route and the catch-all proxy route
//! - Wire up middleware (tracing, body read deadline, response deadline)
//! - Bind server to listener
//! - Dispatch every other request through the pipeline

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    map_request_body::MapRequestBodyLayer,
    timeout::{RequestBodyTimeoutLayer, TimeoutBody, TimeoutLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::upstream::{HttpUpstream, TargetError, UpstreamTarget};
use crate::observability::metrics;
use crate::pipeline::{BuildError, Pipeline};

/// Path answered locally, bypassing the pipeline.
pub const HEALTH_PATH: &str = "/healthz";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// Error creating the server from configuration.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid upstream: {0}")]
    Upstream(#[from] TargetError),

    #[error(transparent)]
    Pipeline(#[from] BuildError),
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    pipeline: Arc<Pipeline>,
}

impl HttpServer {
    /// Create a server forwarding to the configured upstream.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let target = UpstreamTarget::parse(&config.upstream.url)?;
        let upstream = Arc::new(HttpUpstream::new(
            target,
            Duration::from_secs(config.timeouts.upstream_pool_idle_secs),
        ));
        let pipeline = Pipeline::from_config(&config.powerups, upstream)?;
        Ok(Self::with_pipeline(config, pipeline))
    }

    /// Create a server around an already assembled pipeline.
    pub fn with_pipeline(config: ProxyConfig, pipeline: Pipeline) -> Self {
        let pipeline = Arc::new(pipeline);
        let state = AppState {
            pipeline: pipeline.clone(),
        };
        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            pipeline,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route(HEALTH_PATH, any(health_handler))
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.timeouts.write_secs,
                    )))
                    .layer(RequestBodyTimeoutLayer::new(Duration::from_secs(
                        config.timeouts.read_secs,
                    )))
                    .layer(MapRequestBodyLayer::new(Body::new::<TimeoutBody<Body>>))
                    .into_inner(),
            )
    }

    /// The router, for serving on a custom listener or in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.url,
            stages = ?self.pipeline.stage_names(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Main proxy handler.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();

    let response = state.pipeline.handle(request).await;

    metrics::record_request(&method, response.status().as_u16(), start_time);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    use crate::config::{BotDetectionConfig, PowerupsConfig};

    fn blocking_config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.upstream.url = "http://127.0.0.1:9".into();
        config.powerups = PowerupsConfig {
            bot_detection: Some(BotDetectionConfig {
                enabled: true,
                block_bots: true,
                header_name: "X-Bot".into(),
            }),
            ..Default::default()
        };
        config
    }

    #[tokio::test]
    async fn health_bypasses_pipeline() {
        let server = HttpServer::new(blocking_config()).unwrap();
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri(HEALTH_PATH)
                    .header("user-agent", "curl/7.68.0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn other_paths_go_through_pipeline() {
        let server = HttpServer::new(blocking_config()).unwrap();
        for path in ["/", "/g/collect", "/healthz/extra"] {
            let response = server
                .router()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri(path)
                        .header("user-agent", "curl/7.68.0")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "path {}", path);
        }
    }

    #[tokio::test]
    async fn accepts_https_upstream() {
        let mut config = blocking_config();
        config.upstream.url = "https://sgtm.example.com".into();
        let server = HttpServer::new(config).unwrap();
        assert_eq!(server.config().upstream.url, "https://sgtm.example.com");
    }

    #[test]
    fn rejects_unusable_upstream() {
        let mut config = ProxyConfig::default();
        config.upstream.url = "ftp://collector".into();
        assert!(matches!(
            HttpServer::new(config),
            Err(ServerError::Upstream(TargetError::Scheme(_)))
        ));
    }
}
