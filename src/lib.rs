//! Server-side tagging power-ups proxy.
//!
//! A reverse proxy in front of a tagging collector that can block clients by
//! IP, classify bots by User-Agent, attach a cookieless user identifier, and
//! extend the lifetime of cookies set by the collector.

pub mod config;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::Pipeline;
