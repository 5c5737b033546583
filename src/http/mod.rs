//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, health route, middleware)
//!     → [pipeline runs request stages]
//!     → upstream.rs (rewrite URI, strip hop-by-hop, forward)
//!     → [pipeline runs response stages, e.g. cookie_keeper.rs]
//!     → Send to client
//! ```

pub mod cookie_keeper;
pub mod response;
pub mod server;
pub mod upstream;

pub use cookie_keeper::CookieKeeper;
pub use server::HttpServer;
pub use upstream::{HttpUpstream, Upstream, UpstreamError, UpstreamTarget};
