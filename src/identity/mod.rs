//! Client identity subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → client_ip.rs (header precedence chain → client IP string)
//!     → user_id.rs (SHA-256 of ip|UA|salt → identity header)
//! ```

pub mod client_ip;
pub mod user_id;

pub use user_id::{derive, UserIdStage};
