//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → ip_blocklist.rs (403 for listed client IPs)
//!     → bot_detection.rs (annotate X-Bot, optionally 403)
//!     → identity, then upstream
//! ```
//!
//! # Design Decisions
//! - Patterns and address sets are compiled once at startup
//! - Unparsable input degrades to "allow", never to an error response

pub mod bot_detection;
pub mod ip_blocklist;

pub use bot_detection::{BotClassifier, BotDetectionStage, BOT_SIGNATURES};
pub use ip_blocklist::{IpBlocklist, IpBlocklistStage};
