//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → optional TOML file (loader.rs)
//!     → environment overrides (POWERUPS_CONFIG, UPSTREAM_URL, PORT)
//!     → defaulting of zero/empty powerup values
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no runtime reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, load_config, ConfigError};
pub use schema::{
    BotDetectionConfig, CookieKeeperConfig, IpBlocklistConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, PowerupsConfig, ProxyConfig, TimeoutConfig, UpstreamConfig,
    UserIdConfig,
};
pub use validation::ValidationError;
