//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files and
//! from the `POWERUPS_CONFIG` JSON payload.

use serde::{Deserialize, Serialize};

/// Default cookie lifetime: 400 days.
pub const DEFAULT_COOKIE_MAX_AGE: u64 = 34_560_000;

/// Default header carrying the derived identity token.
pub const DEFAULT_USER_ID_HEADER: &str = "X-Stape-User-Id";

/// Default header carrying the bot classification.
pub const DEFAULT_BOT_HEADER: &str = "X-Bot";

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The single upstream collector.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request/response transformations.
    pub powerups: PowerupsConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8081").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8081".to_string(),
        }
    }
}

/// Upstream target configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Absolute http URL of the upstream. A path or query here is prefixed
    /// onto every forwarded request.
    pub url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://sgtm:8080".to_string(),
        }
    }
}

/// Timeouts, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for reading the request body.
    pub read_secs: u64,

    /// Deadline for producing the full response.
    pub write_secs: u64,

    /// How long pooled upstream connections may sit idle.
    pub upstream_pool_idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: 30,
            write_secs: 60,
            upstream_pool_idle_secs: 120,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// The optional transformations applied around the upstream call.
///
/// An absent section, or one with `enabled = false`, removes that stage from
/// the pipeline entirely.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct PowerupsConfig {
    pub cookie_keeper: Option<CookieKeeperConfig>,
    pub user_id: Option<UserIdConfig>,
    pub bot_detection: Option<BotDetectionConfig>,
    pub ip_blocklist: Option<IpBlocklistConfig>,
}

impl PowerupsConfig {
    /// Fill zero/empty values with their defaults.
    pub fn apply_defaults(&mut self) {
        if let Some(cookie_keeper) = self.cookie_keeper.as_mut() {
            if cookie_keeper.max_age == 0 {
                cookie_keeper.max_age = DEFAULT_COOKIE_MAX_AGE;
            }
        }
        if let Some(user_id) = self.user_id.as_mut() {
            if user_id.header.is_empty() {
                user_id.header = DEFAULT_USER_ID_HEADER.to_string();
            }
        }
        if let Some(bot_detection) = self.bot_detection.as_mut() {
            if bot_detection.header_name.is_empty() {
                bot_detection.header_name = DEFAULT_BOT_HEADER.to_string();
            }
        }
    }

    pub fn cookie_keeper(&self) -> Option<&CookieKeeperConfig> {
        self.cookie_keeper.as_ref().filter(|c| c.enabled)
    }

    pub fn user_id(&self) -> Option<&UserIdConfig> {
        self.user_id.as_ref().filter(|c| c.enabled)
    }

    pub fn bot_detection(&self) -> Option<&BotDetectionConfig> {
        self.bot_detection.as_ref().filter(|c| c.enabled)
    }

    pub fn ip_blocklist(&self) -> Option<&IpBlocklistConfig> {
        self.ip_blocklist
            .as_ref()
            .filter(|c| c.enabled && !c.ips.is_empty())
    }
}

/// Extends the lifetime of every cookie set by the upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CookieKeeperConfig {
    pub enabled: bool,

    /// Max-Age written into every Set-Cookie line, in seconds.
    pub max_age: u64,
}

impl Default for CookieKeeperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_age: DEFAULT_COOKIE_MAX_AGE,
        }
    }
}

/// Cookieless identity derived from client IP and User-Agent.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserIdConfig {
    pub enabled: bool,

    /// Secret mixed into the hash.
    pub salt: String,

    /// Request header the token is written to.
    pub header: String,
}

impl Default for UserIdConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            salt: String::new(),
            header: DEFAULT_USER_ID_HEADER.to_string(),
        }
    }
}

/// User-Agent based bot classification.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BotDetectionConfig {
    pub enabled: bool,

    /// Answer 403 instead of forwarding bot traffic.
    pub block_bots: bool,

    /// Request header the classification is written to.
    pub header_name: String,
}

impl Default for BotDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            block_bots: false,
            header_name: DEFAULT_BOT_HEADER.to_string(),
        }
    }
}

/// Client IP blocklist.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct IpBlocklistConfig {
    pub enabled: bool,

    /// Single addresses or CIDR ranges.
    pub ips: Vec<String>,
}
