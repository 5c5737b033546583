//! User-Agent bot classification.
//!
//! All signatures are compiled into one case-insensitive alternation and
//! searched unanchored. There are no word boundaries: any agent containing
//! `bot` (say `MyRobotApp/1.0`) is classified as a bot. That false-positive
//! source is accepted.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
};
use regex::{Regex, RegexBuilder};

use crate::http::response::forbidden;
use crate::pipeline::{RequestContext, RequestStage, StageOutcome};

/// Known bot User-Agent fragments, matched literally.
pub const BOT_SIGNATURES: &[&str] = &[
    // Search engines
    "googlebot", "bingbot", "yandexbot", "baiduspider", "duckduckbot",
    "slurp", "sogou", "exabot", "ia_archiver", "archive.org_bot",
    // Social / messengers
    "facebookexternalhit", "facebot", "twitterbot", "linkedinbot",
    "pinterest", "slackbot", "telegrambot", "whatsapp", "discordbot",
    // SEO / monitoring
    "semrushbot", "ahrefsbot", "mj12bot", "dotbot", "rogerbot",
    "screaming frog", "deepcrawl", "sitebulb",
    // Uptime
    "uptimerobot", "pingdom", "statuscake", "newrelicpinger",
    "site24x7", "datadog",
    // Headless browsers / automation
    "headlesschrome", "phantomjs", "puppeteer", "playwright",
    "selenium", "webdriver",
    // Generic
    "bot", "crawler", "spider", "scraper", "curl", "wget", "python-requests",
    "go-http-client", "java/", "libwww", "httpunit", "nutch",
    "biglotron", "teoma", "convera", "gigablast",
];

/// Precompiled bot signature matcher.
#[derive(Debug, Clone)]
pub struct BotClassifier {
    pattern: Regex,
}

impl BotClassifier {
    /// Compile the built-in signature catalog.
    pub fn new() -> Result<Self, regex::Error> {
        Self::with_signatures(BOT_SIGNATURES)
    }

    /// Compile a custom signature list. Signatures are escaped, not regexes.
    pub fn with_signatures(signatures: &[&str]) -> Result<Self, regex::Error> {
        let alternation = signatures
            .iter()
            .map(|s| regex::escape(s))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = RegexBuilder::new(&format!("({})", alternation))
            .case_insensitive(true)
            .build()?;
        Ok(Self { pattern })
    }

    /// The signature fragment found in `user_agent`, if any.
    pub fn matched<'a>(&self, user_agent: &'a str) -> Option<&'a str> {
        self.pattern.find(user_agent).map(|m| m.as_str())
    }

    pub fn classify(&self, user_agent: &str) -> bool {
        self.pattern.is_match(user_agent)
    }
}

/// Annotates requests with the bot verdict and optionally blocks bots.
#[derive(Debug)]
pub struct BotDetectionStage {
    classifier: BotClassifier,
    header: HeaderName,
    block_bots: bool,
}

impl BotDetectionStage {
    pub fn new(classifier: BotClassifier, header: HeaderName, block_bots: bool) -> Self {
        Self {
            classifier,
            header,
            block_bots,
        }
    }
}

impl RequestStage for BotDetectionStage {
    fn name(&self) -> &'static str {
        "bot_detection"
    }

    fn on_request(&self, ctx: &RequestContext, request: &mut Request<Body>) -> StageOutcome {
        let user_agent = ctx.user_agent_str();
        let signature = self.classifier.matched(&user_agent);
        let verdict = if signature.is_some() { "true" } else { "false" };
        request
            .headers_mut()
            .insert(self.header.clone(), HeaderValue::from_static(verdict));

        if let Some(signature) = signature {
            tracing::debug!(
                client_ip = %ctx.client_ip_str(),
                user_agent = %user_agent,
                signature,
                blocked = self.block_bots,
                "Bot detected"
            );
            if self.block_bots {
                return StageOutcome::Respond(forbidden());
            }
        }

        StageOutcome::Continue
    }
}
