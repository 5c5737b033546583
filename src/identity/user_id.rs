//! Deterministic cookieless user identifier.
//!
//! The token is the first 8 bytes of `SHA-256(ip | user_agent | salt)`,
//! hex encoded. The `|` delimiter is not escaped, so a User-Agent containing
//! `|` can in theory collide with a different ip/UA split.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
};
use sha2::{Digest, Sha256};

use crate::pipeline::{RequestContext, RequestStage, StageOutcome};

/// Derive the 16 hex character identity token.
///
/// Inputs are hashed as raw bytes, so header values that are not valid UTF-8
/// still produce distinct tokens.
pub fn derive(
    ip: impl AsRef<[u8]>,
    user_agent: impl AsRef<[u8]>,
    salt: impl AsRef<[u8]>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_ref());
    hasher.update(b"|");
    hasher.update(user_agent.as_ref());
    hasher.update(b"|");
    hasher.update(salt.as_ref());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Writes the identity token onto every forwarded request.
#[derive(Debug)]
pub struct UserIdStage {
    header: HeaderName,
    salt: String,
}

impl UserIdStage {
    pub fn new(header: HeaderName, salt: impl Into<String>) -> Self {
        Self {
            header,
            salt: salt.into(),
        }
    }
}

impl RequestStage for UserIdStage {
    fn name(&self) -> &'static str {
        "user_id"
    }

    fn on_request(&self, ctx: &RequestContext, request: &mut Request<Body>) -> StageOutcome {
        let token = derive(&ctx.client_ip, &ctx.user_agent, &self.salt);
        // hex is always a valid header value
        if let Ok(value) = HeaderValue::from_str(&token) {
            request.headers_mut().insert(self.header.clone(), value);
        }
        StageOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_sixteen_lowercase_hex() {
        let token = derive("9.9.9.9", "Mozilla/5.0", "s1");
        assert_eq!(token.len(), 16);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn token_is_prefix_of_full_digest() {
        let full = hex::encode(Sha256::digest(b"9.9.9.9|Mozilla/5.0|s1"));
        assert_eq!(derive("9.9.9.9", "Mozilla/5.0", "s1"), full[..16]);
    }

    #[test]
    fn empty_inputs_still_hash_delimiters() {
        let full = hex::encode(Sha256::digest(b"||"));
        assert_eq!(derive("", "", ""), full[..16]);
    }

    #[test]
    fn deterministic_and_input_sensitive() {
        let base = derive("9.9.9.9", "Mozilla/5.0", "s1");
        assert_eq!(base, derive("9.9.9.9", "Mozilla/5.0", "s1"));
        assert_ne!(base, derive("9.9.9.8", "Mozilla/5.0", "s1"));
        assert_ne!(base, derive("9.9.9.9", "Mozilla/5.1", "s1"));
        assert_ne!(base, derive("9.9.9.9", "Mozilla/5.0", "s2"));
    }

    #[test]
    fn invalid_utf8_agents_hash_distinctly() {
        let first: &[u8] = b"Agent/\xe9";
        let second: &[u8] = b"Agent/\xff";
        assert_ne!(derive("9.9.9.9", first, "s1"), derive("9.9.9.9", second, "s1"));

        let full = hex::encode(Sha256::digest(b"9.9.9.9|Agent/\xe9|s1"));
        assert_eq!(derive("9.9.9.9", first, "s1"), full[..16]);
    }

    #[test]
    fn stage_hashes_raw_context_bytes() {
        let stage = UserIdStage::new(HeaderName::from_static("x-stape-user-id"), "s1");
        let ctx = RequestContext::new("9.9.9.9", b"Agent/\xe9".to_vec());
        let mut request = Request::builder().body(Body::empty()).unwrap();

        stage.on_request(&ctx, &mut request);

        let full = hex::encode(Sha256::digest(b"9.9.9.9|Agent/\xe9|s1"));
        assert_eq!(request.headers()["x-stape-user-id"], &full[..16]);
    }

    #[test]
    fn stage_sets_configured_header() {
        let stage = UserIdStage::new(HeaderName::from_static("x-stape-user-id"), "s1");
        let ctx = RequestContext::new("9.9.9.9", "Mozilla/5.0");
        let mut request = Request::builder()
            .header("x-stape-user-id", "spoofed")
            .body(Body::empty())
            .unwrap();

        assert!(matches!(
            stage.on_request(&ctx, &mut request),
            StageOutcome::Continue
        ));
        let values: Vec<_> = request.headers().get_all("x-stape-user-id").iter().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], derive("9.9.9.9", "Mozilla/5.0", "s1").as_str());
    }
}
