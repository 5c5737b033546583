//! Set-Cookie lifetime extension.
//!
//! Every `Set-Cookie` line coming back from the upstream gets exactly one
//! `Max-Age=<configured>` attribute and no `Expires` attribute. The cookie's
//! own name=value pair and all other attributes keep their order and casing.
//! Values are handled as bytes, so non-ASCII cookies are rewritten too.

use axum::{
    http::{header, HeaderValue},
    response::Response,
};

use crate::pipeline::ResponseStage;

/// Rewrite one Set-Cookie line.
pub fn rewrite_cookie(raw: &str, max_age: u64) -> String {
    // Only ASCII bytes are removed or inserted, so UTF-8 input stays UTF-8.
    match String::from_utf8(rewrite_cookie_bytes(raw.as_bytes(), max_age)) {
        Ok(rewritten) => rewritten,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// Byte-level form of [`rewrite_cookie`]. Header values need not be UTF-8.
pub fn rewrite_cookie_bytes(raw: &[u8], max_age: u64) -> Vec<u8> {
    let max_age_attr = format!("Max-Age={}", max_age);
    let mut segments = raw.split(|&b| b == b';');
    let mut out = Vec::with_capacity(raw.len() + max_age_attr.len() + 2);
    // The leading name=value pair is never an attribute.
    out.extend_from_slice(segments.next().unwrap_or_default().trim_ascii());

    let mut has_max_age = false;
    for segment in segments {
        let trimmed = segment.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }

        let name = trimmed
            .split(|&b| b == b'=')
            .next()
            .unwrap_or_default()
            .trim_ascii();
        if name.eq_ignore_ascii_case(b"max-age") {
            if !has_max_age {
                push_segment(&mut out, max_age_attr.as_bytes());
                has_max_age = true;
            }
            continue;
        }
        if name.eq_ignore_ascii_case(b"expires") {
            continue;
        }

        push_segment(&mut out, trimmed);
    }

    if !has_max_age {
        push_segment(&mut out, max_age_attr.as_bytes());
    }

    out
}

fn push_segment(out: &mut Vec<u8>, segment: &[u8]) {
    out.extend_from_slice(b"; ");
    out.extend_from_slice(segment);
}

/// Response stage applying [`rewrite_cookie`] to every Set-Cookie header.
#[derive(Debug, Clone)]
pub struct CookieKeeper {
    max_age: u64,
}

impl CookieKeeper {
    pub fn new(max_age: u64) -> Self {
        Self { max_age }
    }

    pub fn max_age(&self) -> u64 {
        self.max_age
    }
}

impl ResponseStage for CookieKeeper {
    fn name(&self) -> &'static str {
        "cookie_keeper"
    }

    fn on_response(&self, response: &mut Response) {
        let headers = response.headers_mut();
        if !headers.contains_key(header::SET_COOKIE) {
            return;
        }

        let rewritten: Vec<HeaderValue> = headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|value| {
                let rewritten = rewrite_cookie_bytes(value.as_bytes(), self.max_age);
                HeaderValue::from_bytes(&rewritten).unwrap_or_else(|_| value.clone())
            })
            .collect();

        headers.remove(header::SET_COOKIE);
        for value in rewritten {
            headers.append(header::SET_COOKIE, value);
        }
    }
}
