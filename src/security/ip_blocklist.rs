//! Client IP blocklist.
//!
//! Entries are parsed once: CIDR first, then a single address. Entries that
//! are neither are dropped with a startup warning and never fail the load.
//! IPv4-mapped IPv6 addresses are folded to IPv4 on both sides.

use std::collections::HashSet;
use std::net::IpAddr;

use axum::{body::Body, http::Request};
use ipnet::IpNet;

use crate::http::response::forbidden;
use crate::pipeline::{RequestContext, RequestStage, StageOutcome};

/// Parsed blocklist: exact addresses plus CIDR ranges.
#[derive(Debug, Clone, Default)]
pub struct IpBlocklist {
    singles: HashSet<IpAddr>,
    networks: Vec<IpNet>,
}

impl IpBlocklist {
    /// Parse configured entries, dropping anything unparsable.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut blocklist = Self::default();

        for entry in entries {
            let entry = entry.as_ref().trim();
            if let Ok(net) = entry.parse::<IpNet>() {
                blocklist.networks.push(net);
            } else if let Ok(ip) = entry.parse::<IpAddr>() {
                blocklist.singles.insert(ip.to_canonical());
            } else {
                tracing::warn!(entry = %entry, "Ignoring invalid IP blocklist entry");
            }
        }

        blocklist
    }

    /// Number of effective entries.
    pub fn len(&self) -> usize {
        self.singles.len() + self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `ip` parses and is listed. Unparsable input is never blocked.
    pub fn is_blocked(&self, ip: &str) -> bool {
        let Ok(ip) = ip.trim().parse::<IpAddr>() else {
            return false;
        };
        let ip = ip.to_canonical();

        self.singles.contains(&ip) || self.networks.iter().any(|net| net.contains(&ip))
    }
}

/// Rejects requests whose resolved client IP is blocklisted.
#[derive(Debug)]
pub struct IpBlocklistStage {
    blocklist: IpBlocklist,
}

impl IpBlocklistStage {
    pub fn new(blocklist: IpBlocklist) -> Self {
        Self { blocklist }
    }
}

impl RequestStage for IpBlocklistStage {
    fn name(&self) -> &'static str {
        "ip_blocklist"
    }

    fn on_request(&self, ctx: &RequestContext, _request: &mut Request<Body>) -> StageOutcome {
        let client_ip = ctx.client_ip_str();
        if self.blocklist.is_blocked(&client_ip) {
            tracing::debug!(client_ip = %client_ip, "Blocked IP");
            return StageOutcome::Respond(forbidden());
        }
        StageOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn blocklist(entries: &[&str]) -> IpBlocklist {
        IpBlocklist::from_entries(entries)
    }

    #[test]
    fn cidr_containment() {
        let list = blocklist(&["10.0.0.0/8"]);
        assert!(list.is_blocked("10.0.0.1"));
        assert!(list.is_blocked("10.255.255.255"));
        assert!(!list.is_blocked("11.0.0.1"));
        assert!(!list.is_blocked("9.9.9.9"));
    }

    #[test]
    fn single_addresses() {
        let list = blocklist(&["1.2.3.4", "2001:db8::1"]);
        assert!(list.is_blocked("1.2.3.4"));
        assert!(!list.is_blocked("1.2.3.5"));
        assert!(list.is_blocked("2001:db8::1"));
        assert!(list.is_blocked("2001:0db8:0000::0001"));
    }

    #[test]
    fn ipv6_ranges() {
        let list = blocklist(&["2001:db8::/32"]);
        assert!(list.is_blocked("2001:db8:1234::5"));
        assert!(!list.is_blocked("2001:db9::1"));
    }

    #[test]
    fn host_bits_in_cidr_are_ignored() {
        let list = blocklist(&["192.168.1.77/24"]);
        assert!(list.is_blocked("192.168.1.1"));
        assert!(!list.is_blocked("192.168.2.1"));
    }

    #[test]
    fn mapped_ipv4_matches_ipv4_entries() {
        let list = blocklist(&["1.2.3.4", "10.0.0.0/8"]);
        assert!(list.is_blocked("::ffff:1.2.3.4"));
        assert!(list.is_blocked("::ffff:10.1.1.1"));
    }

    #[test]
    fn invalid_entries_are_dropped() {
        let list = blocklist(&["not-an-ip", "1.2.3.4/33", "300.1.1.1", "5.6.7.8"]);
        assert_eq!(list.len(), 1);
        assert!(list.is_blocked("5.6.7.8"));
    }

    #[test]
    fn unparsable_client_is_never_blocked() {
        let list = blocklist(&["0.0.0.0/0", "::/0"]);
        assert!(list.is_blocked("8.8.8.8"));
        assert!(!list.is_blocked("unknown"));
        assert!(!list.is_blocked(""));
        assert!(!list.is_blocked("8.8.8.8:443"));
    }

    #[test]
    fn stage_short_circuits_blocked_clients() {
        let stage = IpBlocklistStage::new(blocklist(&["10.0.0.0/8"]));
        let mut request = Request::new(Body::empty());

        let blocked = stage.on_request(&RequestContext::new("10.1.2.3", ""), &mut request);
        match blocked {
            StageOutcome::Respond(response) => assert_eq!(response.status(), StatusCode::FORBIDDEN),
            StageOutcome::Continue => panic!("10.1.2.3 should be blocked"),
        }

        let allowed = stage.on_request(&RequestContext::new("9.9.9.9", ""), &mut request);
        assert!(matches!(allowed, StageOutcome::Continue));
    }
}
