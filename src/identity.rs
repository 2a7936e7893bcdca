//! Client identity resolution.
//!
//! Derives the registry key for a request from proxy headers and the transport
//! peer address. Which headers are believed is a deployment decision, captured
//! by [`TrustPolicy`]: a client talking to the server directly can put anything
//! in these headers, so header trust must be switched off when there is no
//! trusted proxy in front.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::trace;

/// Key shared by every request that yields no usable identity
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Which identity headers to believe, and how
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustPolicy {
    /// Consult the forwarded-chain header
    pub trust_forwarded_for: bool,

    /// Consult the real-IP header
    pub trust_real_ip: bool,

    /// Consult the CDN connecting-IP header
    pub trust_cdn_ip: bool,

    /// Skip private, loopback and link-local entries in the forwarded chain
    pub filter_private_forwarded: bool,

    /// Apply the same filter to the real-IP and CDN headers.
    /// Off by default: those are set by our own proxy or CDN.
    pub filter_private_direct: bool,

    pub forwarded_for_header: String,
    pub real_ip_header: String,
    pub cdn_ip_header: String,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            trust_forwarded_for: true,
            trust_real_ip: true,
            trust_cdn_ip: true,
            filter_private_forwarded: true,
            filter_private_direct: false,
            forwarded_for_header: "x-forwarded-for".to_string(),
            real_ip_header: "x-real-ip".to_string(),
            cdn_ip_header: "cf-connecting-ip".to_string(),
        }
    }
}

impl TrustPolicy {
    /// Policy for servers exposed directly to clients: only the peer address counts
    pub fn peer_only() -> Self {
        Self {
            trust_forwarded_for: false,
            trust_real_ip: false,
            trust_cdn_ip: false,
            ..Self::default()
        }
    }
}

/// Identity-relevant parts of an inbound request
#[derive(Debug, Clone, Default)]
pub struct ClientSignals {
    /// Header (lowercased name, raw value) pairs
    headers: Vec<(String, String)>,

    /// Transport-layer peer address as seen by the server
    peer: Option<IpAddr>,
}

impl ClientSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals carrying only a peer address
    pub fn from_peer(peer: IpAddr) -> Self {
        Self {
            headers: Vec::new(),
            peer: Some(peer),
        }
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .push((name.as_ref().to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_peer(mut self, peer: IpAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn peer(&self) -> Option<IpAddr> {
        self.peer
    }
}

/// Resolves a stable client key under a [`TrustPolicy`]
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    policy: TrustPolicy,
}

impl IdentityResolver {
    pub fn new(policy: TrustPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Resolve the client key. Never fails; falls back to [`UNKNOWN_CLIENT`].
    pub fn resolve(&self, signals: &ClientSignals) -> String {
        let policy = &self.policy;

        if policy.trust_forwarded_for {
            if let Some(chain) = signals.header(&policy.forwarded_for_header) {
                if let Some(ip) = first_public_in_chain(chain, policy.filter_private_forwarded) {
                    trace!(key = ip, source = "forwarded_for", "Resolved client identity");
                    return ip.to_string();
                }
            }
        }

        if policy.trust_real_ip {
            if let Some(ip) = direct_header(signals, &policy.real_ip_header, policy.filter_private_direct) {
                trace!(key = ip, source = "real_ip", "Resolved client identity");
                return ip.to_string();
            }
        }

        if policy.trust_cdn_ip {
            if let Some(ip) = direct_header(signals, &policy.cdn_ip_header, policy.filter_private_direct) {
                trace!(key = ip, source = "cdn_ip", "Resolved client identity");
                return ip.to_string();
            }
        }

        match signals.peer() {
            Some(peer) => peer.to_string(),
            None => UNKNOWN_CLIENT.to_string(),
        }
    }
}

/// Leftmost entry of a comma-separated chain that parses as an address
/// and, when filtering, is not internal
fn first_public_in_chain(chain: &str, filter_private: bool) -> Option<&str> {
    chain
        .split(',')
        .map(str::trim)
        .find(|entry| match entry.parse::<IpAddr>() {
            Ok(ip) => !filter_private || !is_internal(ip),
            Err(_) => false,
        })
}

/// Single-valued header, returned trimmed as given when it parses
fn direct_header<'a>(signals: &'a ClientSignals, name: &str, filter_private: bool) -> Option<&'a str> {
    let value = signals.header(name)?.trim();
    let ip = value.parse::<IpAddr>().ok()?;
    if filter_private && is_internal(ip) {
        return None;
    }
    Some(value)
}

/// Private, loopback or link-local (unicast or multicast)
pub fn is_internal(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_internal_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_internal_v4(v4),
            None => is_internal_v6(v6),
        },
    }
}

fn is_internal_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        // 224.0.0.0/24 link-local multicast
        || (a == 224 && b == 0 && c == 0)
}

fn is_internal_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        // fe80::/10
        || (first & 0xffc0) == 0xfe80
        // ff02::/16 and other link-local scoped multicast
        || (first & 0xff0f) == 0xff02
}
