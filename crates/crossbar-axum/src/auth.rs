//! Ingress gates: bearer auth for `/v1/*`, IP allowlisting for the UI
//! image subtree.

use crate::error::HttpError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use crossbar_core::GatewayError;
use std::net::{IpAddr, SocketAddr};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Constant-time token comparison. Length is not secret; contents are.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Bearer middleware for the `/v1` subtree. Failures are a generic 401; no
/// distinction between a missing header and a wrong token.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match token {
        Some(t) if constant_time_eq(t, &state.settings.bearer_token) => next.run(request).await,
        _ => HttpError(GatewayError::AuthFailed).into_response(),
    }
}

/// IP gate for `/ui/images`. An empty allowlist disables the subtree
/// outright, and a request without a resolvable peer address is refused.
pub async fn require_ui_ip(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());

    match peer {
        Some(ip) if state.ui_allowlist.contains(ip) => next.run(request).await,
        _ => (
            axum::http::StatusCode::FORBIDDEN,
            axum::Json(serde_json::json!({
                "error": "ip_blocked",
                "message": "client address is not allowed to use the UI subtree",
            })),
        )
            .into_response(),
    }
}

/// A list of single IPs and CIDR blocks.
#[derive(Debug, Clone, Default)]
pub struct IpAllowlist {
    entries: Vec<Entry>,
}

#[derive(Debug, Clone)]
enum Entry {
    Single(IpAddr),
    Cidr { network: IpAddr, prefix: u8 },
}

#[derive(Debug, Error)]
#[error("invalid allowlist entry {0:?}")]
pub struct AllowlistParseError(String);

impl IpAllowlist {
    /// Parse entries like `127.0.0.1` or `10.0.0.0/8`.
    pub fn parse(raw: &[String]) -> Result<Self, AllowlistParseError> {
        let mut entries = Vec::new();
        for item in raw {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let entry = if let Some((addr, prefix)) = item.split_once('/') {
                let network: IpAddr = addr
                    .trim()
                    .parse()
                    .map_err(|_| AllowlistParseError(item.to_string()))?;
                let prefix: u8 = prefix
                    .trim()
                    .parse()
                    .map_err(|_| AllowlistParseError(item.to_string()))?;
                let max = match network {
                    IpAddr::V4(_) => 32,
                    IpAddr::V6(_) => 128,
                };
                if prefix > max {
                    return Err(AllowlistParseError(item.to_string()));
                }
                Entry::Cidr { network, prefix }
            } else {
                Entry::Single(
                    item.parse()
                        .map_err(|_| AllowlistParseError(item.to_string()))?,
                )
            };
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    /// Whether the list is empty (subtree disabled).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.entries.iter().any(|entry| match entry {
            Entry::Single(addr) => *addr == ip,
            Entry::Cidr { network, prefix } => in_cidr(ip, *network, *prefix),
        })
    }
}

fn in_cidr(ip: IpAddr, network: IpAddr, prefix: u8) -> bool {
    match (ip, network) {
        (IpAddr::V4(ip), IpAddr::V4(net)) => {
            if prefix == 0 {
                return true;
            }
            let mask = u32::MAX << (32 - u32::from(prefix));
            (u32::from(ip) & mask) == (u32::from(net) & mask)
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) => {
            if prefix == 0 {
                return true;
            }
            let mask = u128::MAX << (128 - u32::from(prefix));
            (u128::from(ip) & mask) == (u128::from(net) & mask)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> IpAllowlist {
        IpAllowlist::parse(&items.iter().map(|s| s.to_string()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn single_addresses_match_exactly() {
        let allow = list(&["127.0.0.1"]);
        assert!(allow.contains("127.0.0.1".parse().unwrap()));
        assert!(!allow.contains("127.0.0.2".parse().unwrap()));
    }

    #[test]
    fn cidr_blocks_match_by_prefix() {
        let allow = list(&["10.0.0.0/8", "192.168.1.0/24"]);
        assert!(allow.contains("10.255.3.4".parse().unwrap()));
        assert!(allow.contains("192.168.1.77".parse().unwrap()));
        assert!(!allow.contains("192.168.2.1".parse().unwrap()));
        assert!(!allow.contains("11.0.0.1".parse().unwrap()));
    }

    #[test]
    fn v6_and_v4_do_not_cross_match() {
        let allow = list(&["::1"]);
        assert!(allow.contains("::1".parse().unwrap()));
        assert!(!allow.contains("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn empty_list_matches_nothing() {
        let allow = IpAllowlist::default();
        assert!(allow.is_empty());
        assert!(!allow.contains("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn bad_entries_are_parse_errors() {
        assert!(IpAllowlist::parse(&["not-an-ip".to_string()]).is_err());
        assert!(IpAllowlist::parse(&["10.0.0.0/40".to_string()]).is_err());
    }

    #[test]
    fn token_compare_requires_exact_match() {
        assert!(constant_time_eq("secret", "secret"));
        assert!(!constant_time_eq("secret", "secres"));
        assert!(!constant_time_eq("secret", "secret2"));
    }
}
