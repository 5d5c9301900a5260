//! Resolution of user-supplied hosts, ranges and networks.
//!
//! A custom endpoint is tried in a fixed order, first match wins:
//!
//! 1. `start-end` range of two addresses
//! 2. IPv4 network, a bare address being its `/32`
//! 3. IPv6 network, a bare address being its `/128`
//! 4. host name, resolved through DNS
//!
//! Networks must be canonical: `10.1.2.3/8` is rejected rather than widened
//! to `10.0.0.0/8`.

use async_trait::async_trait;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::addrset::AddressSetBuilder;
use crate::error::GeoNftError;

/// Default DNS resolution timeout in seconds
const DNS_TIMEOUT_SECS: u64 = 5;

/// Forward DNS lookups, injectable for tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Every address `host` resolves to.
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, GeoNftError>;
}

/// Resolver backed by the system's `getaddrinfo`.
#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DNS_TIMEOUT_SECS),
        }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostResolver for SystemResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, GeoNftError> {
        let name = host.to_string();
        let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_host(&name));

        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(Ok(mut addrs))) => {
                addrs.sort();
                addrs.dedup();
                Ok(addrs)
            }
            Ok(Ok(Err(e))) => {
                debug!("DNS lookup of {} failed: {}", host, e);
                Err(GeoNftError::ResolutionFailure(host.to_string()))
            }
            Ok(Err(_)) | Err(_) => {
                debug!("DNS lookup of {} did not complete", host);
                Err(GeoNftError::ResolutionFailure(host.to_string()))
            }
        }
    }
}

/// What a custom token turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Network(IpNet),
    Range { start: String, end: String },
    Host { name: String, addrs: Vec<IpAddr> },
}

/// Classify a token without touching the network.
///
/// Returns `None` when the token can only be a host name.
pub fn parse_literal(token: &str) -> Option<Result<Endpoint, GeoNftError>> {
    if token.contains('-') {
        if let Some(range) = parse_range(token) {
            return Some(range);
        }
    }

    if let Ok(ip) = token.parse::<IpAddr>() {
        return Some(Ok(Endpoint::Network(IpNet::from(ip))));
    }

    if token.contains('/') {
        let net = token
            .parse::<Ipv4Net>()
            .map(IpNet::V4)
            .or_else(|_| token.parse::<Ipv6Net>().map(IpNet::V6));
        if let Ok(net) = net {
            // Host bits set
            if net.trunc() != net {
                return Some(Err(GeoNftError::InvalidNetwork(token.to_string())));
            }
            return Some(Ok(Endpoint::Network(net)));
        }
        // Host names never contain a slash
        return Some(Err(GeoNftError::ResolutionFailure(token.to_string())));
    }

    None
}

/// A hyphenated token is a range when it splits into two addresses. If no
/// part is an address it is left for DNS (`my-host.example`).
fn parse_range(token: &str) -> Option<Result<Endpoint, GeoNftError>> {
    let parts: Vec<&str> = token.split('-').map(str::trim).collect();
    let parsed: Vec<bool> = parts.iter().map(|p| p.parse::<IpAddr>().is_ok()).collect();

    if parts.len() == 2 && parsed.iter().all(|ok| *ok) {
        return Some(Ok(Endpoint::Range {
            start: parts[0].to_string(),
            end: parts[1].to_string(),
        }));
    }

    if parsed.iter().any(|ok| *ok) {
        return Some(Err(GeoNftError::InvalidRange(token.to_string())));
    }

    None
}

/// Resolve a custom endpoint token (range, address, network or host).
pub async fn resolve_endpoint<R: HostResolver + ?Sized>(
    token: &str,
    resolver: &R,
) -> Result<Endpoint, GeoNftError> {
    let token = token.trim();
    if let Some(literal) = parse_literal(token) {
        return literal;
    }

    let addrs = resolver.lookup(token).await?;
    if addrs.is_empty() {
        return Err(GeoNftError::ResolutionFailure(token.to_string()));
    }
    Ok(Endpoint::Host {
        name: token.to_string(),
        addrs,
    })
}

/// Resolve a host or single address, as used by the diagnostic query.
/// Ranges and networks are not accepted here.
pub async fn resolve_host<R: HostResolver + ?Sized>(
    host: &str,
    resolver: &R,
) -> Result<Vec<IpAddr>, GeoNftError> {
    let host = host.trim();
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }

    let addrs = resolver.lookup(host).await?;
    if addrs.is_empty() {
        return Err(GeoNftError::ResolutionFailure(host.to_string()));
    }
    Ok(addrs)
}

/// Add a resolved endpoint to the builder. Returns the number of elements offered.
pub fn add_endpoint(builder: &mut AddressSetBuilder, endpoint: &Endpoint) -> Result<usize, GeoNftError> {
    match endpoint {
        Endpoint::Network(net) => {
            builder.add_network(*net);
            Ok(1)
        }
        Endpoint::Range { start, end } => {
            builder.validate_and_add(start, end)?;
            Ok(1)
        }
        Endpoint::Host { addrs, .. } => {
            for ip in addrs {
                builder.add_address(*ip);
            }
            Ok(addrs.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_dns() -> MockHostResolver {
        let mut mock = MockHostResolver::new();
        mock.expect_lookup().times(0);
        mock
    }

    #[tokio::test]
    async fn test_range() {
        let endpoint = resolve_endpoint("10.0.0.5-10.0.0.9", &no_dns()).await.unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Range {
                start: "10.0.0.5".to_string(),
                end: "10.0.0.9".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_range_with_three_parts_is_invalid() {
        let err = resolve_endpoint("10.0.0.5-10.0.0.9-10.0.0.12", &no_dns())
            .await
            .unwrap_err();
        assert!(matches!(err, GeoNftError::InvalidRange(_)));
    }

    #[tokio::test]
    async fn test_half_range_is_invalid() {
        let err = resolve_endpoint("10.0.0.5-banana", &no_dns()).await.unwrap_err();
        assert!(matches!(err, GeoNftError::InvalidRange(_)));
    }

    #[tokio::test]
    async fn test_mixed_family_range_dropped_by_builder() {
        let endpoint = resolve_endpoint("10.0.0.1-::1", &no_dns()).await.unwrap();
        let mut builder = AddressSetBuilder::new();
        let err = add_endpoint(&mut builder, &endpoint).unwrap_err();
        assert!(matches!(err, GeoNftError::InvalidAddress { .. }));
        assert!(builder.is_empty());
    }

    #[tokio::test]
    async fn test_ipv4_network() {
        let endpoint = resolve_endpoint("192.168.1.0/24", &no_dns()).await.unwrap();
        assert_eq!(endpoint, Endpoint::Network("192.168.1.0/24".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_network_with_host_bits_rejected() {
        for token in ["192.168.1.77/24", "10.1.2.3/8", "2001:db8::1/32"] {
            let err = resolve_endpoint(token, &no_dns()).await.unwrap_err();
            assert!(
                matches!(err, GeoNftError::InvalidNetwork(ref t) if t == token),
                "{} gave {:?}",
                token,
                err
            );
        }
        // Not widened into the builder either
        let mut builder = AddressSetBuilder::new();
        assert!(parse_literal("10.1.2.3/8").unwrap().is_err());
        assert!(builder.is_empty());
        let endpoint = resolve_endpoint("10.0.0.0/8", &no_dns()).await.unwrap();
        add_endpoint(&mut builder, &endpoint).unwrap();
        assert_eq!(builder.materialize().ipv4, vec!["10.0.0.0/8"]);
    }

    #[tokio::test]
    async fn test_ipv6_network() {
        let endpoint = resolve_endpoint("2001:db8::/32", &no_dns()).await.unwrap();
        assert_eq!(endpoint, Endpoint::Network("2001:db8::/32".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_bad_prefix() {
        let err = resolve_endpoint("10.0.0.0/33", &no_dns()).await.unwrap_err();
        assert!(matches!(err, GeoNftError::ResolutionFailure(_)));
    }

    #[tokio::test]
    async fn test_plain_address_is_host_network() {
        let endpoint = resolve_endpoint(" ::1 ", &no_dns()).await.unwrap();
        assert_eq!(endpoint, Endpoint::Network("::1/128".parse().unwrap()));

        let endpoint = resolve_endpoint("1.1.1.1", &no_dns()).await.unwrap();
        let mut builder = AddressSetBuilder::new();
        add_endpoint(&mut builder, &endpoint).unwrap();
        assert_eq!(builder.materialize().ipv4, vec!["1.1.1.1/32"]);
    }

    #[tokio::test]
    async fn test_hyphenated_host_goes_to_dns() {
        let mut mock = MockHostResolver::new();
        mock.expect_lookup()
            .withf(|host| host == "my-host.example")
            .times(1)
            .returning(|_| Ok(vec!["192.0.2.7".parse().unwrap(), "2001:db8::7".parse().unwrap()]));

        let endpoint = resolve_endpoint("my-host.example", &mock).await.unwrap();
        let mut builder = AddressSetBuilder::new();
        assert_eq!(add_endpoint(&mut builder, &endpoint).unwrap(), 2);

        let sets = builder.materialize();
        assert_eq!(sets.ipv4, vec!["192.0.2.7"]);
        assert_eq!(sets.ipv6, vec!["2001:db8::7"]);
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let mut mock = MockHostResolver::new();
        mock.expect_lookup()
            .times(1)
            .returning(|host| Err(GeoNftError::ResolutionFailure(host.to_string())));

        let err = resolve_endpoint("nowhere.invalid", &mock).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "nowhere.invalid is not an address and not resolvable"
        );
    }

    #[tokio::test]
    async fn test_resolve_host_literal() {
        let addrs = resolve_host("198.51.100.1", &no_dns()).await.unwrap();
        assert_eq!(addrs, vec!["198.51.100.1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_resolve_host_does_not_accept_networks() {
        let mut mock = MockHostResolver::new();
        mock.expect_lookup()
            .times(1)
            .returning(|host| Err(GeoNftError::ResolutionFailure(host.to_string())));
        assert!(resolve_host("10.0.0.0/8", &mock).await.is_err());
    }

    #[tokio::test]
    async fn test_system_resolver_literal_needs_no_dns() {
        let resolver = SystemResolver::new();
        let addrs = resolver.lookup("127.0.0.1").await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_system_resolver_invalid_name() {
        let resolver = SystemResolver::new();
        // RFC 6761 reserves .invalid, it never resolves
        let err = resolver.lookup("no-such-host.invalid").await.unwrap_err();
        assert!(matches!(err, GeoNftError::ResolutionFailure(_)));
    }
}
