use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{request::Parts, Extensions, HeaderMap};
use sqlx::types::ipnetwork::IpNetwork;

use crate::AppState;

/// Resolves the client address of a request. The TCP peer is authoritative;
/// forwarding headers are read only when that peer is a trusted proxy.
#[derive(Debug, Clone, Default)]
pub struct ClientIpResolver {
    trusted_proxies: Arc<Vec<IpNetwork>>,
}

impl ClientIpResolver {
    pub fn new(trusted_proxies: Vec<IpNetwork>) -> Self {
        Self {
            trusted_proxies: Arc::new(trusted_proxies),
        }
    }

    fn is_trusted(&self, ip: IpAddr) -> bool {
        self.trusted_proxies.iter().any(|net| net.contains(ip))
    }

    /// Walks `X-Forwarded-For` from the right and stops at the first hop that
    /// is not a trusted proxy. `X-Real-IP` is used only without that header.
    pub fn resolve(&self, peer: Option<IpAddr>, headers: &HeaderMap) -> Option<IpAddr> {
        let peer = peer?;
        if !self.is_trusted(peer) {
            return Some(peer);
        }

        if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            let mut client = peer;
            for hop in forwarded.rsplit(',') {
                match hop.trim().parse::<IpAddr>() {
                    Ok(ip) => {
                        client = ip;
                        if !self.is_trusted(ip) {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            return Some(client);
        }

        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .or(Some(peer))
    }
}

/// Peer address recorded by `into_make_service_with_connect_info`, with
/// IPv4-mapped IPv6 peers unwrapped to plain IPv4.
pub fn peer_addr(extensions: &Extensions) -> Option<IpAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_canonical())
}

/// Extractor for the resolved client address; `None` when the server was not
/// started with connect info.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub Option<IpAddr>);

#[async_trait]
impl FromRequestParts<AppState> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(
            state
                .client_ips
                .resolve(peer_addr(&parts.extensions), &parts.headers),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn untrusted_peer_ignores_forwarding_headers() {
        let resolver = ClientIpResolver::new(vec!["127.0.0.1/32".parse().unwrap()]);
        let mut headers = forwarded("10.20.0.1");
        headers.insert("x-real-ip", HeaderValue::from_static("10.20.0.2"));

        assert_eq!(resolver.resolve(Some(ip("203.0.113.9")), &headers), Some(ip("203.0.113.9")));
        assert_eq!(ClientIpResolver::default().resolve(Some(ip("127.0.0.1")), &headers), Some(ip("127.0.0.1")));
    }

    #[test]
    fn trusted_proxy_yields_rightmost_untrusted_hop() {
        let resolver = ClientIpResolver::new(vec![
            "127.0.0.1/32".parse().unwrap(),
            "172.16.0.0/12".parse().unwrap(),
        ]);
        let peer = Some(ip("127.0.0.1"));

        let spoofed = forwarded("10.20.0.1, 203.0.113.9, 172.16.0.4");
        assert_eq!(resolver.resolve(peer, &spoofed), Some(ip("203.0.113.9")));

        let all_trusted = forwarded("172.16.0.9, 172.16.0.4");
        assert_eq!(resolver.resolve(peer, &all_trusted), Some(ip("172.16.0.9")));

        let garbage = forwarded("unknown, 198.51.100.3");
        assert_eq!(resolver.resolve(peer, &garbage), Some(ip("198.51.100.3")));
    }

    #[test]
    fn trusted_proxy_falls_back_to_real_ip_then_peer() {
        let resolver = ClientIpResolver::new(vec!["127.0.0.1/32".parse().unwrap()]);
        let peer = Some(ip("127.0.0.1"));

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("192.168.1.1"));
        assert_eq!(resolver.resolve(peer, &headers), Some(ip("192.168.1.1")));

        assert_eq!(resolver.resolve(peer, &HeaderMap::new()), peer);
        assert_eq!(resolver.resolve(None, &headers), None);
    }
}
