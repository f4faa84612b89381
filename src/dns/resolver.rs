//! DNS resolver trait and implementations.
//!
//! Provides abstraction over DNS resolution to enable:
//! - Testing with mock resolvers
//! - Different forwarding transports (classic UDP, DNS-over-HTTPS)

use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use hickory_proto::op::Message;
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tokio::net::UdpSocket;
use tracing::debug;

use super::doh::DohResolver;
use crate::config::{Config, ResolverMode};
use crate::error::{Result, UpstreamError};

/// Receive buffer for upstream UDP answers (EDNS-sized).
pub const MAX_UDP_DNS_SIZE: usize = 4096;

/// Time allowed for one upstream exchange.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Trait for DNS resolution.
///
/// Implementations can resolve DNS queries through various mechanisms:
/// - Upstream UDP resolver
/// - DNS-over-HTTPS
/// - Mock responses for testing
pub trait DnsResolver: Send + Sync + Clone + 'static {
    /// Resolve a DNS query and return the response.
    fn resolve(&self, query: &Message) -> impl Future<Output = Result<Message>> + Send;
}

/// Classic DNS over UDP.
///
/// Forwards queries to a configured upstream DNS server (e.g., 1.1.1.1).
#[derive(Debug, Clone)]
pub struct UdpResolver {
    upstream_addr: SocketAddr,
    timeout: Duration,
}

impl UdpResolver {
    /// Create a new UDP resolver.
    pub const fn new(upstream_addr: SocketAddr) -> Self {
        Self {
            upstream_addr,
            timeout: UPSTREAM_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub const fn upstream_addr(&self) -> SocketAddr {
        self.upstream_addr
    }

    async fn exchange(&self, query: &Message) -> Result<Message> {
        let local = match self.upstream_addr {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(self.upstream_addr).await?;

        let query_bytes = query.to_bytes()?;
        socket.send(&query_bytes).await?;

        let mut response_buf = vec![0u8; MAX_UDP_DNS_SIZE];
        loop {
            let len = socket.recv(&mut response_buf).await?;
            // Stray datagrams, undecodable or for another id, are not ours.
            match Message::from_bytes(&response_buf[..len]) {
                Ok(response) if response.id() == query.id() => return Ok(response),
                Ok(response) => debug!(id = response.id(), "ignoring reply for another query"),
                Err(err) => debug!(error = %err, "ignoring undecodable datagram"),
            }
        }
    }
}

impl DnsResolver for UdpResolver {
    async fn resolve(&self, query: &Message) -> Result<Message> {
        tokio::time::timeout(self.timeout, self.exchange(query))
            .await
            .map_err(|_| UpstreamError::Timeout {
                upstream: self.upstream_addr.to_string(),
            })?
    }
}

/// The upstream transport selected by configuration.
#[derive(Debug, Clone)]
pub enum UpstreamResolver {
    Udp(UdpResolver),
    Doh(DohResolver),
}

impl UpstreamResolver {
    /// Build the resolver for `config.resolver_mode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTPS client cannot be created.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(match config.resolver_mode {
            ResolverMode::Udp => Self::Udp(UdpResolver::new(config.upstream_resolver)),
            ResolverMode::Doh => Self::Doh(DohResolver::new(&config.doh_url)?),
        })
    }

    /// Human-readable upstream, for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Udp(resolver) => format!("udp://{}", resolver.upstream_addr()),
            Self::Doh(resolver) => resolver.endpoint().to_string(),
        }
    }
}

impl DnsResolver for UpstreamResolver {
    async fn resolve(&self, query: &Message) -> Result<Message> {
        match self {
            Self::Udp(resolver) => resolver.resolve(query).await,
            Self::Doh(resolver) => resolver.resolve(query).await,
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::error::Error;
    use hickory_proto::op::{MessageType, OpCode, Query, ResponseCode};
    use hickory_proto::rr::{Name, RecordType};
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::RwLock;

    /// Resolver answering from a per-name table, NXDOMAIN otherwise.
    #[derive(Clone, Default)]
    pub struct MockResolver {
        responses: Arc<RwLock<HashMap<Name, Message>>>,
        failure: Arc<RwLock<Option<String>>>,
        calls: Arc<AtomicU64>,
    }

    impl MockResolver {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn add_response(&self, name: Name, response: Message) {
            self.responses.write().await.insert(name, response);
        }

        /// Fail every subsequent resolution with `reason`.
        pub async fn set_error(&self, reason: &str) {
            *self.failure.write().await = Some(reason.to_string());
        }

        pub fn resolve_count(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DnsResolver for MockResolver {
        async fn resolve(&self, query: &Message) -> Result<Message> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(reason) = self.failure.read().await.as_ref() {
                return Err(Error::Resolver(reason.clone()));
            }

            let known = match query.queries().first() {
                Some(question) => self.responses.read().await.get(question.name()).cloned(),
                None => None,
            };
            let mut response = known.unwrap_or_else(|| {
                let mut nxdomain = Message::new();
                nxdomain
                    .set_message_type(MessageType::Response)
                    .set_op_code(OpCode::Query)
                    .set_response_code(ResponseCode::NXDomain);
                nxdomain
            });
            response.set_id(query.id());
            Ok(response)
        }
    }

    fn create_query(domain: &str) -> Message {
        let mut message = Message::new();
        message.set_id(1234);
        message.add_query(Query::query(Name::from_str(domain).unwrap(), RecordType::A));
        message
    }

    fn create_response(id: u16) -> Message {
        let mut response = Message::new();
        response
            .set_id(id)
            .set_message_type(MessageType::Response)
            .set_op_code(OpCode::Query)
            .set_response_code(ResponseCode::NoError);
        response
    }

    async fn stub_upstream(reply: impl Fn(Message) -> Option<Message> + Send + 'static) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; MAX_UDP_DNS_SIZE];
            while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
                let query = Message::from_bytes(&buf[..len]).unwrap();
                if let Some(response) = reply(query) {
                    socket.send_to(&response.to_bytes().unwrap(), peer).await.unwrap();
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn should_exchange_query_with_udp_upstream() {
        let upstream = stub_upstream(|query| {
            let mut response = create_response(query.id());
            response.add_queries(query.queries().iter().cloned());
            Some(response)
        })
        .await;
        let resolver = UdpResolver::new(upstream);
        let query = create_query("example.com.");

        let response = resolver.resolve(&query).await.unwrap();

        assert_eq!(response.id(), query.id());
        assert_eq!(response.queries(), query.queries());
    }

    #[tokio::test]
    async fn should_skip_stray_datagrams_before_the_reply() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let upstream = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; MAX_UDP_DNS_SIZE];
            let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
            let query = Message::from_bytes(&buf[..len]).unwrap();
            socket.send_to(&[0xde, 0xad, 0xbe], peer).await.unwrap();
            let other = create_response(query.id().wrapping_add(1));
            socket.send_to(&other.to_bytes().unwrap(), peer).await.unwrap();
            let reply = create_response(query.id());
            socket.send_to(&reply.to_bytes().unwrap(), peer).await.unwrap();
        });
        let resolver = UdpResolver::new(upstream).with_timeout(Duration::from_secs(2));
        let query = create_query("example.com.");

        let response = resolver.resolve(&query).await.unwrap();

        assert_eq!(response.id(), query.id());
        assert_eq!(response.response_code(), ResponseCode::NoError);
    }

    #[tokio::test]
    async fn should_time_out_when_udp_upstream_is_silent() {
        let upstream = stub_upstream(|_| None).await;
        let resolver = UdpResolver::new(upstream).with_timeout(Duration::from_millis(100));

        let result = resolver.resolve(&create_query("example.com.")).await;

        assert!(matches!(
            result,
            Err(Error::Upstream(UpstreamError::Timeout { .. }))
        ));
    }

    #[test]
    fn should_select_transport_from_config() {
        let mut config = Config::default();
        assert!(matches!(
            UpstreamResolver::from_config(&config).unwrap(),
            UpstreamResolver::Udp(_)
        ));

        config.resolver_mode = ResolverMode::Doh;
        let resolver = UpstreamResolver::from_config(&config).unwrap();
        assert!(matches!(resolver, UpstreamResolver::Doh(_)));
        assert_eq!(resolver.describe(), config.doh_url);
    }
}
