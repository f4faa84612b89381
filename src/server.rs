//! DNS gatekeeper server.
//!
//! Answers blocked names locally with NXDOMAIN and forwards everything else
//! upstream. Designed with trait-based dependencies for testability.

use std::net::SocketAddr;
use std::sync::Arc;

use hickory_proto::op::{Message, OpCode};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::dns::{Blocker, DnsResolver, QueryCounts, QueryStats, reply_to};
use crate::error::{NetworkError, Result};
use crate::metrics::{DNS_BLOCKED_TOTAL, DNS_QUERIES_TOTAL, DNS_UPSTREAM_ERRORS_TOTAL};

/// Largest datagram accepted from clients.
const MAX_DATAGRAM_SIZE: usize = 4096;

/// DNS query handler that processes queries using the provided dependencies.
///
/// This struct encapsulates the per-query logic, separated from the socket
/// loop for easier testing.
pub struct QueryHandler<R>
where
    R: DnsResolver,
{
    resolver: R,
    blocker: Arc<Blocker>,
    stats: Arc<QueryStats>,
}

impl<R> QueryHandler<R>
where
    R: DnsResolver,
{
    /// Create a new query handler.
    pub fn new(resolver: R, blocker: Blocker, stats: Arc<QueryStats>) -> Self {
        Self {
            resolver,
            blocker: Arc::new(blocker),
            stats,
        }
    }

    pub fn stats(&self) -> QueryCounts {
        self.stats.snapshot()
    }

    /// Handle a DNS query and return the response.
    ///
    /// Every question is counted. If any question names a blocked domain the
    /// reply is NXDOMAIN and upstream is never contacted; otherwise the query
    /// is forwarded once. Upstream failures yield an empty NOERROR reply.
    #[instrument(skip(self, query), fields(id = query.id(), domain))]
    pub async fn handle_query(&self, query: Message) -> Message {
        if query.op_code() != OpCode::Query {
            debug!(op_code = ?query.op_code(), "ignoring non-query opcode");
            return reply_to(&query);
        }

        let mut blocked = false;
        for question in query.queries() {
            let name = question.name();
            let is_blocked = self.blocker.is_blocked(name);
            self.stats.record(is_blocked);
            ::metrics::counter!(DNS_QUERIES_TOTAL).increment(1);
            if is_blocked {
                ::metrics::counter!(DNS_BLOCKED_TOTAL).increment(1);
                info!(domain = %name, "blocked");
                blocked = true;
            }
        }

        if let Some(question) = query.queries().first() {
            tracing::Span::current().record("domain", question.name().to_string());
        }

        if blocked {
            return Blocker::blocked_response(&query);
        }
        if query.queries().is_empty() {
            return reply_to(&query);
        }

        match self.resolver.resolve(&query).await {
            Ok(upstream) => relay(&query, upstream),
            Err(err) => {
                ::metrics::counter!(DNS_UPSTREAM_ERRORS_TOTAL).increment(1);
                warn!(error = %err, "upstream resolution failed");
                reply_to(&query)
            }
        }
    }
}

impl<R> Clone for QueryHandler<R>
where
    R: DnsResolver,
{
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            blocker: Arc::clone(&self.blocker),
            stats: Arc::clone(&self.stats),
        }
    }
}

/// Build the client reply from an upstream answer.
fn relay(query: &Message, upstream: Message) -> Message {
    let mut response = reply_to(query);
    response.set_response_code(upstream.response_code());
    response.add_answers(upstream.answers().iter().cloned());
    response.add_name_servers(upstream.name_servers().iter().cloned());
    response.add_additionals(upstream.additionals().iter().cloned());
    response
}

/// UDP front end of the gatekeeper.
pub struct DnsServer<R>
where
    R: DnsResolver,
{
    socket: Arc<UdpSocket>,
    handler: QueryHandler<R>,
}

impl<R> DnsServer<R>
where
    R: DnsResolver,
{
    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, handler: QueryHandler<R>) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| NetworkError::Bind { addr, source })?;
        Ok(Self {
            socket: Arc::new(socket),
            handler,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve until `shutdown` fires. Each datagram is handled on its own task.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(addr = %self.local_addr()?, "DNS gatekeeper listening");
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let (len, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(err) => {
                        warn!(error = %err, "failed to receive datagram");
                        continue;
                    }
                },
            };

            let query = match Message::from_bytes(&buf[..len]) {
                Ok(query) => query,
                Err(err) => {
                    warn!(%peer, error = %err, "failed to parse DNS message");
                    continue;
                }
            };

            let handler = self.handler.clone();
            let socket = Arc::clone(&self.socket);
            tokio::spawn(async move {
                let response = handler.handle_query(query).await;
                match response.to_bytes() {
                    Ok(bytes) => {
                        if let Err(err) = socket.send_to(&bytes, peer).await {
                            warn!(%peer, error = %err, "failed to send response");
                        }
                    }
                    Err(err) => error!(error = %err, "failed to encode response"),
                }
            });
        }

        info!("DNS gatekeeper stopped");
        Ok(())
    }
}
