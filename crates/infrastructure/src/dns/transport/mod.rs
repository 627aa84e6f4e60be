pub mod conn_cache;
pub mod tcp;
#[cfg(feature = "dns-over-rustls")]
pub mod tls;
pub mod udp;

use async_trait::async_trait;
use bytes::Bytes;
use dns_forward_domain::{DomainError, Protocol};
use std::time::Duration;

pub use conn_cache::{ConnCache, IdleCheck};
pub use tcp::TcpTransport;
#[cfg(feature = "dns-over-rustls")]
pub use tls::{build_client_config, TlsTransport};
pub use udp::UdpTransport;

#[derive(Debug)]
pub struct TransportResponse {
    pub bytes: Bytes,

    pub protocol_used: Protocol,

    /// Whether the exchange ran on a cached stream.
    pub reused: bool,
}

/// One way of exchanging a single DNS message with a single upstream.
#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError>;

    fn protocol(&self) -> Protocol;

    /// Drops any idle connections held by this transport.
    fn close_idle(&self) {}
}
