//! UDP Transport for DNS queries (RFC 1035 §4.2.1)
//!
//! Messages are sent as-is (no framing). Every exchange uses a fresh socket
//! connected to the upstream, so an ICMP port-unreachable surfaces as
//! `ConnectionRefused` instead of a timeout, and datagrams from other sources
//! are filtered by the kernel.
//! If the response has the TC (truncated) bit set, the caller should retry via TCP.

use super::{DnsTransport, TransportResponse};
use async_trait::async_trait;
use bytes::Bytes;
use dns_forward_domain::{DomainError, Protocol};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::debug;

/// Largest datagram a DNS response can occupy.
const MAX_UDP_RESPONSE_SIZE: usize = 65_535;

/// DNS over UDP transport
pub struct UdpTransport {
    server_addr: SocketAddr,
}

impl UdpTransport {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self { server_addr }
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    fn bind_addr(&self) -> SocketAddr {
        if self.server_addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        }
    }

    fn io_error(&self, e: &std::io::Error) -> DomainError {
        DomainError::from_io(self.server_addr.to_string(), e)
    }

    fn timeout_error(&self) -> DomainError {
        DomainError::TransportTimeout {
            server: self.server_addr.to_string(),
        }
    }
}

#[async_trait]
impl DnsTransport for UdpTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        let socket = UdpSocket::bind(self.bind_addr())
            .await
            .map_err(|e| self.io_error(&e))?;
        socket
            .connect(self.server_addr)
            .await
            .map_err(|e| self.io_error(&e))?;

        let bytes_sent = tokio::time::timeout(timeout, socket.send(message_bytes))
            .await
            .map_err(|_| self.timeout_error())?
            .map_err(|e| self.io_error(&e))?;

        debug!(
            server = %self.server_addr,
            bytes_sent = bytes_sent,
            "UDP query sent"
        );

        let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        let bytes_received = tokio::time::timeout(timeout, socket.recv(&mut recv_buf))
            .await
            .map_err(|_| self.timeout_error())?
            .map_err(|e| self.io_error(&e))?;

        recv_buf.truncate(bytes_received);

        debug!(
            server = %self.server_addr,
            bytes_received = bytes_received,
            "UDP response received"
        );

        Ok(TransportResponse {
            bytes: Bytes::from(recv_buf),
            protocol_used: Protocol::Udp,
            reused: false,
        })
    }

    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udp_transport_creation() {
        let addr: SocketAddr = "8.8.8.8:53".parse().unwrap();
        let transport = UdpTransport::new(addr);
        assert_eq!(transport.server_addr(), addr);
        assert_eq!(transport.protocol(), Protocol::Udp);
        assert!(transport.bind_addr().is_ipv4());
    }

    #[test]
    fn test_udp_transport_ipv6() {
        let addr: SocketAddr = "[2001:4860:4860::8888]:53".parse().unwrap();
        let transport = UdpTransport::new(addr);
        assert!(transport.bind_addr().is_ipv6());
    }

    #[tokio::test]
    async fn test_udp_send_to_closed_port_fails_fast() {
        let spare = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = spare.local_addr().unwrap();
        drop(spare);

        let transport = UdpTransport::new(addr);
        let query = [0x12, 0x34, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0];
        let result = transport.send(&query, Duration::from_millis(500)).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().is_transport_error());
    }
}
