use super::proxy::Proxy;
use bytes::Bytes;
use dns_forward_domain::{DomainError, Protocol};
use hickory_proto::op::ResponseCode;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Reply relayed back to the client, with where and how it was obtained.
#[derive(Debug, Clone)]
pub struct ForwardResponse {
    pub bytes: Bytes,
    pub rcode: ResponseCode,
    pub server: SocketAddr,
    pub protocol: Protocol,
    pub latency_ms: u64,
}

/// Runs one attempt against a single proxy.
///
/// A truncated UDP reply is retried over TCP against the same proxy before
/// the attempt counts as done. Both legs share the per-attempt `timeout`
/// budget.
pub async fn query_proxy(
    proxy: &Proxy,
    query: &[u8],
    protocol: Protocol,
    timeout: Duration,
) -> Result<ForwardResponse, DomainError> {
    let start = Instant::now();
    let response = proxy.exchange(query, protocol, timeout).await?;
    if response.is_server_error() {
        // still a valid answer; relayed as-is
        debug!(server = %proxy.addr(), rcode = %response.rcode, "Upstream answered with an error rcode");
    }

    if response.truncated && protocol == Protocol::Udp {
        debug!(
            server = %proxy.addr(),
            "Response truncated (TC bit), retrying via TCP"
        );

        let remaining = timeout
            .checked_sub(start.elapsed())
            .filter(|d| !d.is_zero())
            .ok_or_else(|| DomainError::TransportTimeout {
                server: proxy.addr().to_string(),
            })?;

        let tcp_response = proxy.exchange(query, Protocol::Tcp, remaining).await?;
        return Ok(ForwardResponse {
            bytes: tcp_response.bytes,
            rcode: tcp_response.rcode,
            server: proxy.addr(),
            protocol: Protocol::Tcp,
            latency_ms: start.elapsed().as_millis() as u64,
        });
    }

    Ok(ForwardResponse {
        bytes: response.bytes,
        rcode: response.rcode,
        server: proxy.addr(),
        protocol,
        latency_ms: start.elapsed().as_millis() as u64,
    })
}
