//! TCP Transport for DNS queries (RFC 1035 §4.2.2, RFC 7766)
//!
//! Messages carry a two-byte big-endian length prefix. Idle connections are
//! kept in the owning proxy's cache and reused; a cached stream that fails
//! mid-exchange is dropped and the query is sent once more on a fresh one.

use super::conn_cache::ConnCache;
use super::{DnsTransport, TransportResponse};
use async_trait::async_trait;
use bytes::Bytes;
use dns_forward_domain::{DomainError, Protocol};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

pub struct TcpTransport {
    server_addr: SocketAddr,
    cache: ConnCache<TcpStream>,
}

impl TcpTransport {
    pub fn new(server_addr: SocketAddr, expire: Duration) -> Self {
        Self {
            server_addr,
            cache: ConnCache::new(expire),
        }
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn idle_connections(&self) -> usize {
        self.cache.len()
    }

    async fn connect_new(&self, deadline: Instant) -> Result<TcpStream, DomainError> {
        let stream = connect(self.server_addr, deadline).await?;
        debug!(server = %self.server_addr, "TCP connection established");
        Ok(stream)
    }
}

/// Opens a TCP connection that must be up by `deadline`, with Nagle disabled.
pub(crate) async fn connect(
    server_addr: SocketAddr,
    deadline: Instant,
) -> Result<TcpStream, DomainError> {
    let server = server_addr.to_string();
    let stream = timeout_at(deadline, TcpStream::connect(server_addr))
        .await
        .map_err(|_| DomainError::TransportTimeout {
            server: server.clone(),
        })?
        .map_err(|e| DomainError::from_io(server.clone(), &e))?;

    stream
        .set_nodelay(true)
        .map_err(|e| DomainError::from_io(server, &e))?;

    Ok(stream)
}

/// Writes one framed query and reads one framed response, both done by
/// `deadline`.
pub(crate) async fn exchange_framed<S>(
    stream: &mut S,
    message_bytes: &[u8],
    deadline: Instant,
    server_addr: SocketAddr,
) -> Result<Vec<u8>, DomainError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let server = || server_addr.to_string();

    timeout_at(deadline, send_with_length_prefix(stream, message_bytes))
        .await
        .map_err(|_| DomainError::TransportTimeout { server: server() })?
        .map_err(|e| DomainError::from_io(server(), &e))?;

    timeout_at(deadline, read_with_length_prefix(stream))
        .await
        .map_err(|_| DomainError::TransportTimeout { server: server() })?
        .map_err(|e| DomainError::from_io(server(), &e))
}

#[async_trait]
impl DnsTransport for TcpTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        // one budget for the cached try, the reconnect and the retry
        let deadline = Instant::now() + timeout;
        let mut retried = false;

        if let Some(mut stream) = self.cache.take() {
            match exchange_framed(&mut stream, message_bytes, deadline, self.server_addr).await {
                Ok(response_bytes) => {
                    debug!(server = %self.server_addr, "TCP query via cached connection");
                    self.cache.put(stream);
                    return Ok(TransportResponse {
                        bytes: Bytes::from(response_bytes),
                        protocol_used: Protocol::Tcp,
                        reused: true,
                    });
                }
                Err(e) if Instant::now() >= deadline => return Err(e),
                Err(e) => {
                    debug!(server = %self.server_addr, error = %e, "Cached TCP connection failed, reconnecting");
                    retried = true;
                }
            }
        }

        let mut stream = self.connect_new(deadline).await?;
        let response_bytes =
            exchange_framed(&mut stream, message_bytes, deadline, self.server_addr).await?;

        debug!(
            server = %self.server_addr,
            response_len = response_bytes.len(),
            retried,
            "TCP response received"
        );

        self.cache.put(stream);

        Ok(TransportResponse {
            bytes: Bytes::from(response_bytes),
            protocol_used: Protocol::Tcp,
            reused: false,
        })
    }

    fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }

    fn close_idle(&self) {
        self.cache.clear();
    }
}

pub async fn send_with_length_prefix<S>(stream: &mut S, message_bytes: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let length = u16::try_from(message_bytes.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("DNS message too large: {} bytes", message_bytes.len()),
        )
    })?;

    // one write keeps prefix and body in the same segment
    let mut framed = Vec::with_capacity(message_bytes.len() + 2);
    framed.extend_from_slice(&length.to_be_bytes());
    framed.extend_from_slice(message_bytes);

    stream.write_all(&framed).await?;
    stream.flush().await
}

pub async fn read_with_length_prefix<S>(stream: &mut S) -> io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;

    let response_len = u16::from_be_bytes(len_buf) as usize;
    let mut response = vec![0u8; response_len];
    stream.read_exact(&mut response).await?;

    Ok(response)
}
