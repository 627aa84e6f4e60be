use super::health::{ServerHealth, ServerStatus};
use crate::dns::forwarding::{DnsResponse, ResponseParser};
use crate::dns::transport::{DnsTransport, TcpTransport, UdpTransport};
use dns_forward_domain::{DomainError, ForwardOptions, Protocol, UpstreamEndpoint};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[cfg(feature = "dns-over-rustls")]
use crate::dns::transport::tls::{server_name_for, TlsTransport};

/// Result of one exchange, fed back into the failure streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// One upstream resolver.
///
/// Owns its failure streak, its in-flight count and its idle connections.
/// Health is never stored: it is derived from the streak against the pool's
/// `max_fails` on every read.
pub struct Proxy {
    endpoint: UpstreamEndpoint,
    display: Arc<str>,
    tls_server_name: Option<String>,
    fails: AtomicU32,
    in_flight: AtomicUsize,
    health_check_rd: bool,
    health_check_protocol: Protocol,
    udp: UdpTransport,
    tcp: TcpTransport,
    #[cfg(feature = "dns-over-rustls")]
    tls: Option<TlsTransport>,
}

/// Keeps a proxy's in-flight count raised for as long as it lives.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Client-side TLS settings shared by the TLS upstreams of a pool.
#[derive(Clone)]
pub struct TlsUpstreamConfig {
    pub client_config: Arc<rustls::ClientConfig>,

    /// `tls_servername`; the upstream IP is checked when absent.
    pub server_name: Option<String>,
}

impl Proxy {
    /// Builds a proxy for `endpoint`.
    ///
    /// `tls` is required for TLS endpoints; plain endpoints ignore it.
    pub fn new(
        endpoint: UpstreamEndpoint,
        options: &ForwardOptions,
        expire: Duration,
        tls: Option<&TlsUpstreamConfig>,
    ) -> Result<Self, DomainError> {
        let addr = endpoint.addr;
        let tls = if endpoint.is_tls() { tls } else { None };

        #[cfg(feature = "dns-over-rustls")]
        let tls_transport = match tls {
            Some(config) => Some(TlsTransport::new(
                addr,
                server_name_for(addr, config.server_name.as_deref())?,
                Arc::clone(&config.client_config),
                expire,
            )),
            None if endpoint.is_tls() => {
                return Err(DomainError::TlsConfig(format!(
                    "no TLS client configuration for {}",
                    endpoint
                )))
            }
            None => None,
        };

        #[cfg(not(feature = "dns-over-rustls"))]
        if endpoint.is_tls() {
            tracing::warn!("TLS feature not enabled, falling back to TCP for {}", addr);
        }

        let health_check_protocol = if endpoint.is_tls() {
            Protocol::Tls
        } else if options.force_tcp {
            Protocol::Tcp
        } else {
            Protocol::Udp
        };

        Ok(Self {
            display: Arc::from(endpoint.to_string()),
            tls_server_name: tls.and_then(|config| config.server_name.clone()),
            endpoint,
            fails: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            health_check_rd: options.hc_recursion_desired,
            health_check_protocol,
            udp: UdpTransport::new(addr),
            tcp: TcpTransport::new(addr, expire),
            #[cfg(feature = "dns-over-rustls")]
            tls: tls_transport,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.endpoint.addr
    }

    pub fn endpoint(&self) -> &UpstreamEndpoint {
        &self.endpoint
    }

    pub fn is_tls(&self) -> bool {
        self.endpoint.is_tls()
    }

    /// Configured server name presented to a TLS upstream.
    pub fn tls_server_name(&self) -> Option<&str> {
        self.tls_server_name.as_deref()
    }

    pub fn health_check_recursion_desired(&self) -> bool {
        self.health_check_rd
    }

    /// Protocol the health checker queries with.
    pub fn health_check_protocol(&self) -> Protocol {
        self.health_check_protocol
    }

    pub fn record_outcome(&self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.fails.store(0, Ordering::Relaxed),
            Outcome::Failure => {
                self.fails.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.fails.load(Ordering::Relaxed)
    }

    /// `max_fails == 0` turns failure accounting off: the proxy is never down.
    pub fn is_down(&self, max_fails: u32) -> bool {
        max_fails > 0 && self.consecutive_failures() >= max_fails
    }

    pub fn status(&self, max_fails: u32) -> ServerStatus {
        if self.is_down(max_fails) {
            ServerStatus::Unhealthy
        } else {
            ServerStatus::Healthy
        }
    }

    pub fn health(&self, max_fails: u32) -> ServerHealth {
        ServerHealth {
            server: Arc::clone(&self.display),
            status: self.status(max_fails),
            consecutive_failures: self.consecutive_failures(),
            in_flight: self.in_flight(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Sends `query` once over `protocol` and validates the reply.
    ///
    /// Does not touch the failure streak; callers decide what counts.
    pub async fn exchange(
        &self,
        query: &[u8],
        protocol: Protocol,
        timeout: Duration,
    ) -> Result<DnsResponse, DomainError> {
        let query_id = ResponseParser::message_id(query).ok_or_else(|| {
            DomainError::InvalidDnsQuery("query shorter than a DNS header".to_string())
        })?;

        let _guard = InFlightGuard::enter(&self.in_flight);
        let transport = self.transport(protocol);
        let response = transport.send(query, timeout).await?;

        debug!(
            server = %self.display,
            protocol = %response.protocol_used,
            reused = response.reused,
            "Upstream exchange complete"
        );

        ResponseParser::validate(query_id, response.bytes, self.endpoint.addr)
    }

    fn transport(&self, protocol: Protocol) -> &dyn DnsTransport {
        match protocol {
            Protocol::Udp => &self.udp,
            Protocol::Tcp => &self.tcp,
            #[cfg(feature = "dns-over-rustls")]
            Protocol::Tls => match &self.tls {
                Some(tls) => tls,
                None => &self.tcp,
            },
            #[cfg(not(feature = "dns-over-rustls"))]
            Protocol::Tls => &self.tcp,
        }
    }

    /// Closes every cached connection.
    pub fn close(&self) {
        self.tcp.close_idle();
        #[cfg(feature = "dns-over-rustls")]
        if let Some(tls) = &self.tls {
            tls.close_idle();
        }
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("endpoint", &self.display)
            .field("fails", &self.consecutive_failures())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
