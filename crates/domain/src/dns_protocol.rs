use crate::config::ConfigError;
use crate::resolv_conf;
use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_DNS_PORT: u16 = 53;
pub const DEFAULT_TLS_PORT: u16 = 853;

/// Wire transport used for a single exchange with an upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Udp,
    Tcp,
    Tls,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Udp => "UDP",
            Protocol::Tcp => "TCP",
            Protocol::Tls => "TLS",
        }
    }

    pub fn is_stream(&self) -> bool {
        !matches!(self, Protocol::Udp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport an upstream was configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamTransport {
    /// UDP with TCP fallback, or TCP when forced.
    Plain,
    /// DNS over TLS (RFC 7858).
    Tls,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpstreamEndpoint {
    pub addr: SocketAddr,
    pub transport: UpstreamTransport,
}

impl UpstreamEndpoint {
    pub fn plain(addr: SocketAddr) -> Self {
        Self {
            addr,
            transport: UpstreamTransport::Plain,
        }
    }

    pub fn tls(addr: SocketAddr) -> Self {
        Self {
            addr,
            transport: UpstreamTransport::Tls,
        }
    }

    pub fn is_tls(&self) -> bool {
        self.transport == UpstreamTransport::Tls
    }

    /// Expands one `TO` argument into endpoints.
    ///
    /// An existing path without a scheme is read as a resolv.conf file and every
    /// `nameserver` line becomes a plain upstream on port 53.
    pub fn expand(spec: &str) -> Result<Vec<Self>, ConfigError> {
        if !spec.contains("://") && Path::new(spec).exists() {
            let nameservers = resolv_conf::read_nameservers(Path::new(spec))?;
            if nameservers.is_empty() {
                return Err(ConfigError::NoNameservers(spec.to_string()));
            }
            return Ok(nameservers
                .into_iter()
                .map(|ip| Self::plain(SocketAddr::new(ip, DEFAULT_DNS_PORT)))
                .collect());
        }
        Ok(vec![spec.parse()?])
    }

    pub fn expand_all<S: AsRef<str>>(specs: &[S]) -> Result<Vec<Self>, ConfigError> {
        let mut endpoints = Vec::with_capacity(specs.len());
        for spec in specs {
            endpoints.extend(Self::expand(spec.as_ref())?);
        }
        Ok(endpoints)
    }
}

fn parse_host(host: &str, default_port: u16, input: &str) -> Result<SocketAddr, ConfigError> {
    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }
    if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        if let Ok(ip) = inner.parse::<Ipv6Addr>() {
            return Ok(SocketAddr::new(IpAddr::V6(ip), default_port));
        }
    }
    Err(ConfigError::NotAnAddress(input.to_string()))
}

impl FromStr for UpstreamEndpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once("://") {
            Some(("tls", host)) => Ok(Self::tls(parse_host(host, DEFAULT_TLS_PORT, s)?)),
            Some(("dns", host)) => Ok(Self::plain(parse_host(host, DEFAULT_DNS_PORT, s)?)),
            Some((scheme, _)) => Err(ConfigError::UnsupportedProtocol {
                scheme: scheme.to_string(),
                address: s.to_string(),
            }),
            None => Ok(Self::plain(parse_host(s, DEFAULT_DNS_PORT, s)?)),
        }
    }
}

impl fmt::Display for UpstreamEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transport {
            UpstreamTransport::Plain => write!(f, "{}", self.addr),
            UpstreamTransport::Tls => write!(f, "tls://{}", self.addr),
        }
    }
}
