//! Upstream side of dns-forward: transports, proxies, health checking and the
//! forwarding pool.
pub mod dns;

pub use dns::{
    AdmissionGate, AdmissionPermit, DnsServerHandler, ForwardResponse, HealthChecker, Outcome,
    Proxy, ProxyPool, Selector, ServerHealth, ServerStatus, TlsUpstreamConfig,
};
