pub mod forwarding;
pub mod load_balancer;
pub mod server;
pub mod transport;

pub use forwarding::{DnsResponse, MessageBuilder, ResponseParser};
pub use load_balancer::{
    AdmissionGate, AdmissionPermit, ForwardResponse, HealthChecker, Outcome, Proxy, ProxyPool,
    Selector, ServerHealth, ServerStatus, TlsUpstreamConfig,
};
pub use server::DnsServerHandler;
