pub mod admission;
pub mod health;
pub mod pool;
pub mod proxy;
pub mod query;
pub mod strategy;

pub use admission::{AdmissionGate, AdmissionPermit};
pub use health::{HealthChecker, ServerHealth, ServerStatus};
pub use pool::ProxyPool;
pub use proxy::{Outcome, Proxy, TlsUpstreamConfig};
pub use query::ForwardResponse;
pub use strategy::Selector;
