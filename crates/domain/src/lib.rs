//! dns-forward domain layer
pub mod config;
pub mod dns_protocol;
pub mod errors;
pub mod resolv_conf;

pub use config::{
    parse_duration, CliOverrides, Config, ConfigError, ForwardConfig, ForwardOptions,
    ForwardPolicy, HealthCheckConfig, TlsOptions,
};
pub use dns_protocol::{Protocol, UpstreamEndpoint, UpstreamTransport};
pub use errors::DomainError;
