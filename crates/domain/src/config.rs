pub mod directive;
pub mod duration;
pub mod errors;
pub mod forward;
pub mod health;
pub mod logging;
pub mod root;
pub mod server;
pub mod tls;
pub mod upstream;

pub use duration::parse_duration;
pub use errors::ConfigError;
pub use forward::{normalize_zone, ForwardConfig, ForwardOptions};
pub use health::HealthCheckConfig;
pub use logging::LoggingConfig;
pub use root::{CliOverrides, Config, ForwardSection};
pub use server::ServerConfig;
pub use tls::TlsOptions;
pub use upstream::ForwardPolicy;
