use crate::config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid DNS query: {0}")]
    InvalidDnsQuery(String),

    #[error("Invalid DNS response: {0}")]
    InvalidDnsResponse(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("Transport timeout talking to {server}")]
    TransportTimeout { server: String },

    #[error("Transport connection refused by {server}")]
    TransportConnectionRefused { server: String },

    #[error("Transport connection reset by {server}")]
    TransportConnectionReset { server: String },

    #[error("Concurrent queries exceeded maximum {limit}")]
    AdmissionDenied { limit: usize },

    #[error("Query cancelled")]
    QueryCancelled,

    #[error("All upstream servers are unreachable")]
    TransportAllServersUnreachable,
}

impl DomainError {
    /// Maps an I/O error raised while talking to `server` onto the transport taxonomy.
    pub fn from_io(server: impl Into<String>, error: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        let server = server.into();
        match error.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Self::TransportTimeout { server },
            ErrorKind::ConnectionRefused => Self::TransportConnectionRefused { server },
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => Self::TransportConnectionReset { server },
            // raised before anything reaches the wire, e.g. a query too long to frame
            ErrorKind::InvalidInput => Self::InvalidDnsQuery(format!("{}: {}", server, error)),
            _ => Self::IoError(format!("{}: {}", server, error)),
        }
    }

    /// Errors that count against the upstream that raised them.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::TransportTimeout { .. }
                | Self::TransportConnectionRefused { .. }
                | Self::TransportConnectionReset { .. }
                | Self::InvalidDnsResponse(_)
                | Self::IoError(_)
        )
    }
}
