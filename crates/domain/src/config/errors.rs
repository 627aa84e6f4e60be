#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    FileRead(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("unknown property '{0}'")]
    UnknownProperty(String),

    #[error("{0}: wrong argument count")]
    ArgumentCount(String),

    #[error("this plugin can only be used once per server block")]
    DuplicatePlugin,

    #[error("not an IP address or file: '{0}'")]
    NotAnAddress(String),

    #[error("'{scheme}' is not supported as a destination protocol in forward: {address}")]
    UnsupportedProtocol { scheme: String, address: String },

    #[error("no nameservers found in '{0}'")]
    NoNameservers(String),

    #[error("more than {max} upstreams configured: {count}")]
    TooManyUpstreams { count: usize, max: usize },

    #[error("unable to normalize '{0}'")]
    Normalize(String),

    #[error("{option}: invalid value '{value}': {reason}")]
    InvalidValue {
        option: String,
        value: String,
        reason: String,
    },

    #[error("{option} can't be negative: {value}")]
    Negative { option: String, value: String },

    #[error("invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("health_check: unknown option {0}")]
    UnknownHealthCheckOption(String),

    #[error("unknown policy '{0}'")]
    UnknownPolicy(String),
}
