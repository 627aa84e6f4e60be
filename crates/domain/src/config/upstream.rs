use super::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How the starting upstream is picked for each request.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForwardPolicy {
    #[default]
    Random,

    RoundRobin,

    Sequential,
}

impl ForwardPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::RoundRobin => "round_robin",
            Self::Sequential => "sequential",
        }
    }
}

impl FromStr for ForwardPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(Self::Random),
            "round_robin" => Ok(Self::RoundRobin),
            "sequential" => Ok(Self::Sequential),
            other => Err(ConfigError::UnknownPolicy(other.to_string())),
        }
    }
}
