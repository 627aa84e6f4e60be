use super::duration::parse_duration;
use super::errors::ConfigError;
use super::health::HealthCheckConfig;
use super::tls::TlsOptions;
use super::upstream::ForwardPolicy;
use crate::dns_protocol::{Protocol, UpstreamEndpoint};
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::time::Duration;

pub const DEFAULT_MAX_FAILS: u32 = 2;
pub const MAX_UPSTREAMS: usize = 15;

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;

/// Transport flags recorded from the directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardOptions {
    pub force_tcp: bool,
    pub prefer_udp: bool,
    pub hc_recursion_desired: bool,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            force_tcp: false,
            prefer_udp: false,
            hc_recursion_desired: true,
        }
    }
}

impl ForwardOptions {
    /// Picks the protocol for a plain upstream given the client's transport.
    ///
    /// `force_tcp` wins over `prefer_udp` when both are set.
    pub fn negotiate(&self, client: Protocol) -> Protocol {
        if self.force_tcp {
            Protocol::Tcp
        } else if self.prefer_udp {
            Protocol::Udp
        } else if client.is_stream() {
            Protocol::Tcp
        } else {
            Protocol::Udp
        }
    }
}

/// Everything needed to build a forwarding pool for one zone.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardConfig {
    /// Normalized zone this pool serves.
    pub from: String,

    /// Normalized sub-zones that are never forwarded.
    pub ignored: Vec<String>,

    pub upstreams: Vec<UpstreamEndpoint>,

    pub options: ForwardOptions,

    pub max_fails: u32,

    /// Ceiling on in-flight queries; 0 is unbounded.
    pub max_concurrent: usize,

    /// Idle lifetime of cached upstream connections.
    pub expire: Duration,

    pub policy: ForwardPolicy,

    pub health_check: HealthCheckConfig,

    /// Per-attempt I/O timeout.
    pub timeout: Duration,

    pub tls: TlsOptions,
}

impl ForwardConfig {
    pub fn new<S: AsRef<str>>(from: &str, to: &[S]) -> Result<Self, ConfigError> {
        if to.is_empty() {
            return Err(ConfigError::ArgumentCount("forward".to_string()));
        }

        let upstreams = UpstreamEndpoint::expand_all(to)?;
        if upstreams.len() > MAX_UPSTREAMS {
            return Err(ConfigError::TooManyUpstreams {
                count: upstreams.len(),
                max: MAX_UPSTREAMS,
            });
        }

        Ok(Self {
            from: normalize_zone(from)?,
            ignored: Vec::new(),
            upstreams,
            options: ForwardOptions::default(),
            max_fails: DEFAULT_MAX_FAILS,
            max_concurrent: 0,
            expire: default_expire(),
            policy: ForwardPolicy::default(),
            health_check: HealthCheckConfig::default(),
            timeout: default_timeout(),
            tls: TlsOptions::default(),
        })
    }

    /// Applies one option line from the directive block.
    pub fn apply_option(&mut self, name: &str, args: &[&str]) -> Result<(), ConfigError> {
        match name {
            "except" => {
                if args.is_empty() {
                    return Err(ConfigError::ArgumentCount(name.to_string()));
                }
                for zone in args {
                    self.ignored.push(normalize_zone(zone)?);
                }
            }
            "force_tcp" => {
                expect_no_args(name, args)?;
                self.options.force_tcp = true;
            }
            "prefer_udp" => {
                expect_no_args(name, args)?;
                self.options.prefer_udp = true;
            }
            "max_fails" => {
                let value = parse_non_negative(name, single_arg(name, args)?)?;
                self.max_fails = u32::try_from(value).map_err(|e| ConfigError::InvalidValue {
                    option: name.to_string(),
                    value: value.to_string(),
                    reason: e.to_string(),
                })?;
            }
            "max_concurrent" => {
                let value = parse_non_negative(name, single_arg(name, args)?)?;
                self.max_concurrent =
                    usize::try_from(value).map_err(|e| ConfigError::InvalidValue {
                        option: name.to_string(),
                        value: value.to_string(),
                        reason: e.to_string(),
                    })?;
            }
            "health_check" => match args {
                [interval] => {
                    self.health_check.interval = parse_duration(interval)?;
                    self.options.hc_recursion_desired = true;
                }
                [interval, flag] => {
                    self.health_check.interval = parse_duration(interval)?;
                    if *flag != "no_rec" {
                        return Err(ConfigError::UnknownHealthCheckOption(flag.to_string()));
                    }
                    self.options.hc_recursion_desired = false;
                }
                _ => return Err(ConfigError::ArgumentCount(name.to_string())),
            },
            "expire" => {
                self.expire = parse_duration(single_arg(name, args)?)?;
            }
            "tls" => self.tls.set_files(args)?,
            "tls_servername" => {
                self.tls.server_name = Some(single_arg(name, args)?.to_string());
            }
            "policy" => {
                self.policy = single_arg(name, args)?.parse()?;
            }
            other => return Err(ConfigError::UnknownProperty(other.to_string())),
        }
        Ok(())
    }

    /// Server name presented to TLS upstreams, if one was configured.
    pub fn tls_server_name(&self) -> Option<&str> {
        self.tls.server_name.as_deref()
    }

    /// Whether a query for `qname` belongs to this pool: inside `from` and
    /// outside every `except` zone.
    pub fn is_routable(&self, qname: &str) -> bool {
        let name = fqdn_lower(qname);
        is_subdomain(&name, &self.from) && !self.ignored.iter().any(|z| is_subdomain(&name, z))
    }
}

fn default_expire() -> Duration {
    Duration::from_secs(10)
}

fn default_timeout() -> Duration {
    Duration::from_secs(2)
}

fn expect_no_args(name: &str, args: &[&str]) -> Result<(), ConfigError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ArgumentCount(name.to_string()))
    }
}

fn single_arg<'a>(name: &str, args: &[&'a str]) -> Result<&'a str, ConfigError> {
    match args {
        [value] => Ok(*value),
        _ => Err(ConfigError::ArgumentCount(name.to_string())),
    }
}

fn parse_non_negative(option: &str, value: &str) -> Result<u64, ConfigError> {
    let parsed: i64 = value.parse().map_err(|e: std::num::ParseIntError| {
        ConfigError::InvalidValue {
            option: option.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        }
    })?;
    if parsed < 0 {
        return Err(ConfigError::Negative {
            option: option.to_string(),
            value: value.to_string(),
        });
    }
    Ok(parsed as u64)
}

fn fqdn_lower(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    if lower.ends_with('.') {
        lower
    } else {
        format!("{}.", lower)
    }
}

fn is_subdomain(child: &str, parent: &str) -> bool {
    parent == "."
        || child == parent
        || (child.len() > parent.len()
            && child.ends_with(parent)
            && child.as_bytes()[child.len() - parent.len() - 1] == b'.')
}

/// Normalizes a zone argument into a lower-case FQDN.
///
/// CIDR notation is turned into the matching reverse zone, truncated to whole
/// octets (IPv4) or nibbles (IPv6): `10.9.3.0/18` becomes `0.9.10.in-addr.arpa.`.
pub fn normalize_zone(zone: &str) -> Result<String, ConfigError> {
    if zone.contains('/') {
        let network: IpNetwork = zone
            .parse()
            .map_err(|_| ConfigError::Normalize(zone.to_string()))?;
        return Ok(reverse_zone(network));
    }

    let name = fqdn_lower(zone);
    if name == "." {
        return Ok(name);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ConfigError::Normalize(zone.to_string()));
    }
    let labels_ok = name
        .trim_end_matches('.')
        .split('.')
        .all(|label| !label.is_empty() && label.len() <= MAX_LABEL_LEN);
    if !labels_ok {
        return Err(ConfigError::Normalize(zone.to_string()));
    }
    Ok(name)
}

fn reverse_zone(network: IpNetwork) -> String {
    match network.network() {
        IpAddr::V4(addr) => {
            let octets = (network.prefix() as usize).div_ceil(8);
            let mut labels: Vec<String> = addr.octets()[..octets]
                .iter()
                .map(|o| o.to_string())
                .collect();
            labels.reverse();
            labels.push("in-addr.arpa.".to_string());
            labels.join(".")
        }
        IpAddr::V6(addr) => {
            let nibbles = (network.prefix() as usize).div_ceil(4);
            let mut labels: Vec<String> = addr
                .octets()
                .iter()
                .flat_map(|b| [b >> 4, b & 0x0f])
                .take(nibbles)
                .map(|n| format!("{:x}", n))
                .collect();
            labels.reverse();
            labels.push("ip6.arpa.".to_string());
            labels.join(".")
        }
    }
}
