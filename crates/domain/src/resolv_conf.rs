//! Reader for `resolv.conf`-style nameserver lists.

use crate::config::ConfigError;
use std::net::IpAddr;
use std::path::Path;

/// Extracts every `nameserver <ip>` entry, in file order.
///
/// Comments (`#` or `;`) and other directives are ignored, as are entries whose
/// address does not parse (for example scoped IPv6 literals).
pub fn parse_nameservers(contents: &str) -> Vec<IpAddr> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.split(['#', ';']).next().unwrap_or_default();
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some("nameserver"), Some(addr)) => addr.parse().ok(),
                _ => None,
            }
        })
        .collect()
}

pub fn read_nameservers(path: &Path) -> Result<Vec<IpAddr>, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::FileRead(path.display().to_string(), e.to_string()))?;
    Ok(parse_nameservers(&contents))
}
