//! Parser for the textual `forward` directive:
//!
//! ```text
//! forward FROM TO... {
//!     OPTION ARGS...
//! }
//! ```

use super::errors::ConfigError;
use super::forward::ForwardConfig;

impl ForwardConfig {
    pub fn from_directive(input: &str) -> Result<Self, ConfigError> {
        let mut lines = input
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));

        let header = lines
            .next()
            .ok_or_else(|| ConfigError::ArgumentCount("forward".to_string()))?;
        let mut tokens: Vec<&str> = header.split_whitespace().collect();
        if tokens.first() != Some(&"forward") {
            return Err(ConfigError::Parse(format!(
                "expected 'forward' directive, found '{}'",
                header
            )));
        }

        let opens_block = tokens.last() == Some(&"{");
        if opens_block {
            tokens.pop();
        }
        if tokens.len() < 3 {
            return Err(ConfigError::ArgumentCount("forward".to_string()));
        }

        let mut config = ForwardConfig::new(tokens[1], &tokens[2..])?;
        let mut in_block = opens_block;

        for line in lines {
            let mut words = line.split_whitespace();
            let Some(name) = words.next() else {
                continue;
            };

            if in_block {
                if name == "}" {
                    in_block = false;
                    continue;
                }
                let args: Vec<&str> = words.collect();
                config.apply_option(name, &args)?;
            } else if name == "forward" {
                return Err(ConfigError::DuplicatePlugin);
            } else {
                return Err(ConfigError::Parse(format!(
                    "unexpected '{}' after forward directive",
                    line
                )));
            }
        }

        if in_block {
            return Err(ConfigError::Parse("unclosed forward block".to_string()));
        }

        Ok(config)
    }
}
