//! Duration literals as written in forward directives: `500ms`, `0.5s`, `1m30s`, `0`.

use super::errors::ConfigError;
use std::time::Duration;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60 * 1_000_000_000),
        "h" => Some(3_600 * 1_000_000_000),
        _ => None,
    }
}

pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(input.to_string());

    let (negative, body) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input.strip_prefix('+').unwrap_or(input)),
    };

    if body == "0" {
        return Ok(Duration::ZERO);
    }
    if body.is_empty() {
        return Err(invalid());
    }

    let bytes = body.as_bytes();
    let mut total: u128 = 0;
    let mut i = 0;

    while i < bytes.len() {
        let int_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let int_part = &body[int_start..i];

        let mut frac_part = "";
        if i < bytes.len() && bytes[i] == b'.' {
            i += 1;
            let frac_start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            frac_part = &body[frac_start..i];
        }

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let unit_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_digit() && bytes[i] != b'.' {
            i += 1;
        }
        let scale = unit_nanos(&body[unit_start..i]).ok_or_else(invalid)?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(invalid)?;

        if !frac_part.is_empty() {
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = digits.parse().map_err(|_| invalid())?;
            nanos = nanos
                .checked_add(frac * scale / 10u128.pow(digits.len() as u32))
                .ok_or_else(invalid)?;
        }

        total = total.checked_add(nanos).ok_or_else(invalid)?;
    }

    if total > u64::MAX as u128 {
        return Err(invalid());
    }
    if negative && total > 0 {
        return Err(ConfigError::Negative {
            option: "duration".to_string(),
            value: input.to_string(),
        });
    }

    Ok(Duration::from_nanos(total as u64))
}
