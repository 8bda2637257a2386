use crate::error::{Error, Result};
use std::time::Duration;

/// Parse a Go-style duration such as `30s`, `5m`, `1h30m` or `1.5h`.
///
/// Supported units are `h`, `m`, `s` and `ms`. A bare `0` is accepted.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let text = input.trim();
    if text == "0" {
        return Ok(Duration::ZERO);
    }
    if text.is_empty() {
        return Err(Error::InvalidInterval(input.to_string()));
    }

    let invalid = || Error::InvalidInterval(input.to_string());
    let mut total = 0f64;
    let mut rest = text;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds_per_unit = match &rest[..unit_len] {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 0.001,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];

        total += value * seconds_per_unit;
    }

    if !total.is_finite() {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(total).map_err(|_| invalid())
}
