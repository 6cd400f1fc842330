// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Parsing of command-line durations such as `10s`, `1m30s` or `1.5h`.

use std::time::Duration;

use thiserror::Error;

/// A duration string that could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid duration '{input}': {reason}")]
pub struct DurationError {
    input: String,
    reason: &'static str,
}

impl DurationError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

// Nanoseconds per unit.
const UNITS: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("us", 1e3),
    ("µs", 1e3),
    ("ms", 1e6),
    ("s", 1e9),
    ("m", 6e10),
    ("h", 3.6e12),
];

/// Parse a sequence of `<number><unit>` terms. Units are `ns`, `us`,
/// `ms`, `s`, `m` and `h`; a bare `0` is accepted.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationError::new(input, "empty"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.starts_with('-') {
        return Err(DurationError::new(input, "must not be negative"));
    }

    let mut rest = s.strip_prefix('+').unwrap_or(s);
    let mut total_nanos = 0.0_f64;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(DurationError::new(input, "expected a number"));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| DurationError::new(input, "malformed number"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        let scale = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| {
                if unit.is_empty() {
                    DurationError::new(input, "missing unit")
                } else {
                    DurationError::new(input, "unknown unit")
                }
            })?;
        rest = &rest[unit_len..];

        total_nanos += value * scale;
    }

    if total_nanos >= u64::MAX as f64 {
        return Err(DurationError::new(input, "out of range"));
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
