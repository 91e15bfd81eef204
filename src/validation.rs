//! Centralized validation functions for edgeos-bouncer.
//!
//! This module provides unified validation for:
//! - IPv4 addresses coming from the decision feed or the device
//! - Time intervals used by the scheduler and the feed poller
//! - Endpoint URLs

use anyhow::{bail, Result};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Parse a dotted-quad IPv4 address.
///
/// Only the plain four-octet form is accepted: IPv6, CIDR notation,
/// ranges and surrounding whitespace are all rejected.
///
/// # Examples
/// ```
/// use edgeos_bouncer::validation::parse_ipv4;
/// assert!(parse_ipv4("192.168.1.1").is_some());
/// assert!(parse_ipv4("::1").is_none());
/// assert!(parse_ipv4("10.0.0.0/8").is_none());
/// ```
pub fn parse_ipv4(value: &str) -> Option<Ipv4Addr> {
    value.parse::<Ipv4Addr>().ok()
}

/// Timer interval validation (e.g., "5s", "20s", "5m").
///
/// Returns `true` if the interval is valid and non-zero.
/// Requires ASCII-only input to prevent Unicode-related edge cases.
///
/// # Examples
/// ```
/// use edgeos_bouncer::validation::is_valid_interval;
/// assert!(is_valid_interval("5s"));
/// assert!(is_valid_interval("30m"));
/// assert!(!is_valid_interval("4x"));
/// assert!(!is_valid_interval("0s"));
/// ```
pub fn is_valid_interval(interval: &str) -> bool {
    parse_interval(interval).is_ok()
}

/// Parse an interval like `5s`, `20s`, `5m`, `1h` or `1d` into a [`Duration`].
///
/// # Errors
/// Returns an error with a descriptive message if the interval is malformed
/// or zero.
///
/// # Examples
/// ```
/// use edgeos_bouncer::validation::parse_interval;
/// use std::time::Duration;
/// assert_eq!(parse_interval("20s").unwrap(), Duration::from_secs(20));
/// assert!(parse_interval("invalid").is_err());
/// ```
pub fn parse_interval(interval: &str) -> Result<Duration> {
    if interval.is_empty() {
        bail!("Interval cannot be empty");
    }

    if !interval.is_ascii() {
        bail!("Invalid interval '{}'. Only ASCII characters allowed", interval);
    }

    if interval.len() < 2 {
        bail!(
            "Invalid interval '{}'. Use format like '5s', '30m', '1h'",
            interval
        );
    }

    let (num_part, suffix) = interval.split_at(interval.len() - 1);

    let multiplier: u64 = match suffix {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => bail!(
            "Invalid interval '{}'. Suffix must be s, m, h, or d",
            interval
        ),
    };

    let value: u32 = num_part.parse().map_err(|_| {
        anyhow::anyhow!(
            "Invalid interval '{}'. Number part must be a positive integer",
            interval
        )
    })?;

    if value == 0 {
        bail!("Invalid interval '{}'. Interval must be non-zero", interval);
    }

    Ok(Duration::from_secs(u64::from(value) * multiplier))
}

/// Validate that a URL is non-empty and uses http or https.
pub fn validate_url(field: &str, url: &str) -> Result<()> {
    if url.is_empty() {
        bail!("{} must be set", field);
    }
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        bail!("{} must be an http(s) URL: {}", field, url);
    }
    Ok(())
}
