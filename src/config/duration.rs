//! Duration parsing for command-line flags.

use anyhow::Context;

/// Parse a duration string like "2m", "30s" or "30" into seconds.
/// Supports:
/// - Plain numbers (interpreted as seconds): "30"
/// - Seconds suffix: "30s"
/// - Minutes suffix: "2m"
/// - Hours suffix: "1h"
pub fn parse_duration_to_secs(s: &str) -> anyhow::Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    let (digits, multiplier, unit) = if let Some(n) = s.strip_suffix('h') {
        (n, 3600, "hours")
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60, "minutes")
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1, "seconds")
    } else {
        (s, 1, "duration")
    };

    let value: u64 = digits
        .trim()
        .parse()
        .with_context(|| format!("Invalid {unit} value: {digits}"))?;
    value
        .checked_mul(multiplier)
        .with_context(|| format!("Duration too large: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration_to_secs("30").unwrap(), 30);
        assert_eq!(parse_duration_to_secs("30s").unwrap(), 30);
        assert_eq!(parse_duration_to_secs("2m").unwrap(), 120);
        assert_eq!(parse_duration_to_secs(" 1h ").unwrap(), 3600);
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration_to_secs("").is_err());
        assert!(parse_duration_to_secs("soon").is_err());
        assert!(parse_duration_to_secs("-5s").is_err());
        let err = parse_duration_to_secs("xm").unwrap_err();
        assert_eq!(err.to_string(), "Invalid minutes value: x");
    }
}
