//! Storage size quantities
//!
//! Claims carry sizes the way Kubernetes resource requests do (`5Gi`,
//! `100M`, `1Ti`). Only positivity matters for provisioning; the original
//! string is what ends up in the topology.

use crate::error::{Error, Result};

/// Binary (power of two) suffixes
const BINARY_SUFFIXES: [(&str, u32); 6] =
    [("Ki", 10), ("Mi", 20), ("Gi", 30), ("Ti", 40), ("Pi", 50), ("Ei", 60)];

/// Decimal (power of ten) suffixes, case-sensitive as in Kubernetes
const DECIMAL_SUFFIXES: [(&str, i32); 8] = [
    ("m", -3),
    ("", 0),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

/// Parse a Kubernetes quantity string (e.g., "100Gi", "5G", "1e3") to bytes.
///
/// Fractional byte counts round up, as `Quantity::Value` does.
pub fn parse_quantity(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidProperty {
            key: "storageSize".into(),
            value: String::new(),
            reason: "empty quantity".into(),
        });
    }

    let invalid = |reason: String| Error::InvalidProperty {
        key: "storageSize".into(),
        value: s.to_string(),
        reason,
    };

    let num_end = s
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '+' || *c == '-'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());

    let num_str = &s[..num_end];
    let suffix = &s[num_end..];

    let num: f64 = num_str
        .parse()
        .map_err(|_| invalid(format!("invalid number: {}", num_str)))?;

    let scale = match scale_of(suffix) {
        Some(scale) => scale,
        None => return Err(invalid(format!("unknown suffix: {}", suffix))),
    };

    let bytes = num * scale;
    if bytes < 0.0 {
        return Err(invalid("negative quantity".into()));
    }
    Ok(bytes.ceil() as u64)
}

fn scale_of(suffix: &str) -> Option<f64> {
    if let Some((_, shift)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Some(2f64.powi(*shift as i32));
    }
    if let Some((_, exp)) = DECIMAL_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Some(10f64.powi(*exp));
    }
    // Exponent notation: 1e3, 2E6
    let exp = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'))?;
    exp.parse::<i32>().ok().map(|exp| 10f64.powi(exp))
}

/// Parse a quantity and require it to be strictly positive
pub fn parse_positive_quantity(s: &str) -> Result<u64> {
    let bytes = parse_quantity(s)?;
    if bytes == 0 {
        return Err(Error::InvalidProperty {
            key: "storageSize".into(),
            value: s.to_string(),
            reason: "quantity must be positive".into(),
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("100").unwrap(), 100);
        assert_eq!(parse_quantity("1Ki").unwrap(), 1024);
        assert_eq!(parse_quantity("5Gi").unwrap(), 5 * 1024 * 1024 * 1024);
        assert_eq!(parse_quantity("1.5Mi").unwrap(), 1024 * 1024 + 512 * 1024);

        assert!(parse_quantity("").is_err());
        assert!(parse_quantity("abc").is_err());
        assert!(parse_quantity("100X").is_err());
        assert!(parse_quantity("5gi").is_err());
    }

    #[test]
    fn test_decimal_suffixes_are_powers_of_ten() {
        assert_eq!(parse_quantity("1k").unwrap(), 1_000);
        assert_eq!(parse_quantity("1G").unwrap(), 1_000_000_000);
        assert_eq!(parse_quantity("100M").unwrap(), 100_000_000);
        assert_eq!(parse_quantity("2T").unwrap(), 2_000_000_000_000);
        assert_eq!(parse_quantity("1e3").unwrap(), 1_000);
        assert_eq!(parse_quantity("1E").unwrap(), 1_000_000_000_000_000_000);
    }

    #[test]
    fn test_fractional_bytes_round_up() {
        assert_eq!(parse_quantity("0.5").unwrap(), 1);
        assert_eq!(parse_quantity("500m").unwrap(), 1);
        assert!(parse_positive_quantity("0.5").is_ok());
        assert_matches!(parse_quantity("-1Gi"), Err(Error::InvalidProperty { .. }));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        assert_matches!(
            parse_positive_quantity("0Gi"),
            Err(Error::InvalidProperty { reason, .. }) if reason.contains("positive")
        );
        assert!(parse_positive_quantity("1Mi").is_ok());
    }
}
