//! Kubernetes resource quantity parsing
//!
//! Only the subset needed to compare requests against limits: a decimal
//! number followed by an optional binary (`Ki`..`Ei`) or decimal (`m`, `k`..`E`)
//! suffix. Exponent notation is not accepted.

use std::cmp::Ordering;

use crate::{Error, Result};

const BINARY_SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1024.0 * 1024.0),
    ("Gi", 1024.0 * 1024.0 * 1024.0),
    ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Ei", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
];

const DECIMAL_SUFFIXES: &[(&str, f64)] = &[
    ("m", 1e-3),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Parse a quantity string into its value in base units (cores or bytes).
pub fn parse_quantity(value: &str) -> Result<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_quantity(value, "empty quantity"));
    }

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);

    let base: f64 = number
        .parse()
        .map_err(|_| Error::invalid_quantity(value, "expected a decimal number"))?;

    if suffix.is_empty() {
        return Ok(base);
    }

    BINARY_SUFFIXES
        .iter()
        .chain(DECIMAL_SUFFIXES.iter())
        .find(|(s, _)| *s == suffix)
        .map(|(_, multiplier)| base * multiplier)
        .ok_or_else(|| Error::invalid_quantity(value, format!("unknown suffix '{}'", suffix)))
}

/// Compare two quantity strings by value.
pub fn compare_quantities(a: &str, b: &str) -> Result<Ordering> {
    let a = parse_quantity(a)?;
    let b = parse_quantity(b)?;
    Ok(a.partial_cmp(&b).unwrap_or(Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_suffixed_values() {
        assert_eq!(parse_quantity("2").expect("plain"), 2.0);
        assert_eq!(parse_quantity("0.5").expect("fraction"), 0.5);
        assert_eq!(parse_quantity("100m").expect("millicores"), 0.1);
        assert_eq!(parse_quantity("1Ki").expect("kibibytes"), 1024.0);
        assert_eq!(parse_quantity("1k").expect("kilobytes"), 1000.0);
    }

    #[test]
    fn binary_and_decimal_units_compare_by_value() {
        assert_eq!(
            compare_quantities("1Gi", "1G").expect("comparable"),
            Ordering::Greater
        );
        assert_eq!(
            compare_quantities("512Mi", "0.5Gi").expect("comparable"),
            Ordering::Equal
        );
        assert_eq!(
            compare_quantities("250m", "1").expect("comparable"),
            Ordering::Less
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_quantity("").is_err());
        assert!(parse_quantity("Mi").is_err());
        assert!(parse_quantity("12xyz").is_err());
    }
}
