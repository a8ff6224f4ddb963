//! Unit-tagged numerals.
//!
//! The instrument writes and reads physical quantities as a numeral plus a
//! compact unit suffix (`500UV`, `100MV`, `2V`, `1MS`, `1.5MHZ`), and
//! echoes values back in scientific notation (`1.00E-01V`). Suffix meaning
//! is scoped to the unit family: `MV` is millivolts, while `MHZ` is
//! megahertz. Formatting picks the suffix that keeps the numeral in a
//! sane range, which is what the front panel expects.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Result, ScopeError};

/// The sentinel the measurement engine substitutes for a numeral when a
/// quantity cannot be computed from the current signal.
pub const INVALID_SENTINEL: &str = "****";

lazy_static! {
    static ref NUMERAL_RE: Regex = Regex::new(r"^([-+]?[0-9.]+(?:[eE][-+]?[0-9]+)?)\s*([A-Za-z/%]*)$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFamily {
    Voltage,
    Time,
    Frequency,
}

impl UnitFamily {
    /// Multiplier for a suffix within this family; `None` for a suffix
    /// the family does not define.
    fn multiplier(self, suffix: &str) -> Option<f64> {
        match self {
            UnitFamily::Voltage => match suffix {
                "" | "V" => Some(1.0),
                "KV" => Some(1e3),
                "MV" => Some(1e-3),
                "UV" => Some(1e-6),
                _ => None,
            },
            UnitFamily::Time => match suffix {
                "" | "S" => Some(1.0),
                "MS" => Some(1e-3),
                "US" => Some(1e-6),
                "NS" => Some(1e-9),
                _ => None,
            },
            UnitFamily::Frequency => match suffix {
                "" | "HZ" => Some(1.0),
                "KHZ" => Some(1e3),
                "MHZ" => Some(1e6),
                "GHZ" => Some(1e9),
                _ => None,
            },
        }
    }
}

/// Is this reply payload the invalid-measurement sentinel?
pub fn is_sentinel(payload: &str) -> bool {
    payload.trim().contains(INVALID_SENTINEL)
}

/// Parse a numeral with an optional family-scoped unit suffix.
pub fn parse(payload: &str, family: UnitFamily) -> Result<f64> {
    let trimmed = payload.trim();
    let caps = NUMERAL_RE.captures(trimmed).ok_or_else(|| {
        ScopeError::Protocol(format!("{:?} is not a unit-tagged numeral", trimmed))
    })?;

    let numeral = caps
        .get(1)
        .map(|m| m.as_str())
        .ok_or_else(|| ScopeError::Protocol(format!("no numeral in {:?}", trimmed)))?;
    let suffix = caps.get(2).map(|m| m.as_str()).unwrap_or("");

    let scale = family
        .multiplier(&suffix.to_ascii_uppercase())
        .ok_or_else(|| {
            ScopeError::Protocol(format!("unknown {:?} suffix {:?}", family, suffix))
        })?;

    let value = numeral
        .parse::<f64>()
        .map_err(|_| ScopeError::Protocol(format!("cannot parse numeral {:?}", numeral)))?;

    Ok(value * scale)
}

fn render(value: f64) -> String {
    // Enough digits for the finest instrument steps without trailing noise.
    let s = format!("{:.6}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Render a voltage with the suffix that keeps the numeral readable:
/// `0.1 -> 100MV`, `2.0 -> 2V`, `0.0005 -> 500UV`.
pub fn format_voltage(volts: f64) -> String {
    let magnitude = volts.abs();
    if magnitude >= 1.0 || magnitude == 0.0 {
        format!("{}V", render(volts))
    } else if magnitude >= 1e-3 {
        format!("{}MV", render(volts * 1e3))
    } else {
        format!("{}UV", render(volts * 1e6))
    }
}

/// Render a time the same way: `0.001 -> 1MS`, `2.5e-6 -> 2.5US`.
pub fn format_time(seconds: f64) -> String {
    let magnitude = seconds.abs();
    if magnitude >= 1.0 || magnitude == 0.0 {
        format!("{}S", render(seconds))
    } else if magnitude >= 1e-3 {
        format!("{}MS", render(seconds * 1e3))
    } else if magnitude >= 1e-6 {
        format!("{}US", render(seconds * 1e6))
    } else {
        format!("{}NS", render(seconds * 1e9))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scientific_notation_with_unit() {
        assert_eq!(parse("1.00E-01V", UnitFamily::Voltage).unwrap(), 0.1);
        assert_eq!(parse("1.00E+03Hz", UnitFamily::Frequency).unwrap(), 1000.0);
        assert_eq!(parse("2.00E-03S", UnitFamily::Time).unwrap(), 0.002);
    }

    #[test]
    fn voltage_suffixes_are_sub_unit() {
        assert_eq!(parse("500MV", UnitFamily::Voltage).unwrap(), 0.5);
        assert_eq!(parse("500UV", UnitFamily::Voltage).unwrap(), 0.0005);
        assert_eq!(parse("2V", UnitFamily::Voltage).unwrap(), 2.0);
    }

    #[test]
    fn frequency_suffixes_are_super_unit() {
        assert_eq!(parse("1.5MHZ", UnitFamily::Frequency).unwrap(), 1.5e6);
        assert_eq!(parse("2KHZ", UnitFamily::Frequency).unwrap(), 2000.0);
        assert_eq!(parse("1000.0HZ", UnitFamily::Frequency).unwrap(), 1000.0);
    }

    #[test]
    fn time_suffixes() {
        assert_eq!(parse("1MS", UnitFamily::Time).unwrap(), 1e-3);
        assert_eq!(parse("20US", UnitFamily::Time).unwrap(), 2e-5);
        assert_eq!(parse("50NS", UnitFamily::Time).unwrap(), 5e-8);
    }

    #[test]
    fn bare_numerals_are_base_unit() {
        assert_eq!(parse("0.25", UnitFamily::Voltage).unwrap(), 0.25);
        assert_eq!(parse("-1.5", UnitFamily::Voltage).unwrap(), -1.5);
    }

    #[test]
    fn foreign_suffix_is_a_protocol_error() {
        assert!(matches!(
            parse("10HZ", UnitFamily::Voltage),
            Err(ScopeError::Protocol(_))
        ));
        assert!(matches!(
            parse("banana", UnitFamily::Voltage),
            Err(ScopeError::Protocol(_))
        ));
    }

    #[test]
    fn sentinel_is_detected_not_parsed() {
        assert!(is_sentinel("****"));
        assert!(is_sentinel("C1:PAVA PKPK,****"));
        assert!(!is_sentinel("2.5V"));
        assert!(parse("****", UnitFamily::Voltage).is_err());
    }

    #[test]
    fn formats_pick_compact_suffixes() {
        assert_eq!(format_voltage(0.1), "100MV");
        assert_eq!(format_voltage(2.0), "2V");
        assert_eq!(format_voltage(0.0005), "500UV");
        assert_eq!(format_voltage(-0.05), "-50MV");
        assert_eq!(format_voltage(0.0), "0V");
        assert_eq!(format_time(1e-3), "1MS");
        assert_eq!(format_time(2.5e-6), "2.5US");
        assert_eq!(format_time(5e-8), "50NS");
        assert_eq!(format_time(2.0), "2S");
    }

    #[test]
    fn round_trips_through_format_and_parse() {
        for v in [0.002, 0.1, 1.0, 5.0, -0.25] {
            let rendered = format_voltage(v);
            let parsed = parse(&rendered, UnitFamily::Voltage).unwrap();
            assert!((parsed - v).abs() < 1e-9, "{} -> {} -> {}", v, rendered, parsed);
        }
    }
}
