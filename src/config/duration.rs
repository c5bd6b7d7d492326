// src/config/duration.rs

use std::time::Duration;

const UNITS: &[(&str, Duration)] = &[
    ("ms", Duration::from_millis(1)),
    ("s", Duration::from_secs(1)),
    ("m", Duration::from_secs(60)),
    ("h", Duration::from_secs(3600)),
];

/// Parse a timing value such as `"250ms"`, `"30s"` or `"1m30s"`.
///
/// Every number needs a unit. Segments are summed, so `"1h5m"` is 65 minutes.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let text = s.trim();
    if text.is_empty() {
        return Err("empty duration string".to_string());
    }

    let mut total = Duration::ZERO;
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("expected a number at '{rest}' in '{text}'"));
        }
        let (number, tail) = rest.split_at(digits);
        let amount: u32 = number
            .parse()
            .map_err(|e| format!("duration number '{number}' out of range: {e}"))?;

        let unit_len = tail.find(|c: char| c.is_ascii_digit()).unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);
        let scale = unit_scale(unit).ok_or_else(|| match unit {
            "" => format!("'{text}' is missing a unit (ms, s, m or h)"),
            other => format!("unknown duration unit '{other}' in '{text}'"),
        })?;

        total = scale
            .checked_mul(amount)
            .and_then(|segment| total.checked_add(segment))
            .ok_or_else(|| format!("duration '{text}' overflows"))?;
        rest = next;
    }
    Ok(total)
}

fn unit_scale(unit: &str) -> Option<Duration> {
    let unit = unit.trim().to_ascii_lowercase();
    UNITS
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, scale)| *scale)
}
