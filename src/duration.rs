//! ISO8601 durations (`PnYnMnWnDTnHnMnS`) for worker uptime limits.
//!
//! Calendar units use fixed lengths: a year is 365 days and a month is 30 days.
//! Only the last component may carry a fraction (`PT1.5S`, `PT0,5H`).

use crate::error::RuntimeError;

const MINUTE: f64 = 60.0;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;
const WEEK: f64 = 7.0 * DAY;
const MONTH: f64 = 30.0 * DAY;
const YEAR: f64 = 365.0 * DAY;

/// Parses an ISO8601 duration into seconds.
///
/// ```
/// assert_eq!(procvisor::parse_duration("PT2H7M").unwrap(), 7620.0);
/// assert_eq!(procvisor::parse_duration("P1W").unwrap(), 604_800.0);
/// assert!(procvisor::parse_duration("2 hours").is_err());
/// ```
pub fn parse_duration(value: &str) -> Result<f64, RuntimeError> {
    let invalid = |reason| RuntimeError::InvalidDuration {
        value: value.to_string(),
        reason,
    };

    let body = value
        .trim()
        .strip_prefix(['P', 'p'])
        .ok_or_else(|| invalid("must start with 'P'"))?;
    if body.is_empty() {
        return Err(invalid("no components"));
    }

    let mut total = 0.0;
    let mut in_time = false;
    let mut components = 0;
    let mut time_components = 0;
    // Rank of the last unit seen; units must appear once each, largest first.
    let mut last_rank = None;
    let mut fractional = false;
    let mut number = String::new();

    for c in body.chars() {
        match c {
            '0'..='9' => number.push(c),
            '.' | ',' => number.push('.'),
            'T' | 't' => {
                if in_time || !number.is_empty() {
                    return Err(invalid("misplaced 'T'"));
                }
                in_time = true;
            }
            unit => {
                if number.is_empty() {
                    return Err(invalid("unit without a number"));
                }
                if fractional {
                    return Err(invalid("only the last component may be fractional"));
                }
                let n: f64 = number.parse().map_err(|_| invalid("malformed number"))?;
                fractional = number.contains('.');
                number.clear();

                let (rank, scale) = match (in_time, unit.to_ascii_uppercase()) {
                    (false, 'Y') => (0, YEAR),
                    (false, 'M') => (1, MONTH),
                    (false, 'W') => (2, WEEK),
                    (false, 'D') => (3, DAY),
                    (true, 'H') => (4, HOUR),
                    (true, 'M') => (5, MINUTE),
                    (true, 'S') => (6, 1.0),
                    _ => return Err(invalid("unknown unit")),
                };
                if last_rank.is_some_and(|last| rank <= last) {
                    return Err(invalid("repeated or out-of-order unit"));
                }
                last_rank = Some(rank);
                total += n * scale;
                components += 1;
                if in_time {
                    time_components += 1;
                }
            }
        }
    }

    if !number.is_empty() {
        return Err(invalid("trailing number without a unit"));
    }
    if components == 0 {
        return Err(invalid("no components"));
    }
    if in_time && time_components == 0 {
        return Err(invalid("'T' without a time component"));
    }
    Ok(total)
}
