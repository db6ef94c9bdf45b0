//! ISO-8601 duration parsing (`PT#H#M#S`).

use tracing::warn;

/// Parse an ISO-8601 duration into seconds. `PT1H30M15S` is 5415,
/// `PT0S` is 0. Malformed input logs a warning and yields 0, never an
/// error: a missing duration should not sink a whole playlist fetch.
pub fn parse_duration_seconds(value: &str) -> i64 {
    match try_parse(value) {
        Some(seconds) => seconds,
        None => {
            warn!("Unparseable ISO-8601 duration {:?}, treating as 0", value);
            0
        }
    }
}

fn try_parse(value: &str) -> Option<i64> {
    let rest = value.strip_prefix("PT")?;
    if rest.is_empty() {
        return None;
    }

    let mut total = 0i64;
    let mut digits = String::new();
    for c in rest.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            let n: i64 = digits.parse().ok()?;
            digits.clear();
            match c {
                'H' => total += n * 3600,
                'M' => total += n * 60,
                'S' => total += n,
                _ => return None,
            }
        }
    }
    // Trailing digits without a unit marker
    if !digits.is_empty() {
        return None;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_duration() {
        assert_eq!(parse_duration_seconds("PT1H30M15S"), 5415);
    }

    #[test]
    fn parses_zero_duration() {
        assert_eq!(parse_duration_seconds("PT0S"), 0);
    }

    #[test]
    fn parses_partial_units() {
        assert_eq!(parse_duration_seconds("PT45M"), 2700);
        assert_eq!(parse_duration_seconds("PT2H"), 7200);
        assert_eq!(parse_duration_seconds("PT90S"), 90);
        assert_eq!(parse_duration_seconds("PT10M30S"), 630);
    }

    #[test]
    fn malformed_input_yields_zero() {
        assert_eq!(parse_duration_seconds(""), 0);
        assert_eq!(parse_duration_seconds("PT"), 0);
        assert_eq!(parse_duration_seconds("1H30M"), 0);
        assert_eq!(parse_duration_seconds("PT1X"), 0);
        assert_eq!(parse_duration_seconds("PT15"), 0);
        assert_eq!(parse_duration_seconds("garbage"), 0);
    }
}
