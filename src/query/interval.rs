//! Duration strings of the form `<N><unit>[<N><unit>…]`.
//!
//! Units: seconds, minutes, hours, days, weeks, months (30 days), years
//! (365 days), singular or plural, plus the usual abbreviations. A bare
//! integer is seconds. Components add up, so `1h30min` is 5400.

/// Parses a signed interval into seconds. `default_sign` applies when the
/// string carries no explicit sign; functions that shift into the past
/// (such as timeShift) pass `-1`.
pub(crate) fn parse_interval(s: &str, default_sign: i32) -> Option<i32> {
    let mut sign = default_sign;
    let mut s = s;
    match s.as_bytes().first() {
        Some(b'-') => {
            sign = -1;
            s = &s[1..];
        }
        Some(b'+') => {
            sign = 1;
            s = &s[1..];
        }
        _ => {}
    }
    if s.is_empty() {
        return None;
    }

    let mut total: i64 = 0;
    while !s.is_empty() {
        let digits = s.bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return None;
        }
        let n: i64 = s[..digits].parse().ok()?;
        s = &s[digits..];

        let unit_len = s.bytes().take_while(|b| !b.is_ascii_digit()).count();
        let unit = &s[..unit_len];
        s = &s[unit_len..];

        let seconds: i64 = match unit {
            "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
            "min" | "mins" | "minute" | "minutes" => 60,
            "h" | "hour" | "hours" => 3600,
            "d" | "day" | "days" => 86400,
            "w" | "week" | "weeks" => 7 * 86400,
            "mo" | "mon" | "month" | "months" => 30 * 86400,
            "y" | "year" | "years" => 365 * 86400,
            _ => return None,
        };
        total += n * seconds;
    }

    i32::try_from(sign as i64 * total).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("5s", 5)]
    #[case("1min", 60)]
    #[case("5min", 300)]
    #[case("1h", 3600)]
    #[case("1d", 86400)]
    #[case("1w", 7 * 86400)]
    #[case("1mo", 30 * 86400)]
    #[case("1y", 365 * 86400)]
    #[case("2hours", 7200)]
    #[case("10", 10)]
    #[case("1h30min", 5400)]
    fn should_parse_units(#[case] input: &str, #[case] want: i32) {
        assert_eq!(parse_interval(input, 1), Some(want));
    }

    #[test]
    fn should_honor_explicit_sign() {
        assert_eq!(parse_interval("-1d", 1), Some(-86400));
        assert_eq!(parse_interval("+1d", -1), Some(86400));
    }

    #[test]
    fn should_apply_default_sign_when_unsigned() {
        assert_eq!(parse_interval("1d", -1), Some(-86400));
        assert_eq!(parse_interval("30s", -1), Some(-30));
    }

    #[test]
    fn should_reject_garbage() {
        assert_eq!(parse_interval("", 1), None);
        assert_eq!(parse_interval("-", 1), None);
        assert_eq!(parse_interval("fortnight", 1), None);
        assert_eq!(parse_interval("5parsecs", 1), None);
    }
}
