use std::{fmt, str::FromStr, time::Duration};

/// A duration in the Prometheus configuration format, e.g. `1h30m` or `90s`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct PromDuration(Duration);

#[derive(Debug, thiserror::Error, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("empty duration string")]
    Empty,

    #[error("invalid unit: {}", EXPECTED_UNITS)]
    InvalidUnit,

    #[error("missing a unit: {}", EXPECTED_UNITS)]
    NoUnit,

    #[error("invalid number: {}", .0)]
    NotANumber(#[from] std::num::ParseIntError),

    #[error("units must appear at most once and from largest to smallest")]
    OutOfOrder,

    #[error("duration out of range")]
    Overflow,
}

const EXPECTED_UNITS: &str = "expected one of 'y', 'w', 'd', 'h', 'm', 's', or 'ms'";

const MILLISECOND: u64 = 1;
const SECOND: u64 = 1000 * MILLISECOND;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;
const YEAR: u64 = 365 * DAY;

/// Durations are bounded by a signed 64-bit millisecond count.
const MAX_MILLIS: u64 = i64::MAX as u64;

/// Units from largest to smallest, in milliseconds.
const UNITS: [(&str, u64); 7] = [
    ("y", YEAR),
    ("w", WEEK),
    ("d", DAY),
    ("h", HOUR),
    ("m", MINUTE),
    ("s", SECOND),
    ("ms", MILLISECOND),
];

impl From<PromDuration> for Duration {
    fn from(PromDuration(duration): PromDuration) -> Self {
        duration
    }
}

impl From<Duration> for PromDuration {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

impl FromStr for PromDuration {
    type Err = ParseError;

    fn from_str(mut s: &str) -> Result<Self, Self::Err> {
        // implements the same format as
        // https://github.com/prometheus/common/blob/v0.60.0/model/time.go#L204
        if s.is_empty() {
            return Err(ParseError::Empty);
        }
        if s == "0" {
            return Ok(Self::default());
        }

        let mut total: u64 = 0;
        // Index into `UNITS` of the smallest unit seen so far.
        let mut last: Option<usize> = None;
        while !s.is_empty() {
            let unit_start = s
                .find(|c: char| !c.is_ascii_digit())
                .ok_or(ParseError::NoUnit)?;
            let (val, rest) = s.split_at(unit_start);
            let val = val.parse::<u64>()?;

            let unit_end = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
            let (unit, rest) = rest.split_at(unit_end);
            s = rest;

            let idx = UNITS
                .iter()
                .position(|(u, _)| *u == unit)
                .ok_or(ParseError::InvalidUnit)?;
            if last.is_some_and(|last| idx <= last) {
                return Err(ParseError::OutOfOrder);
            }
            last = Some(idx);

            total = val
                .checked_mul(UNITS[idx].1)
                .and_then(|ms| total.checked_add(ms))
                .filter(|&ms| ms <= MAX_MILLIS)
                .ok_or(ParseError::Overflow)?;
        }

        Ok(Self(Duration::from_millis(total)))
    }
}

impl fmt::Display for PromDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ms = self.0.as_millis() as u64;
        if ms == 0 {
            return f.write_str("0s");
        }
        for (unit, size) in UNITS {
            if ms >= size {
                write!(f, "{}{}", ms / size, unit)?;
                ms %= size;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_same_as_prometheus() {
        let cases: &[(&str, u64)] = &[
            ("0", 0),
            ("0s", 0),
            ("324ms", 324),
            ("3s", 3 * SECOND),
            ("5m", 5 * MINUTE),
            ("1h", HOUR),
            ("4d", 4 * DAY),
            ("4d1h", 4 * DAY + HOUR),
            ("14d", 14 * DAY),
            ("3w", 3 * WEEK),
            ("3w2d1h", 3 * WEEK + 2 * DAY + HOUR),
            ("10y", 10 * YEAR),
            ("1h30m15s250ms", HOUR + 30 * MINUTE + 15 * SECOND + 250),
        ];
        for (input, ms) in cases {
            let parsed = input
                .parse::<PromDuration>()
                .unwrap_or_else(|e| panic!("{input:?} must parse: {e}"));
            assert_eq!(Duration::from(parsed), Duration::from_millis(*ms), "{input}");
        }
    }

    #[test]
    fn rejects_invalid_durations() {
        let cases: &[(&str, ParseError)] = &[
            ("", ParseError::Empty),
            ("1", ParseError::NoUnit),
            ("5", ParseError::NoUnit),
            ("1.5h", ParseError::InvalidUnit),
            ("1d1w", ParseError::OutOfOrder),
            ("1h1h", ParseError::OutOfOrder),
            ("1s1m", ParseError::OutOfOrder),
            ("5 m", ParseError::InvalidUnit),
            ("1ns", ParseError::InvalidUnit),
        ];
        for (input, err) in cases {
            assert_eq!(
                input.parse::<PromDuration>().unwrap_err(),
                *err,
                "{input:?}"
            );
        }

        for input in ["h", "-1s", "ms"] {
            assert!(
                matches!(
                    input.parse::<PromDuration>().unwrap_err(),
                    ParseError::NotANumber(_)
                ),
                "{input:?}"
            );
        }
        assert_eq!(
            "99999999999999999y".parse::<PromDuration>().unwrap_err(),
            ParseError::Overflow
        );
    }

    #[test]
    fn bounds_durations_at_signed_millis() {
        let max = "292471208y".parse::<PromDuration>().expect("must parse");
        assert_eq!(max.0, Duration::from_millis(292_471_208 * YEAR));

        for input in ["292471209y", "300000000y", "292471208y36w"] {
            assert_eq!(
                input.parse::<PromDuration>().unwrap_err(),
                ParseError::Overflow,
                "{input:?}"
            );
        }
    }

    #[test]
    fn formats_largest_units_first() {
        for (input, output) in [
            ("0", "0s"),
            ("90s", "1m30s"),
            ("1h30m", "1h30m"),
            ("8d", "1w1d"),
            ("1500ms", "1s500ms"),
        ] {
            assert_eq!(input.parse::<PromDuration>().unwrap().to_string(), output);
        }
    }
}
