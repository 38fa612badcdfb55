use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Largest number of digits a timeout header value may carry.
const MAX_TIMEOUT_DIGITS: usize = 8;
const MAX_TIMEOUT_VALUE: u128 = 99_999_999;

/// Used when `now + timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Header units from finest to coarsest, with their length in nanoseconds.
const UNITS: [(char, u128); 6] = [
    ('n', 1),
    ('u', 1_000),
    ('m', 1_000_000),
    ('S', 1_000_000_000),
    ('M', 60 * 1_000_000_000),
    ('H', 3_600 * 1_000_000_000),
];

/// Errors from parsing a timeout header value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeadlineHeaderError {
    #[error("timeout header is empty")]
    Empty,

    #[error("timeout header has unknown unit {0:?}")]
    InvalidUnit(char),

    #[error("timeout header value {0:?} is not a number")]
    InvalidValue(String),

    #[error("timeout header value has {0} digits (max {MAX_TIMEOUT_DIGITS})")]
    TooManyDigits(usize),
}

/// An absolute point in time by which a call must finish.
///
/// Built on the runtime clock, so paused-clock tests see consistent values.
/// A call without a deadline is represented as `Option<Deadline>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline at an explicit instant.
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    /// Deadline `timeout` from now.
    pub fn from_timeout(timeout: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self { at }
    }

    /// Parse a timeout header value such as `250m` or `5S` into a deadline
    /// measured from now.
    pub fn from_header(value: &str) -> Result<Self, DeadlineHeaderError> {
        parse_timeout(value).map(Self::from_timeout)
    }

    /// Encode the remaining time as a timeout header value.
    pub fn to_header(&self) -> String {
        encode_timeout(self.time_remaining())
    }

    /// The instant this deadline falls on.
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn time_remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.time_remaining().is_zero()
    }

    /// The earlier of two optional deadlines; an absent deadline never wins.
    pub fn earliest(a: Option<Deadline>, b: Option<Deadline>) -> Option<Deadline> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, None) => a,
            (None, b) => b,
        }
    }
}

impl fmt::Display for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} remaining", self.time_remaining())
    }
}

/// Parse a timeout header value (`<1-8 digits><H|M|S|m|u|n>`).
pub fn parse_timeout(value: &str) -> Result<Duration, DeadlineHeaderError> {
    let unit = value.chars().last().ok_or(DeadlineHeaderError::Empty)?;
    let digits = &value[..value.len() - unit.len_utf8()];
    if digits.is_empty() {
        return Err(DeadlineHeaderError::InvalidValue(value.to_string()));
    }
    if digits.len() > MAX_TIMEOUT_DIGITS {
        return Err(DeadlineHeaderError::TooManyDigits(digits.len()));
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DeadlineHeaderError::InvalidValue(value.to_string()));
    }
    let amount: u64 = digits
        .parse()
        .map_err(|_| DeadlineHeaderError::InvalidValue(value.to_string()))?;

    let duration = match unit {
        'H' => Duration::from_secs(amount * 3_600),
        'M' => Duration::from_secs(amount * 60),
        'S' => Duration::from_secs(amount),
        'm' => Duration::from_millis(amount),
        'u' => Duration::from_micros(amount),
        'n' => Duration::from_nanos(amount),
        other => return Err(DeadlineHeaderError::InvalidUnit(other)),
    };
    Ok(duration)
}

/// Encode `timeout` in the finest unit whose value fits in 8 digits.
///
/// Values are truncated toward zero so the receiving side never waits longer
/// than the sender would.
pub fn encode_timeout(timeout: Duration) -> String {
    let nanos = timeout.as_nanos();
    for (unit, scale) in UNITS {
        let value = nanos / scale;
        if value <= MAX_TIMEOUT_VALUE {
            return format!("{value}{unit}");
        }
    }
    format!("{MAX_TIMEOUT_VALUE}H")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_unit() {
        assert_eq!(parse_timeout("2H").unwrap(), Duration::from_secs(7_200));
        assert_eq!(parse_timeout("3M").unwrap(), Duration::from_secs(180));
        assert_eq!(parse_timeout("5S").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_timeout("250m").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_timeout("10u").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_timeout("7n").unwrap(), Duration::from_nanos(7));
    }

    #[test]
    fn rejects_malformed_values() {
        assert_eq!(parse_timeout(""), Err(DeadlineHeaderError::Empty));
        assert_eq!(parse_timeout("5x"), Err(DeadlineHeaderError::InvalidUnit('x')));
        assert!(matches!(
            parse_timeout("S"),
            Err(DeadlineHeaderError::InvalidValue(_))
        ));
        assert!(matches!(
            parse_timeout("-1S"),
            Err(DeadlineHeaderError::InvalidValue(_))
        ));
        assert_eq!(
            parse_timeout("123456789S"),
            Err(DeadlineHeaderError::TooManyDigits(9))
        );
    }

    #[test]
    fn encodes_with_finest_fitting_unit() {
        assert_eq!(encode_timeout(Duration::from_nanos(42)), "42n");
        assert_eq!(encode_timeout(Duration::from_millis(250)), "250000u");
        assert_eq!(encode_timeout(Duration::from_secs(5)), "5000000u");
        assert_eq!(encode_timeout(Duration::from_secs(3_600)), "3600000m");
        assert_eq!(encode_timeout(Duration::from_secs(200_000)), "200000S");
        assert_eq!(encode_timeout(Duration::ZERO), "0n");
    }

    #[test]
    fn encoded_values_parse_back_without_growing() {
        for timeout in [
            Duration::from_nanos(1),
            Duration::from_millis(1_500),
            Duration::from_secs(86_400 * 10),
        ] {
            let parsed = parse_timeout(&encode_timeout(timeout)).unwrap();
            assert!(parsed <= timeout);
        }
    }

    #[test]
    fn earliest_ignores_absent_deadlines() {
        let soon = Deadline::from_timeout(Duration::from_secs(1));
        let later = Deadline::from_timeout(Duration::from_secs(10));

        assert_eq!(Deadline::earliest(Some(later), Some(soon)), Some(soon));
        assert_eq!(Deadline::earliest(None, Some(later)), Some(later));
        assert_eq!(Deadline::earliest(Some(soon), None), Some(soon));
        assert_eq!(Deadline::earliest(None, None), None);
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_time_follows_the_clock() {
        let deadline = Deadline::from_timeout(Duration::from_millis(100));
        assert_eq!(deadline.time_remaining(), Duration::from_millis(100));
        assert_eq!(deadline.to_header(), "100000u");

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(deadline.time_remaining(), Duration::from_millis(40));
        assert!(!deadline.is_expired());

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(deadline.time_remaining(), Duration::ZERO);
        assert!(deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn header_round_trip_keeps_the_deadline() {
        let deadline = Deadline::from_header("5S").unwrap();
        assert_eq!(deadline.time_remaining(), Duration::from_secs(5));
    }

    #[test]
    fn huge_timeout_does_not_overflow() {
        let deadline = Deadline::from_timeout(Duration::MAX);
        assert!(!deadline.is_expired());
    }
}
