//! Cadence expressions and trigger-time arithmetic.
//!
//! Supported forms:
//!
//! - `daily at 10:00,19:00`
//! - `daily every 15m from 00:00 to 23:45`
//! - `every 30m`
//! - `immediately then every 1m`
//!
//! Durations take an `s`, `m` or `h` suffix. Times of day are `HH:MM` and are
//! evaluated in the scheduler's fixed UTC offset.

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const MAX_INTERVAL_SECS: u64 = 366 * 24 * 3600;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CadenceParseError {
    #[error("empty cadence expression")]
    Empty,
    #[error("invalid time of day {0:?} (expected HH:MM)")]
    InvalidTime(String),
    #[error("invalid duration {0:?} (expected e.g. 30s, 15m, 2h)")]
    InvalidDuration(String),
    #[error("duration must be greater than zero")]
    ZeroDuration,
    #[error("window start {from} is after window end {to}")]
    InvertedWindow { from: NaiveTime, to: NaiveTime },
    #[error("unrecognized cadence expression {0:?}")]
    Unrecognized(String),
}

/// When a job is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cadence {
    /// Fixed times of day, sorted and deduplicated.
    DailyAt(Vec<NaiveTime>),
    /// Every interval, counted from registration.
    Every(Duration),
    /// Once at registration, then every interval.
    ImmediatelyThenEvery(Duration),
}

impl Cadence {
    /// Builds the times-of-day list `from, from + step, ...` up to and including `to`.
    pub fn daily_window(
        from: NaiveTime,
        to: NaiveTime,
        step: Duration,
    ) -> Result<Self, CadenceParseError> {
        if step.is_zero() {
            return Err(CadenceParseError::ZeroDuration);
        }
        if from > to {
            return Err(CadenceParseError::InvertedWindow { from, to });
        }
        let step = to_chrono(step);
        let mut times = Vec::new();
        let mut current = from;
        loop {
            times.push(current);
            let (next, wrapped) = current.overflowing_add_signed(step);
            if wrapped != 0 || next > to || next <= current {
                break;
            }
            current = next;
        }
        Ok(Cadence::DailyAt(times))
    }

    /// First trigger for a job registered at `registered_at`.
    ///
    /// Times-of-day fire at the first listed time at or after registration.
    pub fn first_run(&self, registered_at: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
        match self {
            Cadence::DailyAt(times) => next_time_of_day(times, registered_at, offset, true),
            Cadence::Every(interval) => registered_at + to_chrono(*interval),
            Cadence::ImmediatelyThenEvery(_) => registered_at,
        }
    }

    /// Next trigger strictly after `now`, given the trigger that just came due.
    ///
    /// Triggers that fell between `scheduled` and `now` are skipped.
    pub fn next_after(
        &self,
        scheduled: DateTime<Utc>,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> DateTime<Utc> {
        match self {
            Cadence::DailyAt(times) => next_time_of_day(times, now, offset, false),
            Cadence::Every(interval) | Cadence::ImmediatelyThenEvery(interval) => {
                let step = to_chrono(*interval);
                let mut next = scheduled + step;
                if next <= now {
                    let behind = (now - next).num_milliseconds();
                    let step_ms = step.num_milliseconds().max(1);
                    next += ChronoDuration::milliseconds((behind / step_ms + 1) * step_ms);
                }
                next
            }
        }
    }
}

impl FromStr for Cadence {
    type Err = CadenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expr = s.trim().to_ascii_lowercase();
        if expr.is_empty() {
            return Err(CadenceParseError::Empty);
        }
        let words: Vec<&str> = expr.split_whitespace().collect();

        match words.as_slice() {
            ["daily", "at", rest @ ..] if !rest.is_empty() => {
                let mut times = rest
                    .join("")
                    .split(',')
                    .filter(|t| !t.is_empty())
                    .map(parse_time_of_day)
                    .collect::<Result<Vec<_>, _>>()?;
                if times.is_empty() {
                    return Err(CadenceParseError::Unrecognized(s.to_string()));
                }
                times.sort();
                times.dedup();
                Ok(Cadence::DailyAt(times))
            }
            ["daily", "every", step, "from", from, "to", to] => Cadence::daily_window(
                parse_time_of_day(from)?,
                parse_time_of_day(to)?,
                parse_duration(step)?,
            ),
            ["every", step] => Ok(Cadence::Every(parse_duration(step)?)),
            ["immediately", "then", "every", step] => {
                Ok(Cadence::ImmediatelyThenEvery(parse_duration(step)?))
            }
            _ => Err(CadenceParseError::Unrecognized(s.to_string())),
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::DailyAt(times) => {
                let joined = times
                    .iter()
                    .map(|t| t.format("%H:%M").to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                write!(f, "daily at {}", joined)
            }
            Cadence::Every(interval) => write!(f, "every {}", format_duration(*interval)),
            Cadence::ImmediatelyThenEvery(interval) => {
                write!(f, "immediately then every {}", format_duration(*interval))
            }
        }
    }
}

fn parse_time_of_day(s: &str) -> Result<NaiveTime, CadenceParseError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| CadenceParseError::InvalidTime(s.to_string()))
}

fn parse_duration(s: &str) -> Result<Duration, CadenceParseError> {
    let invalid = || CadenceParseError::InvalidDuration(s.to_string());
    let split = s.len().checked_sub(1).ok_or_else(invalid)?;
    if !s.is_char_boundary(split) {
        return Err(invalid());
    }
    let (value, unit) = s.split_at(split);
    let value: u64 = value.parse().map_err(|_| invalid())?;
    let secs = match unit {
        "s" => value,
        "m" => value.checked_mul(60).ok_or_else(invalid)?,
        "h" => value.checked_mul(3600).ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };
    if secs == 0 {
        return Err(CadenceParseError::ZeroDuration);
    }
    if secs > MAX_INTERVAL_SECS {
        return Err(invalid());
    }
    Ok(Duration::from_secs(secs))
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or(ChronoDuration::MAX)
}

/// First listed time of day after `now` (or at it, when `inclusive`).
fn next_time_of_day(
    times: &[NaiveTime],
    now: DateTime<Utc>,
    offset: FixedOffset,
    inclusive: bool,
) -> DateTime<Utc> {
    let today = now.with_timezone(&offset).date_naive();
    for day in [today, today + ChronoDuration::days(1)] {
        for time in times {
            let local = day.and_time(*time);
            let candidate = Utc.from_utc_datetime(
                &(local - ChronoDuration::seconds(offset.local_minus_utc() as i64)),
            );
            if candidate > now || (inclusive && candidate == now) {
                return candidate;
            }
        }
    }
    // Unreachable with a non-empty list: every time recurs tomorrow
    now + ChronoDuration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, h, m, 0).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parses_quarter_hour_window() {
        let cadence: Cadence = "daily every 15m from 00:00 to 23:45".parse().unwrap();
        match cadence {
            Cadence::DailyAt(times) => {
                assert_eq!(times.len(), 96);
                assert_eq!(times[0], t(0, 0));
                assert_eq!(times[1], t(0, 15));
                assert_eq!(times[95], t(23, 45));
            }
            other => panic!("unexpected cadence {:?}", other),
        }
    }

    #[test]
    fn parses_fixed_times_sorted() {
        let cadence: Cadence = "daily at 19:00, 10:00".parse().unwrap();
        assert_eq!(cadence, Cadence::DailyAt(vec![t(10, 0), t(19, 0)]));
        assert_eq!(cadence.to_string(), "daily at 10:00,19:00");
    }

    #[test]
    fn parses_intervals() {
        assert_eq!(
            "every 30m".parse::<Cadence>().unwrap(),
            Cadence::Every(Duration::from_secs(1800))
        );
        assert_eq!(
            "Immediately then every 1m".parse::<Cadence>().unwrap(),
            Cadence::ImmediatelyThenEvery(Duration::from_secs(60))
        );
        assert_eq!(
            "every 2h".parse::<Cadence>().unwrap().to_string(),
            "every 2h"
        );
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert_eq!("".parse::<Cadence>(), Err(CadenceParseError::Empty));
        assert_eq!(
            "daily at 25:00".parse::<Cadence>(),
            Err(CadenceParseError::InvalidTime("25:00".to_string()))
        );
        assert_eq!(
            "every 10x".parse::<Cadence>(),
            Err(CadenceParseError::InvalidDuration("10x".to_string()))
        );
        assert_eq!(
            "every 0m".parse::<Cadence>(),
            Err(CadenceParseError::ZeroDuration)
        );
        assert!(matches!(
            "daily every 15m from 10:00 to 09:00".parse::<Cadence>(),
            Err(CadenceParseError::InvertedWindow { .. })
        ));
        assert!(matches!(
            "hourly".parse::<Cadence>(),
            Err(CadenceParseError::Unrecognized(_))
        ));
    }

    #[test]
    fn first_run_includes_exact_boundary() {
        let cadence = Cadence::DailyAt(vec![t(0, 0), t(12, 0)]);
        assert_eq!(cadence.first_run(at(0, 0), utc()), at(0, 0));
        assert_eq!(cadence.first_run(at(0, 1), utc()), at(12, 0));
    }

    #[test]
    fn first_run_rolls_over_to_tomorrow() {
        let cadence = Cadence::DailyAt(vec![t(10, 0)]);
        let first = cadence.first_run(at(11, 0), utc());
        assert_eq!(first, at(10, 0) + ChronoDuration::days(1));
    }

    #[test]
    fn first_run_for_intervals() {
        let every = Cadence::Every(Duration::from_secs(600));
        assert_eq!(every.first_run(at(8, 0), utc()), at(8, 10));
        let immediate = Cadence::ImmediatelyThenEvery(Duration::from_secs(600));
        assert_eq!(immediate.first_run(at(8, 0), utc()), at(8, 0));
    }

    #[test]
    fn next_after_is_strictly_later() {
        let cadence = Cadence::DailyAt(vec![t(10, 0), t(19, 0)]);
        assert_eq!(cadence.next_after(at(10, 0), at(10, 0), utc()), at(19, 0));
        assert_eq!(
            cadence.next_after(at(19, 0), at(19, 0), utc()),
            at(10, 0) + ChronoDuration::days(1)
        );
    }

    #[test]
    fn next_after_skips_missed_interval_triggers() {
        let cadence = Cadence::Every(Duration::from_secs(300));
        // Due at 08:00 but evaluated at 08:12: 08:05 and 08:10 are not replayed
        assert_eq!(cadence.next_after(at(8, 0), at(8, 12), utc()), at(8, 15));
        assert_eq!(cadence.next_after(at(8, 0), at(8, 0), utc()), at(8, 5));
        assert_eq!(cadence.next_after(at(8, 0), at(8, 5), utc()), at(8, 10));
    }

    #[test]
    fn times_of_day_follow_offset() {
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        let cadence = Cadence::DailyAt(vec![t(10, 0)]);
        // 10:00 JST is 01:00 UTC
        assert_eq!(cadence.first_run(at(0, 30), jst), at(1, 0));
    }
}
