//! Restricted cron parser (C8)
//!
//! Only the subset `original_source`'s scheduler actually exercises is
//! supported: literal numbers, `*`, and `*/step` on the minute and hour
//! fields. Day-of-month, month, and day-of-week must be `*` — ranges and
//! comma lists are rejected rather than silently ignored.

use chrono::{DateTime, Timelike, Utc};

use crate::error::{ErrorCode, KafkaOpsError, Result};

/// One full iteration is bounded at two days of minutes; every supported
/// expression has a match within one day, so this only guards against a
/// logic bug turning into an infinite loop.
const MAX_ITERATIONS: i64 = 2 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Any,
    Literal(u32),
    Step(u32),
}

impl Field {
    fn parse(raw: &str, max: u32) -> Result<Self> {
        if raw == "*" {
            return Ok(Field::Any);
        }
        if let Some(step) = raw.strip_prefix("*/") {
            let step: u32 = step
                .parse()
                .map_err(|_| cron_error(format!("invalid step field '{raw}'")))?;
            if step == 0 || step > max {
                return Err(cron_error(format!("step field '{raw}' out of range")));
            }
            return Ok(Field::Step(step));
        }
        let value: u32 = raw.parse().map_err(|_| cron_error(format!("invalid literal field '{raw}'")))?;
        if value > max {
            return Err(cron_error(format!("literal field '{raw}' exceeds maximum {max}")));
        }
        Ok(Field::Literal(value))
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            Field::Any => true,
            Field::Literal(n) => *n == value,
            Field::Step(n) => value % n == 0,
        }
    }
}

fn cron_error(message: impl Into<String>) -> KafkaOpsError {
    KafkaOpsError::new(message, ErrorCode::ValidationError)
}

/// A parsed five-field cron expression, restricted to the minute/hour subset.
pub struct CronSchedule {
    minute: Field,
    hour: Field,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(cron_error(format!(
                "cron expression must have 5 parts, got {} in '{expression}'",
                parts.len()
            )));
        }

        let [minute, hour, day, month, weekday] = [parts[0], parts[1], parts[2], parts[3], parts[4]];
        if day != "*" || month != "*" || weekday != "*" {
            return Err(cron_error(
                "day-of-month, month, and day-of-week fields must be '*'; ranges and lists are not supported",
            ));
        }

        Ok(Self { minute: Field::parse(minute, 59)?, hour: Field::parse(hour, 23)? })
    }

    /// The next minute-aligned instant strictly after `from` that satisfies
    /// this schedule.
    pub fn next_run_after(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let mut candidate = (from + chrono::Duration::minutes(1))
            .with_second(0)
            .and_then(|d| d.with_nanosecond(0))
            .ok_or_else(|| cron_error("failed to normalize candidate timestamp"))?;

        for _ in 0..MAX_ITERATIONS {
            if self.minute.matches(candidate.minute()) && self.hour.matches(candidate.hour()) {
                return Ok(candidate);
            }
            candidate += chrono::Duration::minutes(1);
        }

        Err(cron_error(format!("no matching run time found within {MAX_ITERATIONS} minutes")))
    }
}

/// Convenience wrapper used by callers that only need the next run time.
pub fn next_run_time(expression: &str, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
    CronSchedule::parse(expression)?.next_run_after(from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, minute, 0).unwrap()
    }

    #[test]
    fn hourly_on_the_hour_from_half_past() {
        let next = next_run_time("0 * * * *", at(10, 30)).unwrap();
        assert_eq!(next, at(11, 0));
    }

    #[test]
    fn daily_at_midnight_rolls_to_next_day() {
        let next = next_run_time("0 0 * * *", at(10, 30)).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap());
    }

    #[test]
    fn every_fifteen_minutes() {
        let next = next_run_time("*/15 * * * *", at(10, 7)).unwrap();
        assert_eq!(next, at(10, 15));
    }

    #[test]
    fn every_five_minutes() {
        let next = next_run_time("*/5 * * * *", at(10, 7)).unwrap();
        assert_eq!(next, at(10, 10));
    }

    #[test]
    fn rejects_wrong_field_count() {
        let err = CronSchedule::parse("0 * * *").unwrap_err();
        assert!(err.message.contains("must have 5 parts"));
    }

    #[test]
    fn rejects_non_wildcard_day_field() {
        assert!(CronSchedule::parse("0 0 1 * *").is_err());
    }

    #[test]
    fn rejects_step_of_zero() {
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
    }
}
