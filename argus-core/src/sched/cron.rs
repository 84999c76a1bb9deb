//! Five-field cron expressions with minute granularity.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{EngineError, Result};

/// A parsed cron trigger. Accepts the standard 5-field Unix form
/// (minute hour day-of-month month day-of-week); the seconds field the
/// underlying parser wants is pinned to zero.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    inner: cron::Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let fields = expression.split_whitespace().count();
        if fields != 5 {
            return Err(EngineError::InvalidInput(format!(
                "cron expression must have 5 fields, got {fields}: {expression:?}"
            )));
        }
        let with_seconds = format!("0 {expression}");
        let inner = cron::Schedule::from_str(&with_seconds).map_err(|e| {
            EngineError::InvalidInput(format!("invalid cron expression {expression:?}: {e}"))
        })?;
        Ok(CronSchedule {
            expression: expression.to_string(),
            inner,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.inner.after(&after).next()
    }

    /// Whether the schedule fires within `(previous, now]`, at minute
    /// granularity.
    pub fn due(&self, previous: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.next_after(previous).is_some_and(|fire| fire <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_standard_five_field_expressions() {
        for expr in ["0 2 * * *", "*/5 * * * *", "30 4 1 * 0"] {
            assert!(CronSchedule::parse(expr).is_ok(), "{expr}");
        }
        assert!(CronSchedule::parse("not a cron").is_err());
        assert!(CronSchedule::parse("0 2 * *").is_err());
        assert!(CronSchedule::parse("0 0 2 * * *").is_err());
    }

    #[test]
    fn nightly_schedule_fires_at_two() {
        let schedule = CronSchedule::parse("0 2 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let next = schedule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 11, 2, 0, 0).unwrap());
    }

    #[test]
    fn due_detects_fires_inside_the_window() {
        let schedule = CronSchedule::parse("*/5 * * * *").unwrap();
        let start = Utc.with_ymd_and_hms(2024, 5, 10, 12, 1, 0).unwrap();
        assert!(!schedule.due(start, start + chrono::Duration::minutes(2)));
        assert!(schedule.due(start, start + chrono::Duration::minutes(5)));
    }
}
