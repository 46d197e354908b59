//! Named interval schedules for cron triggers.
//!
//! Overseer does not evaluate cron expressions. A cron trigger names one of a
//! fixed set of intervals and fires when at least one period has elapsed since
//! it last fired (or immediately, if it never has).
//!
//! Accepted names:
//!
//! | name | period |
//! |------|--------|
//! | `every_minute` | 1 minute |
//! | `every_5_minutes`, `every_15_minutes`, `every_30_minutes` | as named |
//! | `every_<N>_minutes` / `every_<N>_minute` | N minutes |
//! | `hourly` | 1 hour |
//! | `every_6_hours`, `every_12_hours` | as named |
//! | `every_<N>_hours` / `every_<N>_hour` | N hours |
//! | `daily` | 24 hours |
//! | `weekly` | 7 days |

use crate::error::CoreError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fixed-period schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IntervalSchedule {
    EveryMinutes(u32),
    EveryHours(u32),
    Daily,
    Weekly,
}

impl IntervalSchedule {
    /// Parse a schedule name.
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        let schedule = match name {
            "every_minute" => Self::EveryMinutes(1),
            "hourly" => Self::EveryHours(1),
            "daily" => Self::Daily,
            "weekly" => Self::Weekly,
            other => Self::parse_every(other)
                .ok_or_else(|| CoreError::InvalidSchedule(name.to_string()))?,
        };
        Ok(schedule)
    }

    fn parse_every(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("every_")?;
        let (count, unit) = rest.split_once('_')?;
        let count: u32 = count.parse().ok().filter(|n| *n > 0)?;
        match unit {
            "minute" | "minutes" => Some(Self::EveryMinutes(count)),
            "hour" | "hours" => Some(Self::EveryHours(count)),
            _ => None,
        }
    }

    /// Length of one period.
    pub fn period(&self) -> Duration {
        match self {
            Self::EveryMinutes(n) => Duration::minutes(i64::from(*n)),
            Self::EveryHours(n) => Duration::hours(i64::from(*n)),
            Self::Daily => Duration::days(1),
            Self::Weekly => Duration::weeks(1),
        }
    }

    /// Whether a trigger last fired at `last_run` is due at `now`.
    pub fn is_due(&self, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_run {
            None => true,
            Some(last) => now.signed_duration_since(last) >= self.period(),
        }
    }
}

impl fmt::Display for IntervalSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EveryMinutes(1) => f.write_str("every_minute"),
            Self::EveryMinutes(n) => write!(f, "every_{n}_minutes"),
            Self::EveryHours(1) => f.write_str("hourly"),
            Self::EveryHours(n) => write!(f, "every_{n}_hours"),
            Self::Daily => f.write_str("daily"),
            Self::Weekly => f.write_str("weekly"),
        }
    }
}

impl FromStr for IntervalSchedule {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for IntervalSchedule {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<IntervalSchedule> for String {
    fn from(schedule: IntervalSchedule) -> Self {
        schedule.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case("every_minute", 60)]
    #[case("every_5_minutes", 300)]
    #[case("every_15_minutes", 900)]
    #[case("every_30_minutes", 1_800)]
    #[case("hourly", 3_600)]
    #[case("every_6_hours", 21_600)]
    #[case("every_12_hours", 43_200)]
    #[case("daily", 86_400)]
    #[case("weekly", 604_800)]
    #[case("every_2_hour", 7_200)]
    fn named_intervals(#[case] name: &str, #[case] seconds: i64) {
        let schedule = IntervalSchedule::parse(name).unwrap();
        assert_eq!(schedule.period().num_seconds(), seconds);
    }

    #[rstest]
    #[case("")]
    #[case("fortnightly")]
    #[case("every_0_minutes")]
    #[case("every_x_minutes")]
    #[case("every_5_days")]
    #[case("*/5 * * * *")]
    fn rejects_unknown(#[case] name: &str) {
        assert!(matches!(
            IntervalSchedule::parse(name),
            Err(CoreError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(
            IntervalSchedule::parse("every_1_minutes").unwrap().to_string(),
            "every_minute"
        );
        assert_eq!(
            IntervalSchedule::parse("every_1_hour").unwrap().to_string(),
            "hourly"
        );
        assert_eq!(
            IntervalSchedule::EveryMinutes(15).to_string(),
            "every_15_minutes"
        );
    }

    #[test]
    fn due_when_never_run_or_period_elapsed() {
        let schedule = IntervalSchedule::EveryHours(1);
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

        assert!(schedule.is_due(None, t0));
        assert!(!schedule.is_due(Some(t0), t0 + Duration::minutes(59)));
        assert!(schedule.is_due(Some(t0), t0 + Duration::minutes(60)));
        assert!(schedule.is_due(Some(t0), t0 + Duration::hours(5)));
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&IntervalSchedule::Daily).unwrap();
        assert_eq!(json, "\"daily\"");
        let back: IntervalSchedule = serde_json::from_str("\"every_15_minutes\"").unwrap();
        assert_eq!(back, IntervalSchedule::EveryMinutes(15));
    }
}
