//! Aggregated analytics and derived trend types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl PeriodType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PeriodType::Daily => "daily",
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
            PeriodType::Quarterly => "quarterly",
        }
    }

    /// Returns the inclusive `[start, end]` UTC bounds of the period that
    /// contains `date`. `end` is one microsecond before the next period starts.
    ///
    /// Weeks start on Monday. Quarters start in January, April, July and October.
    #[must_use]
    pub fn bounds_containing(self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let (first, next) = match self {
            PeriodType::Daily => (date, date + Duration::days(1)),
            PeriodType::Weekly => {
                let monday =
                    date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
                (monday, monday + Duration::days(7))
            }
            PeriodType::Monthly => {
                let first = month_start(date.year(), date.month());
                (first, add_months(first, 1))
            }
            PeriodType::Quarterly => {
                let quarter_month = ((date.month() - 1) / 3) * 3 + 1;
                let first = month_start(date.year(), quarter_month);
                (first, add_months(first, 3))
            }
        };

        let start = midnight_utc(first);
        let end = midnight_utc(next) - Duration::microseconds(1);
        (start, end)
    }
}

fn month_start(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

fn add_months(first: NaiveDate, months: u32) -> NaiveDate {
    let total = first.month0() + months;
    let year = first.year() + i32::try_from(total / 12).unwrap_or(0);
    month_start(year, total % 12 + 1)
}

/// UTC midnight at the start of `date`.
#[must_use]
pub fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(PeriodType::Daily),
            "weekly" => Ok(PeriodType::Weekly),
            "monthly" => Ok(PeriodType::Monthly),
            "quarterly" => Ok(PeriodType::Quarterly),
            other => Err(CoreError::InvalidPeriodType(other.to_string())),
        }
    }
}

/// Unique key of an analytics period row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    pub keyword_id: i64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub period_type: PeriodType,
}

/// Rolled-up counters for one keyword over one period.
///
/// A pure function of the jobs and assignments inside the period, so two
/// computations over unchanged inputs compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodMetrics {
    pub total_engagement: i64,
    pub social_results: i32,
    pub place_results: i32,
    /// Mean place rating rounded to 2 decimal places; `None` without rated places.
    pub average_rating: Option<Decimal>,
    pub total_jobs: i32,
    pub completed_jobs: i32,
    pub failed_jobs: i32,
    pub total_results: i64,
    /// `completed_jobs / finished jobs`, in `[0, 1]`, rounded to 4 decimal places.
    pub success_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsPeriod {
    pub id: i64,
    pub key: PeriodKey,
    pub metrics: PeriodMetrics,
    pub owner_id: Uuid,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub computed_at: DateTime<Utc>,
}

/// Summed metrics over one rolling trend window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub engagement: i64,
    pub total_jobs: i64,
    pub completed_jobs: i64,
}

impl WindowSnapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engagement == 0 && self.total_jobs == 0 && self.completed_jobs == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRecord {
    pub keyword_id: i64,
    pub owner_id: Uuid,
    pub recent: WindowSnapshot,
    pub previous: WindowSnapshot,
    pub engagement_delta: f64,
    pub job_success_delta: f64,
    pub trend_score: f64,
    pub computed_at: DateTime<Utc>,
}

/// Per-owner, per-category totals over the trailing 30 days of daily analytics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRollup {
    pub owner_id: Uuid,
    pub category: String,
    pub keyword_count: i64,
    pub total_engagement: i64,
    pub total_jobs: i64,
    pub completed_jobs: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn daily_bounds_cover_the_whole_day() {
        let (start, end) = PeriodType::Daily.bounds_containing(date(2026, 3, 14));
        assert_eq!(start.to_rfc3339(), "2026-03-14T00:00:00+00:00");
        assert_eq!(end, midnight_utc(date(2026, 3, 15)) - Duration::microseconds(1));
    }

    #[test]
    fn weekly_bounds_start_on_monday() {
        // 2026-03-14 is a Saturday.
        let (start, end) = PeriodType::Weekly.bounds_containing(date(2026, 3, 14));
        assert_eq!(start, midnight_utc(date(2026, 3, 9)));
        assert_eq!(end, midnight_utc(date(2026, 3, 16)) - Duration::microseconds(1));
    }

    #[test]
    fn monthly_bounds_roll_over_year_end() {
        let (start, end) = PeriodType::Monthly.bounds_containing(date(2025, 12, 31));
        assert_eq!(start, midnight_utc(date(2025, 12, 1)));
        assert_eq!(end, midnight_utc(date(2026, 1, 1)) - Duration::microseconds(1));
    }

    #[test]
    fn quarterly_bounds() {
        let (start, end) = PeriodType::Quarterly.bounds_containing(date(2026, 8, 20));
        assert_eq!(start, midnight_utc(date(2026, 7, 1)));
        assert_eq!(end, midnight_utc(date(2026, 10, 1)) - Duration::microseconds(1));
    }

    #[test]
    fn period_type_parse() {
        assert_eq!("weekly".parse::<PeriodType>().unwrap(), PeriodType::Weekly);
        assert!("hourly".parse::<PeriodType>().is_err());
    }

    #[test]
    fn empty_window_snapshot() {
        assert!(WindowSnapshot::default().is_empty());
        assert!(!WindowSnapshot {
            engagement: 1,
            ..WindowSnapshot::default()
        }
        .is_empty());
    }
}
