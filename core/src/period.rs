//! Period boundary resolution.
//!
//! Given a reference date and a granularity, work out the window being
//! reported on and where the preceding window of the same size began.
//! Pure date arithmetic; nothing here can fail.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Days covered by the degraded rolling window.
pub const ROLLING_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
    /// Any label we do not recognise. Resolves to a rolling 30-day window.
    #[serde(other)]
    Rolling,
}

impl Period {
    pub const CALENDAR: [Period; 5] = [
        Period::Daily,
        Period::Weekly,
        Period::Monthly,
        Period::Quarterly,
        Period::Yearly,
    ];

    /// Parse a period label. Unknown labels degrade to `Rolling`
    /// instead of failing.
    pub fn parse_lenient(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "DAILY"     => Self::Daily,
            "WEEKLY"    => Self::Weekly,
            "MONTHLY"   => Self::Monthly,
            "QUARTERLY" => Self::Quarterly,
            "YEARLY"    => Self::Yearly,
            "ROLLING"   => Self::Rolling,
            other => {
                log::warn!("period: unrecognised granularity '{other}', using rolling {ROLLING_WINDOW_DAYS}-day window");
                Self::Rolling
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily     => "DAILY",
            Self::Weekly    => "WEEKLY",
            Self::Monthly   => "MONTHLY",
            Self::Quarterly => "QUARTERLY",
            Self::Yearly    => "YEARLY",
            Self::Rolling   => "ROLLING",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodWindow {
    pub period:              Period,
    pub start_date:          NaiveDate,
    pub end_date:            NaiveDate,
    pub previous_start_date: NaiveDate,
}

impl PeriodWindow {
    pub fn resolve(reference: NaiveDate, period: Period) -> Self {
        let (start_date, previous_start_date) = match period {
            Period::Daily => (reference, reference - Duration::days(1)),
            Period::Weekly => {
                let start = week_start(reference);
                (start, start - Duration::days(7))
            }
            Period::Monthly => {
                let start = month_start(reference);
                (start, month_start(start - Duration::days(1)))
            }
            Period::Quarterly => {
                let start = quarter_start(reference);
                (start, quarter_start(start - Duration::days(1)))
            }
            Period::Yearly => {
                let start = year_start(reference);
                (start, year_start(start - Duration::days(1)))
            }
            Period::Rolling => (
                reference - Duration::days(ROLLING_WINDOW_DAYS),
                reference - Duration::days(ROLLING_WINDOW_DAYS * 2),
            ),
        };

        Self {
            period,
            start_date,
            end_date: reference,
            previous_start_date,
        }
    }

    /// Exclusive cutoff for the "current" snapshot: end of `end_date`.
    pub fn current_cutoff(&self) -> DateTime<Utc> {
        midnight(self.end_date + Duration::days(1))
    }

    /// Exclusive cutoff for the "previous" snapshot: the instant the
    /// window opens.
    pub fn previous_cutoff(&self) -> DateTime<Utc> {
        midnight(self.start_date)
    }

    /// True when `date` falls inside `[start_date, end_date]`.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

/// Midnight UTC at the start of `date`.
pub fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// `YYYY-MM` label for the month containing `date`.
pub fn month_label(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.day0() as i64)
}

fn quarter_start(date: NaiveDate) -> NaiveDate {
    let mut start = month_start(date);
    for _ in 0..(date.month0() % 3) {
        start = month_start(start - Duration::days(1));
    }
    start
}

fn year_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.ordinal0() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn monthly_window_starts_on_the_first() {
        let w = PeriodWindow::resolve(d(2024, 3, 15), Period::Monthly);
        assert_eq!(w.start_date, d(2024, 3, 1));
        assert_eq!(w.end_date, d(2024, 3, 15));
        assert_eq!(w.previous_start_date, d(2024, 2, 1));
    }

    #[test]
    fn monthly_window_crosses_year_boundary() {
        let w = PeriodWindow::resolve(d(2024, 1, 31), Period::Monthly);
        assert_eq!(w.start_date, d(2024, 1, 1));
        assert_eq!(w.previous_start_date, d(2023, 12, 1));
    }

    #[test]
    fn weekly_window_starts_on_monday() {
        // 2024-05-16 is a Thursday.
        let w = PeriodWindow::resolve(d(2024, 5, 16), Period::Weekly);
        assert_eq!(w.start_date, d(2024, 5, 13));
        assert_eq!(w.previous_start_date, d(2024, 5, 6));

        let monday = PeriodWindow::resolve(d(2024, 5, 13), Period::Weekly);
        assert_eq!(monday.start_date, d(2024, 5, 13));
    }

    #[test]
    fn quarterly_window_uses_calendar_quarters() {
        let w = PeriodWindow::resolve(d(2024, 8, 20), Period::Quarterly);
        assert_eq!(w.start_date, d(2024, 7, 1));
        assert_eq!(w.previous_start_date, d(2024, 4, 1));

        let q1 = PeriodWindow::resolve(d(2024, 2, 29), Period::Quarterly);
        assert_eq!(q1.start_date, d(2024, 1, 1));
        assert_eq!(q1.previous_start_date, d(2023, 10, 1));
    }

    #[test]
    fn yearly_and_daily_windows() {
        let y = PeriodWindow::resolve(d(2024, 6, 30), Period::Yearly);
        assert_eq!(y.start_date, d(2024, 1, 1));
        assert_eq!(y.previous_start_date, d(2023, 1, 1));

        let day = PeriodWindow::resolve(d(2024, 3, 1), Period::Daily);
        assert_eq!(day.start_date, d(2024, 3, 1));
        assert_eq!(day.previous_start_date, d(2024, 2, 29));
    }

    #[test]
    fn unknown_label_degrades_to_rolling_thirty_days() {
        let period = Period::parse_lenient("fortnightly");
        assert_eq!(period, Period::Rolling);

        let w = PeriodWindow::resolve(d(2024, 3, 31), period);
        assert_eq!(w.start_date, d(2024, 3, 1));
        assert_eq!(w.previous_start_date, d(2024, 1, 31));
        assert_eq!(w.end_date, d(2024, 3, 31));
    }

    #[test]
    fn unknown_label_deserializes_to_rolling() {
        let p: Period = serde_json::from_str("\"HOURLY\"").unwrap();
        assert_eq!(p, Period::Rolling);
        let m: Period = serde_json::from_str("\"MONTHLY\"").unwrap();
        assert_eq!(m, Period::Monthly);
    }

    #[test]
    fn cutoffs_bracket_the_window() {
        let w = PeriodWindow::resolve(d(2024, 1, 31), Period::Monthly);
        assert_eq!(w.previous_cutoff(), midnight(d(2024, 1, 1)));
        assert_eq!(w.current_cutoff(), midnight(d(2024, 2, 1)));
        assert!(w.contains(d(2024, 1, 1)));
        assert!(w.contains(d(2024, 1, 31)));
        assert!(!w.contains(d(2024, 2, 1)));
    }
}
