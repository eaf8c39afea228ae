//! Calendar keys for the ledger
//!
//! Days are UTC dates keyed `YYYY-MM-DD`. Weeks are ISO-8601 weeks
//! (Monday to Sunday, UTC) keyed `YYYY-Www`.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Current UTC date
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Source of the current date for the ledger
pub trait Calendar: Send + Sync {
    fn today(&self) -> NaiveDate;

    fn current_week(&self) -> WeekId {
        WeekId::from_date(self.today())
    }
}

/// Wall-clock UTC calendar
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCalendar;

impl Calendar for SystemCalendar {
    fn today(&self) -> NaiveDate {
        today_utc()
    }
}

/// Calendar that only moves when told to. Clones share the same date.
#[derive(Debug, Clone)]
pub struct ManualCalendar {
    today: Arc<Mutex<NaiveDate>>,
}

impl ManualCalendar {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Arc::new(Mutex::new(today)),
        }
    }

    pub fn set(&self, date: NaiveDate) {
        *self.today.lock().unwrap_or_else(PoisonError::into_inner) = date;
    }
}

impl Calendar for ManualCalendar {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ledger key for a day
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

/// ISO week identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekId {
    year: i32,
    week: u32,
}

impl WeekId {
    /// Build from an ISO year and week number (1..=53).
    ///
    /// Panics in debug builds on a week number the year does not have.
    pub fn new(year: i32, week: u32) -> Self {
        debug_assert!(
            NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).is_some(),
            "invalid ISO week {year}-W{week}"
        );
        Self { year, week }
    }

    pub fn checked(year: i32, week: u32) -> Option<Self> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).map(|_| Self { year, week })
    }

    /// Week containing `date`
    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    pub fn current() -> Self {
        Self::from_date(today_utc())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn week(&self) -> u32 {
        self.week
    }

    pub fn monday(&self) -> NaiveDate {
        // Constructed values are always valid ISO weeks
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon)
            .unwrap_or(NaiveDate::MIN)
    }

    /// The seven dates of this week, Monday first
    pub fn dates(&self) -> [NaiveDate; 7] {
        let monday = self.monday();
        std::array::from_fn(|i| monday + Duration::days(i as i64))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        Self::from_date(date) == *self
    }

    pub fn previous(&self) -> Self {
        Self::from_date(self.monday() - Duration::days(7))
    }

    pub fn next(&self) -> Self {
        Self::from_date(self.monday() + Duration::days(7))
    }
}

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

impl FromStr for WeekId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, week) = s
            .split_once("-W")
            .ok_or_else(|| format!("week id must look like YYYY-Www, got {s:?}"))?;
        let year: i32 = year.parse().map_err(|_| format!("bad year in {s:?}"))?;
        let week: u32 = week.parse().map_err(|_| format!("bad week in {s:?}"))?;
        WeekId::checked(year, week).ok_or_else(|| format!("{s:?} is not an ISO week"))
    }
}

impl Serialize for WeekId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WeekId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
