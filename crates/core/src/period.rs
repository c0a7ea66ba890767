use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The date range covered by one ledger export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl StatementPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        StatementPeriod { start, end }
    }

    /// English month name, only when both endpoints fall in the same
    /// calendar month. Independent of `statement_year` — an Apr-to-Apr
    /// range spanning two years still yields "April".
    pub fn statement_month(&self) -> Option<String> {
        (self.start.month() == self.end.month())
            .then(|| self.start.format("%B").to_string())
    }

    /// Year, only when both endpoints fall in the same year.
    pub fn statement_year(&self) -> Option<i32> {
        (self.start.year() == self.end.year()).then(|| self.start.year())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl fmt::Display for StatementPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}
