use crate::query_spec::{TimePreset, TimeRange};
use crate::rows::DataRow;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// A resolved time range. A preset resolves to calendar years; explicit
/// bounds apply to `order_date` and are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub min_year: Option<i32>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl TimeWindow {
    /// Resolve against `today`. The preset wins over explicit bounds.
    pub fn resolve(range: &TimeRange, today: NaiveDate) -> Self {
        match range.preset {
            Some(TimePreset::LastTwoYears) => Self {
                min_year: Some(today.year() - 1),
                from: None,
                to: None,
            },
            None => Self {
                min_year: None,
                from: range.from,
                to: range.to,
            },
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min_year.is_none() && self.from.is_none() && self.to.is_none()
    }

    pub fn contains(&self, row: &DataRow) -> bool {
        if let Some(min_year) = self.min_year {
            if row.year < min_year {
                return false;
            }
        }
        if let Some(from) = self.from {
            if row.order_date < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if row.order_date > to {
                return false;
            }
        }
        true
    }

    /// First date the window can include, if it has a lower bound.
    pub fn start(&self) -> Option<NaiveDate> {
        match (self.min_year, self.from) {
            (Some(year), _) => NaiveDate::from_ymd_opt(year, 1, 1),
            (None, from) => from,
        }
    }

    /// Lower bound for the bulk fetch: the later of the configured floor
    /// and the window start.
    pub fn fetch_from(&self, floor: NaiveDate) -> NaiveDate {
        match self.start() {
            Some(start) if start > floor => start,
            _ => floor,
        }
    }
}
