use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Every month view is a fixed 6-week block. Variable-length grids shift the
/// layout between months; the UI relies on this never happening.
pub const GRID_CELLS: usize = 42;

#[derive(Debug, Clone, PartialEq)]
pub enum CalendarError {
    InvalidArgument(String),
}

impl fmt::Display for CalendarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalendarError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for CalendarError {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarEvent {
    pub title: String,
    pub time: String,
    pub kind: String,
}

/// Annotation attached to an in-month cell, looked up by DateKey.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Marker {
    Events(Vec<CalendarEvent>),
    Attendance(crate::session::AttendanceStatus),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarCell {
    pub date: NaiveDate,
    pub in_current_month: bool,
    pub is_today: bool,
    pub marker: Option<Marker>,
}

/// Days in the given month, `month0` 0-based (0 = January).
pub fn days_in_month(year: i32, month0: u32) -> u32 {
    let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
    match month0 {
        0 | 2 | 4 | 6 | 7 | 9 | 11 => 31,
        3 | 5 | 8 | 10 => 30,
        1 if leap => 29,
        1 => 28,
        _ => 30,
    }
}

/// Weekday index (0 = Sunday) of the first day of `(year, month0)`.
/// `None` when the month is out of range or the year is outside what
/// chrono can represent.
pub fn first_weekday(year: i32, month0: u32) -> Option<u32> {
    if month0 > 11 {
        return None;
    }
    let first = NaiveDate::from_ymd_opt(year, month0 + 1, 1)?;
    Some(first.weekday().num_days_from_sunday())
}

/// Canonical `YYYY-MM-DD` key used to index markers by date.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    // chrono accepts unpadded fields; the canonical key is always padded.
    if key.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

/// Builds the 42-cell month view for `(year, month0)`.
///
/// Cells run Sunday-first: trailing days of the previous month, every day of
/// the current month, then leading days of the next month up to exactly
/// [`GRID_CELLS`]. Markers apply to in-month cells only; `is_today` compares
/// against the injected `today`, never an ambient clock. Fresh cells are
/// allocated on every call, so rebuilding a month is idempotent.
pub fn build_month_grid(
    year: i32,
    month0: u32,
    markers: &HashMap<String, Marker>,
    today: NaiveDate,
) -> Result<Vec<CalendarCell>, CalendarError> {
    if month0 > 11 {
        return Err(CalendarError::InvalidArgument(format!(
            "month0 must be 0..=11, got {}",
            month0
        )));
    }
    let lead = first_weekday(year, month0).ok_or_else(|| {
        CalendarError::InvalidArgument(format!("year {} out of range", year))
    })?;
    let days = days_in_month(year, month0) as usize;
    // first_weekday already proved the first of the month representable.
    let start = NaiveDate::from_ymd_opt(year, month0 + 1, 1)
        .map(|first| first - Duration::days(i64::from(lead)))
        .ok_or_else(|| CalendarError::InvalidArgument(format!("year {} out of range", year)))?;
    let lead = lead as usize;

    let mut cells = Vec::with_capacity(GRID_CELLS);
    for offset in 0..GRID_CELLS {
        let date = start + Duration::days(offset as i64);
        let in_current_month = offset >= lead && offset < lead + days;
        let marker = if in_current_month {
            markers.get(&date_key(date)).cloned()
        } else {
            None
        };
        cells.push(CalendarCell {
            date,
            in_current_month,
            is_today: date == today,
            marker,
        });
    }
    Ok(cells)
}
