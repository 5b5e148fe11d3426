use chrono::{Datelike, NaiveDate};

use crate::money::{is_null_sentinel, ParseError};

/// Parse a statement date.
///
/// Accepts `YYYY-MM-DD`, `MM/DD/YYYY` and `MM/DD/YY`. Two-digit years use a
/// 50-year window: 00-49 map to 2000-2049 and 50-99 to 1950-1999.
pub fn parse_date(s: &str) -> Result<Option<NaiveDate>, ParseError> {
    let s = s.trim();
    if is_null_sentinel(s) {
        return Ok(None);
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(Some(date));
    }

    let parts: Vec<&str> = s.split('/').collect();
    if let [month, day, year] = parts.as_slice() {
        let year = match year.len() {
            4 => year.parse::<i32>().ok(),
            2 => year.parse::<i32>().ok().map(window_two_digit_year),
            _ => None,
        };
        if let (Some(year), Ok(month), Ok(day)) = (year, month.parse::<u32>(), day.parse::<u32>()) {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Ok(Some(date));
            }
        }
    }

    Err(ParseError::InvalidDate(s.to_string()))
}

/// Like [`parse_date`], but also accepts year-less `MM/DD` dates, which are
/// completed with `year` (statement line items usually omit it).
pub fn parse_date_in_year(s: &str, year: i32) -> Result<Option<NaiveDate>, ParseError> {
    let trimmed = s.trim();
    if is_null_sentinel(trimmed) {
        return Ok(None);
    }
    if let [month, day] = trimmed.split('/').collect::<Vec<_>>().as_slice() {
        return match (month.parse::<u32>(), day.parse::<u32>()) {
            (Ok(m), Ok(d)) => NaiveDate::from_ymd_opt(year, m, d)
                .map(Some)
                .ok_or_else(|| ParseError::InvalidDate(trimmed.to_string())),
            _ => Err(ParseError::InvalidDate(trimmed.to_string())),
        };
    }
    parse_date(trimmed)
}

fn window_two_digit_year(yy: i32) -> i32 {
    if yy < 50 {
        2000 + yy
    } else {
        1900 + yy
    }
}

/// Year used to complete year-less dates: the statement's year when known.
pub fn reference_year(statement_date: Option<NaiveDate>) -> Option<i32> {
    statement_date.map(|d| d.year())
}
