//! Date formatting and Persian date-phrase parsing.
//!
//! Event dates are stored as ISO 8601 `YYYY-MM-DD` Gregorian strings; event
//! times are kept verbatim as reported upstream. Everything here is pure so
//! the web layer can format display labels without touching I/O.

use crate::jalali::{self, PERSIAN_MONTHS, PERSIAN_WEEKDAYS};
use chrono::{Datelike, NaiveDate};
use regex::Regex;

/// Jalali century the portal's dates fall in. Year tokens are matched against
/// this prefix; revisit when the 1500s arrive.
const JALALI_CENTURY_PREFIX: &str = "14";

/// Format a Gregorian date as `YYYY-MM-DD` with zero-padded month and day.
pub fn format_gregorian_date(year: i32, month: i32, day: i32) -> String {
    format!("{year:04}-{month:02}-{day:02}")
}

/// Format a date as an unpadded Jalali `jy/jm/jd` string.
pub fn jalali_date_string(date: NaiveDate) -> String {
    match jalali::gregorian_to_jalali(date.year(), date.month() as i32, date.day() as i32) {
        Some((jy, jm, jd)) => format!("{jy}/{jm}/{jd}"),
        None => date.format("%Y/%m/%d").to_string(),
    }
}

fn weekday_name(date: NaiveDate) -> &'static str {
    PERSIAN_WEEKDAYS[date.weekday().num_days_from_sunday() as usize]
}

/// Persian relative-day label for `target` as seen from `reference`.
///
/// Today/tomorrow/yesterday get their own words, dates within a week either
/// way get the weekday name, anything further gets weekday plus the full
/// Jalali date.
pub fn to_relative_date(target: NaiveDate, reference: NaiveDate) -> String {
    let diff = (target - reference).num_days();

    match diff {
        0 => "امروز".to_string(),
        1 => "فردا".to_string(),
        -1 => "دیروز".to_string(),
        2..=7 | -7..=-2 => weekday_name(target).to_string(),
        _ => format!("{}، {}", weekday_name(target), jalali_date_string(target)),
    }
}

/// Convert an upstream `HH:mm:ss` time to a 12-hour Persian display string.
/// Hours 0 and 12 both render as 12; the period marker is ق.ظ before noon
/// and ب.ظ from noon on. Malformed input is returned unchanged.
pub fn to_am_pm(time: &str) -> String {
    let mut parts = time.split(':');
    let (Some(h), Some(m)) = (parts.next(), parts.next()) else {
        return time.to_string();
    };
    let (Ok(hour), Ok(minute)) = (h.trim().parse::<u32>(), m.trim().parse::<u32>()) else {
        return time.to_string();
    };

    let period = if hour >= 12 { "ب.ظ" } else { "ق.ظ" };
    let hour12 = match hour % 12 {
        0 => 12,
        rest => rest,
    };
    format!("{hour12}:{minute:02} {period}")
}

/// Extract a Gregorian `YYYY-MM-DD` date from a loose Persian date phrase
/// like `"پنجشنبه 26 تیر ماه 1404"`.
///
/// Tokens are checked independently: a 1-2 digit number is the day, a token
/// containing a Jalali month name is the month, and a 4-digit number in the
/// operative century is the year. Returns `None` unless all three are found;
/// callers decide what the fallback date is.
pub fn parse_jalali_phrase(phrase: &str) -> Option<String> {
    let day_re = Regex::new(r"^\d{1,2}$").expect("invalid day pattern");
    let year_re =
        Regex::new(&format!(r"^{JALALI_CENTURY_PREFIX}\d{{2}}$")).expect("invalid year pattern");

    let mut day = None;
    let mut month = None;
    let mut year = None;

    for token in phrase.split_whitespace() {
        if day_re.is_match(token) {
            day = token.parse::<i32>().ok();
        }

        if let Some(idx) = PERSIAN_MONTHS.iter().position(|name| token.contains(name)) {
            month = Some(idx as i32 + 1);
        }

        if year_re.is_match(token) {
            year = token.parse::<i32>().ok();
        }
    }

    let (jy, jm, jd) = (year?, month?, day?);
    let (gy, gm, gd) = jalali::jalali_to_gregorian(jy, jm, jd)?;
    Some(format_gregorian_date(gy, gm, gd))
}
