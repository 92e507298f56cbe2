use chrono::{DateTime, Datelike, Local, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

/// 民國年日期格式，例如 112/3/5
static TAIWAN_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{3}/\d{1,2}/\d{1,2}$").expect("valid taiwan date pattern"));

/// A trait representing the weekend concept.
pub trait Weekend {
    /// Returns `true` if the date is on a Saturday or Sunday, and `false` otherwise.
    fn is_weekend(&self) -> bool;
}

impl Weekend for DateTime<Local> {
    fn is_weekend(&self) -> bool {
        matches!(self.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

impl Weekend for NaiveDate {
    fn is_weekend(&self) -> bool {
        matches!(self.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

/// Convert ROC year to Gregorian year.
pub fn to_gregorian_year(year: i32) -> i32 {
    year + 1911
}

/// Returns whether the text looks like `YYY/M/D` in the ROC calendar.
pub fn is_taiwan_date(date_str: &str) -> bool {
    TAIWAN_DATE.is_match(date_str.trim())
}

/// Parse a date string in the format of ROC calendar
/// and return it as a NaiveDate in the Gregorian calendar.
pub fn parse_taiwan_date(date_str: &str) -> Option<NaiveDate> {
    let split_date: Vec<&str> = date_str.trim().split(['/', '-']).collect();
    if split_date.len() != 3 {
        return None;
    }

    let year = to_gregorian_year(parse_date_part::<i32>(split_date[0])?);
    let month = parse_date_part::<u32>(split_date[1])?;
    let day = parse_date_part::<u32>(split_date[2])?;

    NaiveDate::from_ymd_opt(year, month, day)
}

/// Try to parse a string as a date part and return it as an Option.
fn parse_date_part<T: std::str::FromStr>(date_part_str: &str) -> Option<T> {
    date_part_str.trim().parse::<T>().ok()
}

/// 該月份的第一天
pub fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// 證交所查詢參數使用的 yyyymmdd 格式
pub fn compact(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}
