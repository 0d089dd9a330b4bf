use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};

pub const SUBMIT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn offset_from_hours(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours.checked_mul(60 * 60)?)
}

/// Renders a unix timestamp as `YYYY-MM-DD HH:MM:SS` at `offset`.
pub fn format_submit_time(timestamp: i64, offset: FixedOffset) -> Option<String> {
    Some(
        DateTime::from_timestamp(timestamp, 0)?
            .with_timezone(&offset)
            .format(SUBMIT_TIME_FORMAT)
            .to_string(),
    )
}

/// Unix timestamp of the first second of `date` at `offset`.
pub fn start_of_day(date: NaiveDate, offset: FixedOffset) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp() - i64::from(offset.local_minus_utc())
}

pub fn parse_date(text: &str) -> chrono::ParseResult<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
}
