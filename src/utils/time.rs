use anyhow::Result;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

pub fn business_offset(offset_minutes: i32) -> Result<FixedOffset> {
    offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| anyhow::anyhow!("UTC offset out of range: {} minutes", offset_minutes))
}

pub fn local_date(timestamp: DateTime<Utc>, tz: FixedOffset) -> NaiveDate {
    timestamp.with_timezone(&tz).date_naive()
}

pub fn parse_time_string(time_str: &str) -> Result<NaiveTime> {
    let time_str = time_str.trim();

    if let Ok(time) = NaiveTime::parse_from_str(time_str, "%H:%M") {
        return Ok(time);
    }

    if let Ok(time) = NaiveTime::parse_from_str(time_str, "%H:%M:%S") {
        return Ok(time);
    }

    Err(anyhow::anyhow!("Invalid time format. Use HH:MM or HH:MM:SS"))
}

pub fn parse_date_string(date_str: &str) -> Result<NaiveDate> {
    let date_str = date_str.trim();

    for format in ["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(date_str, format) {
            return Ok(date);
        }
    }

    Err(anyhow::anyhow!("Invalid date format. Use YYYY-MM-DD"))
}

/// `YYYY-MM-DD HH:MM` in business local time.
pub fn parse_local_datetime(input: &str, tz: FixedOffset) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(input.trim(), "%Y-%m-%d %H:%M")
        .map_err(|_| anyhow::anyhow!("Invalid date/time format. Use YYYY-MM-DD HH:MM"))?;
    combine_date_time(naive.date(), naive.time(), tz)
}

pub fn combine_date_time(date: NaiveDate, time: NaiveTime, tz: FixedOffset) -> Result<DateTime<Utc>> {
    let naive_datetime = date.and_time(time);
    tz.from_local_datetime(&naive_datetime)
        .single()
        .map(|dt| dt.to_utc())
        .ok_or_else(|| anyhow::anyhow!("Ambiguous local time: {}", naive_datetime))
}

pub fn format_duration_minutes(minutes: i64) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;

    if hours > 0 {
        format!("{}時間{}分", hours, mins)
    } else {
        format!("{}分", mins)
    }
}

pub fn format_datetime(datetime: DateTime<Utc>, tz: FixedOffset) -> String {
    datetime.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_time(datetime: DateTime<Utc>, tz: FixedOffset) -> String {
    datetime.with_timezone(&tz).format("%H:%M").to_string()
}
