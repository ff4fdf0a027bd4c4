use crate::utils::time::{parse_date_string, parse_time_string};
use anyhow::Result;
use chrono::{NaiveDate, NaiveTime};

pub fn validate_time_format(time_str: &str) -> Result<NaiveTime> {
    parse_time_string(time_str)
}

pub fn validate_date_format(date_str: &str) -> Result<NaiveDate> {
    parse_date_string(date_str)
}

pub fn validate_time_order(start_time: NaiveTime, end_time: NaiveTime) -> Result<()> {
    if end_time <= start_time {
        return Err(anyhow::anyhow!(
            "終了時間は開始時間より後である必要があります"
        ));
    }
    Ok(())
}

pub fn validate_reasonable_work_hours(start_time: NaiveTime, end_time: NaiveTime) -> Result<()> {
    let hours = end_time.signed_duration_since(start_time).num_hours();

    if hours > 16 {
        return Err(anyhow::anyhow!(
            "勤務時間が16時間を超えています。正しい時間を入力してください"
        ));
    }

    Ok(())
}

pub fn validate_date_range(from: NaiveDate, to: NaiveDate, max_days: i64) -> Result<()> {
    if to < from {
        return Err(anyhow::anyhow!("終了日は開始日以降である必要があります"));
    }

    if to.signed_duration_since(from).num_days() >= max_days {
        return Err(anyhow::anyhow!("期間は{}日以内で指定してください", max_days));
    }

    Ok(())
}

pub fn validate_full_name(name: &str) -> Result<String> {
    let name = name.trim();

    if name.chars().count() < 2 {
        return Err(anyhow::anyhow!("氏名を入力してください"));
    }

    if name.chars().count() > 100 {
        return Err(anyhow::anyhow!("氏名が長すぎます"));
    }

    Ok(name.to_string())
}
