use crate::attendance::ledger::DailySummary;
use crate::database::models::{AttendanceRecord, AttendanceStatus, User};
use crate::utils::time::{format_datetime, format_duration_minutes, format_time};
use chrono::{FixedOffset, NaiveDate};

pub fn format_error_message(error: &str) -> String {
    format!("❌ **エラー**: {}", error)
}

pub fn format_success_message(message: &str) -> String {
    format!("✅ {}", message)
}

pub fn format_info_message(message: &str) -> String {
    format!("ℹ️ {}", message)
}

pub fn status_label(status: AttendanceStatus) -> &'static str {
    match status {
        AttendanceStatus::Pending => "未記録",
        AttendanceStatus::Present => "出勤",
        AttendanceStatus::Absent => "欠勤",
        AttendanceStatus::OnTheWay => "移動中",
    }
}

pub fn format_check_in(record: &AttendanceRecord, user: &User, tz: FixedOffset) -> String {
    let Some(check_in) = record.check_in_time else {
        return format_error_message("出勤記録がありません");
    };

    let mut message = format!("出勤しました（{}）", format_time(check_in, tz));
    if let Some(late) = record.lateness(user.work_start_time, tz) {
        message.push_str(&format!("\n⚠️ 遅刻: {}", format_duration_minutes(late.num_minutes())));
    }
    if !record.is_within_office_radius {
        message.push_str("\n📍 オフィス圏外からの出勤として記録されました");
    }

    format_success_message(&message)
}

pub fn format_check_out(record: &AttendanceRecord, user: &User, tz: FixedOffset) -> String {
    let Some(check_out) = record.check_out_time else {
        return format_error_message("退勤記録がありません");
    };

    let mut message = format!("退勤しました（{}）", format_time(check_out, tz));
    if let Some(duration) = record.work_duration() {
        message.push_str(&format!("\n勤務時間: {}", format_duration_minutes(duration.num_minutes())));
    }
    if let Some(early) = record.early_leave(user.work_end_time, tz) {
        message.push_str(&format!("\n⚠️ 早退: {}", format_duration_minutes(early.num_minutes())));
    }

    format_success_message(&message)
}

pub fn format_absence(record: &AttendanceRecord, tz: FixedOffset) -> String {
    let reason = record.absence_reason.as_deref().unwrap_or("-");
    match record.estimated_arrival_time {
        Some(eta) => format_success_message(&format!(
            "遅れて出勤する旨を記録しました（理由: {}、到着予定: {}）",
            reason,
            format_time(eta, tz)
        )),
        None => format_success_message(&format!("欠勤を記録しました（理由: {}）", reason)),
    }
}

pub fn format_record_status(record: Option<&AttendanceRecord>, user: &User, tz: FixedOffset) -> String {
    let Some(record) = record else {
        return "今日はまだ勤務記録がありません".to_string();
    };

    let mut status = format!("**状態**: {}\n", status_label(record.status));

    if let Some(check_in) = record.check_in_time {
        status.push_str(&format!("🟢 **出勤**: {}", format_time(check_in, tz)));
        if let Some(late) = record.lateness(user.work_start_time, tz) {
            status.push_str(&format!(" (遅刻 {})", format_duration_minutes(late.num_minutes())));
        }
        status.push('\n');
    }

    if let Some(check_out) = record.check_out_time {
        status.push_str(&format!("🔴 **退勤**: {}", format_time(check_out, tz)));
        if let Some(early) = record.early_leave(user.work_end_time, tz) {
            status.push_str(&format!(" (早退 {})", format_duration_minutes(early.num_minutes())));
        }
        status.push('\n');
    } else if record.check_in_time.is_some() {
        status.push_str("⚠️ **現在勤務中**\n");
    }

    if let Some(duration) = record.work_duration() {
        status.push_str(&format!(
            "⏱️ **勤務時間**: {}\n",
            format_duration_minutes(duration.num_minutes())
        ));
    }

    if let Some(reason) = &record.absence_reason {
        status.push_str(&format!("📝 **理由**: {}\n", reason));
    }

    if let Some(eta) = record.estimated_arrival_time {
        status.push_str(&format!("🚃 **到着予定**: {}\n", format_time(eta, tz)));
    }

    status
}

pub fn format_daily_summary(summary: &DailySummary) -> String {
    let mut text = String::new();

    if let Some(date) = summary.date {
        text.push_str(&format!("📊 **{} の出勤状況**\n", date.format("%Y-%m-%d (%a)")));
    }

    text.push_str(&format!("🟢 出勤: {}（うち遅刻 {}）\n", summary.present, summary.late));
    text.push_str(&format!("🚃 移動中: {}\n", summary.on_the_way));
    text.push_str(&format!("🔴 欠勤: {}\n", summary.absent));
    text.push_str(&format!("❔ 未記録: {}", summary.missing.len()));

    if !summary.missing.is_empty() {
        text.push_str(&format!("\n   {}", summary.missing.join(", ")));
    }

    text
}

/// Plain-text attendance export for a date range, grouped by day.
pub fn format_export(
    records: &[AttendanceRecord],
    users: &[User],
    from: NaiveDate,
    to: NaiveDate,
    tz: FixedOffset,
) -> String {
    if records.is_empty() {
        return format!("{} 〜 {} の勤務記録はありません", from, to);
    }

    let mut summary = format!("📅 **勤務記録 {} 〜 {}**\n", from, to);
    let mut current_date: Option<NaiveDate> = None;
    let mut total_minutes = 0i64;

    for record in records {
        // 日付が変わったらヘッダーを出す
        if current_date != Some(record.date) {
            current_date = Some(record.date);
            summary.push_str(&format!("\n**{}**\n", record.date.format("%Y-%m-%d (%a)")));
        }

        let user = users.iter().find(|u| u.id == record.user_id);
        let name = user.map(|u| u.display_name()).unwrap_or("?");
        summary.push_str(&format!("   {} - {}", name, status_label(record.status)));

        if let Some(check_in) = record.check_in_time {
            summary.push_str(&format!(" {}", format_time(check_in, tz)));
            if user.is_some_and(|u| record.is_late(u.work_start_time, tz)) {
                summary.push_str("(遅刻)");
            }
        }

        if let Some(check_out) = record.check_out_time {
            summary.push_str(&format!(" → {}", format_time(check_out, tz)));
            if user.is_some_and(|u| record.is_early(u.work_end_time, tz)) {
                summary.push_str("(早退)");
            }
        }

        if let Some(duration) = record.work_duration() {
            total_minutes += duration.num_minutes();
            summary.push_str(&format!(" ({})", format_duration_minutes(duration.num_minutes())));
        }

        if let Some(reason) = &record.absence_reason {
            summary.push_str(&format!(" [{}]", reason));
        }

        summary.push('\n');
    }

    if total_minutes > 0 {
        summary.push_str(&format!("\n🎯 **総合計勤務時間**: {}", format_duration_minutes(total_minutes)));
    }

    summary
}

pub fn format_event_reminder(title: &str, starts_at: chrono::DateTime<chrono::Utc>, tz: FixedOffset) -> String {
    format_info_message(&format!(
        "📣 **{}** は {} に始まります",
        title,
        format_datetime(starts_at, tz)
    ))
}
