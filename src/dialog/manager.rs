//! Manager-only flows: event announcements and attendance export.

use super::{Button, DialogError, DialogOrchestrator, DialogResult, EXPORT_MAX_DAYS, Reply};
use crate::conversation::{EventStep, ExportStep, Flow};
use crate::database::models::User;
use crate::utils::format::{format_export, format_success_message};
use crate::utils::time::{format_datetime, parse_local_datetime};
use crate::utils::validation::{validate_date_format, validate_date_range};
use tracing::info;

const MAX_EVENT_TITLE_CHARS: usize = 100;

impl DialogOrchestrator {
    pub(super) fn start_event(&self, user: &User) -> DialogResult {
        self.require_manager(user)?;
        self.conversations
            .set(user.id, Flow::CreatingEvent(EventStep::AwaitingTitle));
        Ok(Reply::text("イベント名を入力してください").with_buttons(vec![Button::cancel()]))
    }

    pub(super) fn event_step(&self, user: &User, step: EventStep, text: &str) -> DialogResult {
        match step {
            EventStep::AwaitingTitle => {
                let title = text.trim();
                if title.is_empty() || title.chars().count() > MAX_EVENT_TITLE_CHARS {
                    return Err(DialogError::Validation(format!(
                        "イベント名は1〜{}文字で入力してください",
                        MAX_EVENT_TITLE_CHARS
                    )));
                }

                self.conversations.set(
                    user.id,
                    Flow::CreatingEvent(EventStep::AwaitingTime {
                        title: title.to_string(),
                    }),
                );
                Ok(Reply::text("開始日時を YYYY-MM-DD HH:MM の形式で入力してください")
                    .with_buttons(vec![Button::cancel()]))
            }
            EventStep::AwaitingTime { title } => {
                let tz = self.settings.tz;
                let starts_at = parse_local_datetime(text, tz).map_err(DialogError::validation)?;
                if starts_at <= self.clock.now() {
                    return Err(DialogError::Validation(
                        "開始日時は現在より後にしてください".to_string(),
                    ));
                }

                let task_id = self.planner.schedule_event_reminder(&title, starts_at)?;
                self.conversations.remove(user.id);
                info!(user_id = user.id, %task_id, "Event created");

                Ok(Reply::text(format_success_message(&format!(
                    "イベント「{}」（{}）を登録しました。参加者にリマインダーを送信します",
                    title,
                    format_datetime(starts_at, tz)
                ))))
            }
        }
    }

    pub(super) fn start_export(&self, user: &User) -> DialogResult {
        self.require_manager(user)?;
        self.conversations
            .set(user.id, Flow::ExportDateSelection(ExportStep::AwaitingFrom));
        Ok(Reply::text("開始日を YYYY-MM-DD の形式で入力してください").with_buttons(vec![Button::cancel()]))
    }

    pub(super) async fn export_step(&self, user: &User, step: ExportStep, text: &str) -> DialogResult {
        match step {
            ExportStep::AwaitingFrom => {
                let from = validate_date_format(text).map_err(DialogError::validation)?;
                self.conversations
                    .set(user.id, Flow::ExportDateSelection(ExportStep::AwaitingTo { from }));
                Ok(Reply::text(format!(
                    "終了日を YYYY-MM-DD の形式で入力してください（最大{}日間）",
                    EXPORT_MAX_DAYS
                ))
                .with_buttons(vec![Button::cancel()]))
            }
            ExportStep::AwaitingTo { from } => {
                let to = validate_date_format(text).map_err(DialogError::validation)?;
                validate_date_range(from, to, EXPORT_MAX_DAYS).map_err(DialogError::validation)?;

                let records = self.ledger.records_between(from, to).await?;
                let users = self.users.active_users().await?;
                self.conversations.remove(user.id);

                Ok(Reply::text(format_export(&records, &users, from, to, self.settings.tz)))
            }
        }
    }
}
