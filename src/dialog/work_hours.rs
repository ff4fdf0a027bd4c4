use super::{Button, DialogError, DialogOrchestrator, DialogResult, Reply};
use crate::conversation::{Flow, WorkHoursStep};
use crate::database::models::User;
use crate::database::store::WorkHours;
use crate::scheduler::reminders::WorkHoursScope;
use crate::utils::format::format_success_message;
use crate::utils::validation::{validate_reasonable_work_hours, validate_time_format, validate_time_order};
use tracing::error;

impl DialogOrchestrator {
    pub(super) fn start_work_hours(&self, user: &User) -> Reply {
        self.conversations
            .set(user.id, Flow::SettingWorkHours(WorkHoursStep::AwaitingStart));

        Reply::text(format!(
            "現在の勤務時間: {}〜{}\n始業時刻を HH:MM の形式で入力してください",
            user.work_start_time.format("%H:%M"),
            user.work_end_time.format("%H:%M")
        ))
        .with_buttons(vec![Button::cancel()])
    }

    pub(super) async fn work_hours_step(&self, user: &User, step: WorkHoursStep, text: &str) -> DialogResult {
        match step {
            WorkHoursStep::AwaitingStart => {
                let start = validate_time_format(text).map_err(DialogError::validation)?;
                self.conversations
                    .set(user.id, Flow::SettingWorkHours(WorkHoursStep::AwaitingEnd { start }));
                Ok(Reply::text("終業時刻を HH:MM の形式で入力してください")
                    .with_buttons(vec![Button::cancel()]))
            }
            WorkHoursStep::AwaitingEnd { start } => {
                let end = validate_time_format(text).map_err(DialogError::validation)?;
                validate_time_order(start, end).map_err(DialogError::validation)?;
                validate_reasonable_work_hours(start, end).map_err(DialogError::validation)?;

                let user = self
                    .users
                    .update_work_hours(user.id, WorkHours { start, end })
                    .await?;
                self.conversations.remove(user.id);

                let mut text = format_success_message(&format!(
                    "勤務時間を {}〜{} に変更しました",
                    start.format("%H:%M"),
                    end.format("%H:%M")
                ));
                if let Err(e) = self
                    .planner
                    .on_work_hours_changed(WorkHoursScope::User(user.id))
                    .await
                {
                    error!(user_id = user.id, "Failed to reschedule check-in reminder: {:#}", e);
                    text.push_str("\n⚠️ 出勤リマインダーを更新できませんでした");
                }

                Ok(Reply::text(text))
            }
        }
    }
}
