use super::{Button, DialogError, DialogOrchestrator, DialogResult, Reply};
use crate::conversation::Flow;
use crate::database::models::User;
use crate::utils::format::{format_info_message, format_success_message};
use crate::utils::validation::validate_full_name;
use tracing::{error, info};

impl DialogOrchestrator {
    pub(super) fn start_registration(&self, user: &User) -> DialogResult {
        if user.is_registered {
            return Ok(Reply::text(format_info_message(&format!(
                "{} さんは既に登録済みです",
                user.display_name()
            ))));
        }

        self.conversations.set(user.id, Flow::Registering);
        Ok(Reply::text("氏名（フルネーム）を入力してください").with_buttons(vec![Button::cancel()]))
    }

    pub(super) async fn submit_full_name(&self, user: &User, text: &str) -> DialogResult {
        let full_name = validate_full_name(text).map_err(DialogError::validation)?;

        let user = self.users.complete_registration(user.id, &full_name).await?;
        self.conversations.remove(user.id);
        info!(user_id = user.id, "User registered");

        let mut text = format_success_message(&format!(
            "登録が完了しました。{} さんの勤務時間は {}〜{} です（`/workhours` で変更できます）",
            user.display_name(),
            user.work_start_time.format("%H:%M"),
            user.work_end_time.format("%H:%M")
        ));
        if let Err(e) = self.planner.register_user(&user) {
            error!(user_id = user.id, "Failed to register check-in reminder: {}", e);
            text.push_str("\n⚠️ 出勤リマインダーを設定できませんでした");
        }

        Ok(Reply::text(text))
    }
}
