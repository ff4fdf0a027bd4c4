use super::{Button, Callback, DialogError, DialogOrchestrator, DialogResult, ETA_PRESET_MINUTES, EtaChoice, Inbound, Reply};
use crate::conversation::{AbsenceDraft, AbsenceKind, AbsenceStep, Flow};
use crate::database::models::User;
use crate::utils::format::{format_absence, format_info_message};
use crate::utils::time::{combine_date_time, parse_time_string};
use chrono::{DateTime, Duration, Utc};
use tracing::error;

impl DialogOrchestrator {
    pub(super) fn start_absence(&self, user: &User) -> Reply {
        self.conversations.remove(user.id);

        let buttons = AbsenceKind::ALL
            .into_iter()
            .map(|kind| Button::new(kind.label(), format!("absence:{}", kind.as_str())))
            .collect();

        Reply::text("欠勤・遅刻の種類を選択してください").with_buttons(buttons)
    }

    pub(super) fn choose_absence_kind(&self, user: &User, kind: AbsenceKind) -> Reply {
        if kind.needs_reason() {
            self.conversations.set(
                user.id,
                Flow::ReportingAbsence(AbsenceDraft {
                    kind,
                    step: AbsenceStep::AwaitingReason,
                }),
            );
            return Reply::text(format!("【{}】理由を入力してください", kind.label()))
                .with_buttons(vec![Button::cancel()]);
        }

        self.conversations.set(
            user.id,
            Flow::ReportingAbsence(AbsenceDraft {
                kind,
                step: AbsenceStep::AwaitingEta,
            }),
        );

        let mut buttons: Vec<Button> = ETA_PRESET_MINUTES
            .into_iter()
            .map(|m| Button::new(eta_label(m), format!("eta:{}", m)))
            .collect();
        buttons.push(Button::new("時刻を指定", "eta:custom"));
        buttons.push(Button::cancel());

        Reply::text(format!("【{}】到着予定を選択してください", kind.label())).with_buttons(buttons)
    }

    pub(super) async fn absence_step(
        &self,
        user: &User,
        draft: AbsenceDraft,
        inbound: Inbound,
        callback: Option<Callback>,
    ) -> DialogResult {
        let kind = draft.kind;

        match (draft.step, inbound, callback) {
            (AbsenceStep::AwaitingReason, Inbound::Text(text), _) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(DialogError::Validation("理由を入力してください".to_string()));
                }
                self.submit_absence(user, &format!("{}: {}", kind.label(), text), None)
                    .await
            }
            (AbsenceStep::AwaitingEta, _, Some(Callback::Eta(EtaChoice::Minutes(minutes)))) => {
                let eta = self.clock.now() + Duration::minutes(minutes);
                self.submit_absence(user, kind.label(), Some(eta)).await
            }
            (AbsenceStep::AwaitingEta, _, Some(Callback::Eta(EtaChoice::Custom))) => {
                self.conversations.set(
                    user.id,
                    Flow::ReportingAbsence(AbsenceDraft {
                        kind,
                        step: AbsenceStep::AwaitingCustomEta,
                    }),
                );
                Ok(Reply::text("到着予定時刻を HH:MM の形式で入力してください")
                    .with_buttons(vec![Button::cancel()]))
            }
            (AbsenceStep::AwaitingCustomEta, Inbound::Text(text), _) => {
                let time = parse_time_string(&text).map_err(DialogError::validation)?;
                let eta = combine_date_time(self.today(), time, self.settings.tz)
                    .map_err(DialogError::validation)?;
                self.submit_absence(user, kind.label(), Some(eta)).await
            }
            (AbsenceStep::AwaitingReason | AbsenceStep::AwaitingCustomEta, _, _) => {
                Ok(Reply::text(format_info_message("メッセージで入力してください")))
            }
            (AbsenceStep::AwaitingEta, _, _) => {
                Ok(Reply::text(format_info_message("ボタンから到着予定を選択してください")))
            }
        }
    }

    /// Terminal step: ledger first, then the conversation, then the follow-up.
    async fn submit_absence(
        &self,
        user: &User,
        reason: &str,
        eta: Option<DateTime<Utc>>,
    ) -> DialogResult {
        let date = self.today();
        let record = self.ledger.mark_absent(user.id, date, reason, eta).await?;
        self.conversations.remove(user.id);

        let mut text = format_absence(&record, self.settings.tz);
        if let Some(eta) = eta {
            if let Err(e) = self.planner.schedule_arrival_follow_up(user.id, date, eta) {
                error!(user_id = user.id, "Failed to schedule arrival follow-up: {}", e);
                text.push_str("\n⚠️ 到着確認のリマインダーを設定できませんでした");
            }
        }

        Ok(Reply::text(text))
    }
}

fn eta_label(minutes: i64) -> String {
    if minutes % 60 == 0 {
        format!("{}時間後", minutes / 60)
    } else {
        format!("{}分後", minutes)
    }
}
