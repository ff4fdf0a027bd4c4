use super::{Button, CONFIRM_CHECKOUT_TOKEN, DialogError, DialogOrchestrator, DialogResult, Reply};
use crate::attendance::geo::Coordinates;
use crate::attendance::ledger::LedgerError;
use crate::conversation::Flow;
use crate::database::models::User;
use crate::utils::format::{format_check_in, format_check_out};
use crate::utils::time::format_time;
use tracing::info;

impl DialogOrchestrator {
    pub(super) fn start_check_in(&self, user: &User) -> Reply {
        self.conversations.set(user.id, Flow::CheckingIn);
        Reply::text("現在地の緯度と経度を「35.6812, 139.7671」の形式で送信してください")
            .with_buttons(vec![Button::cancel()])
    }

    /// Accepts `lat, lon` or `lat lon`.
    pub(super) async fn submit_location_text(&self, user: &User, text: &str) -> DialogResult {
        let parts: Vec<f64> = text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| DialogError::Validation("緯度と経度を数値で入力してください".to_string()))?;

        match parts.as_slice() {
            [latitude, longitude] => self.submit_location(user, *latitude, *longitude).await,
            _ => Err(DialogError::Validation(
                "緯度と経度を「35.6812, 139.7671」の形式で入力してください".to_string(),
            )),
        }
    }

    pub(super) async fn submit_location(&self, user: &User, latitude: f64, longitude: f64) -> DialogResult {
        let location = Coordinates::new(latitude, longitude).map_err(DialogError::validation)?;
        let within_radius = self.geofence.contains(location);

        if !within_radius && self.settings.strict_geofence {
            info!(user_id = user.id, latitude, longitude, "Check-in refused outside office radius");
            return Err(DialogError::Validation(
                "オフィスの範囲外からは出勤できません".to_string(),
            ));
        }

        let record = self
            .ledger
            .check_in(user.id, self.today(), location, within_radius)
            .await?;
        self.conversations.remove(user.id);

        Ok(Reply::text(format_check_in(&record, user, self.settings.tz)))
    }

    pub(super) async fn start_check_out(&self, user: &User) -> DialogResult {
        let record = self.ledger.record(user.id, self.today()).await?;
        let check_in = match &record {
            Some(r) if r.check_out_time.is_some() => return Err(LedgerError::AlreadyCheckedOut.into()),
            Some(r) => r.check_in_time.ok_or(LedgerError::NoCheckInRecord)?,
            None => return Err(LedgerError::NoCheckInRecord.into()),
        };

        self.conversations.set(user.id, Flow::CheckingOut);
        Ok(Reply::text(format!(
            "退勤しますか？（出勤: {}）",
            format_time(check_in, self.settings.tz)
        ))
        .with_buttons(vec![
            Button::new("退勤する", CONFIRM_CHECKOUT_TOKEN),
            Button::cancel(),
        ]))
    }

    pub(super) async fn confirm_check_out(&self, user: &User) -> DialogResult {
        let record = self.ledger.check_out(user.id, self.today()).await?;
        self.conversations.remove(user.id);
        Ok(Reply::text(format_check_out(&record, user, self.settings.tz)))
    }
}
