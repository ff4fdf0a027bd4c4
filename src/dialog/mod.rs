//! Multi-step chat dialogs on top of the ledger, the conversation store and
//! the scheduler.
//!
//! Commands open a flow, every later message or button press arrives through
//! [`DialogOrchestrator::on_conversation_event`]. Each step replaces the
//! stored state as a whole, terminal steps clear it before scheduling any
//! follow-up.

mod absence;
mod checkin;
mod manager;
mod registration;
mod work_hours;

use crate::attendance::geo::GeoFence;
use crate::attendance::ledger::{AttendanceLedger, LedgerError};
use crate::conversation::{AbsenceKind, ConversationStore, Flow};
use crate::database::models::{Role, User};
use crate::database::store::UserStore;
use crate::scheduler::engine::SchedulerError;
use crate::scheduler::reminders::ReminderPlanner;
use crate::utils::clock::Clock;
use crate::utils::format::{format_error_message, format_info_message, format_record_status};
use crate::utils::time::local_date;
use chrono::{FixedOffset, NaiveDate};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const CANCEL_TOKEN: &str = "cancel";
pub const CONFIRM_CHECKOUT_TOKEN: &str = "checkout:confirm";
pub const ETA_PRESET_MINUTES: [i64; 3] = [30, 60, 120];
pub const EXPORT_MAX_DAYS: i64 = 31;

/// Something the user sent while a dialog may be in progress.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Text(String),
    Location { latitude: f64, longitude: f64 },
    Callback(String),
}

/// Commands that open a flow or answer directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Register,
    CheckIn,
    CheckOut,
    Absent,
    WorkHours,
    Status,
    Event,
    Export,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub token: String,
}

impl Button {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }

    pub fn cancel() -> Self {
        Self::new("キャンセル", CANCEL_TOKEN)
    }
}

/// Outbound answer, rendered by the chat adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub buttons: Vec<Button>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_buttons(mut self, buttons: Vec<Button>) -> Self {
        self.buttons = buttons;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EtaChoice {
    Minutes(i64),
    Custom,
}

/// Parsed button token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Callback {
    Cancel,
    Absence(AbsenceKind),
    Eta(EtaChoice),
    ConfirmCheckOut,
}

impl Callback {
    pub(crate) fn parse(token: &str) -> Option<Self> {
        if token == CANCEL_TOKEN {
            return Some(Callback::Cancel);
        }
        if token == CONFIRM_CHECKOUT_TOKEN {
            return Some(Callback::ConfirmCheckOut);
        }
        if let Some(kind) = token.strip_prefix("absence:") {
            return AbsenceKind::parse(kind).map(Callback::Absence);
        }
        if let Some(eta) = token.strip_prefix("eta:") {
            if eta == "custom" {
                return Some(Callback::Eta(EtaChoice::Custom));
            }
            return eta
                .parse::<i64>()
                .ok()
                .filter(|m| ETA_PRESET_MINUTES.contains(m))
                .map(|m| Callback::Eta(EtaChoice::Minutes(m)));
        }
        None
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DialogError {
    #[error("user {0} not found")]
    UnknownUser(i64),
    #[error("user is not registered")]
    NotRegistered,
    #[error("manager role required")]
    ManagerOnly,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl DialogError {
    fn validation(err: impl std::fmt::Display) -> Self {
        DialogError::Validation(err.to_string())
    }

    /// Bad input on a step that can simply be answered again.
    fn keeps_state(&self) -> bool {
        matches!(
            self,
            DialogError::Validation(_) | DialogError::Ledger(LedgerError::Validation(_))
        )
    }

    pub fn user_message(&self) -> String {
        match self {
            DialogError::UnknownUser(_) => "ユーザー情報が見つかりません".to_string(),
            DialogError::NotRegistered => {
                "まだ登録されていません。`/start_register` で登録してください".to_string()
            }
            DialogError::ManagerOnly => "この操作はマネージャーのみ実行できます".to_string(),
            DialogError::Validation(message) => message.clone(),
            DialogError::Ledger(e) => match e {
                LedgerError::AlreadyCheckedIn => "今日は既に出勤済みです".to_string(),
                LedgerError::AlreadyCheckedOut => "今日は既に退勤済みです".to_string(),
                LedgerError::AlreadyMarkedAbsent => "今日は既に欠勤・遅刻の連絡済みです".to_string(),
                LedgerError::NoCheckInRecord => {
                    "今日の出勤記録がありません。先に `/checkin` で出勤してください".to_string()
                }
                LedgerError::Validation(message) => message.clone(),
                LedgerError::Storage(_) | LedgerError::Invariant(_) => {
                    "勤怠の記録に失敗しました。しばらくしてから再度お試しください".to_string()
                }
            },
            DialogError::Scheduler(_) | DialogError::Storage(_) => {
                "処理に失敗しました。しばらくしてから再度お試しください".to_string()
            }
        }
    }
}

pub type DialogResult = Result<Reply, DialogError>;

#[derive(Debug, Clone)]
pub struct DialogSettings {
    pub tz: FixedOffset,
    /// Refuse check-ins from outside the office radius instead of flagging them.
    pub strict_geofence: bool,
}

pub struct DialogOrchestrator {
    conversations: Arc<ConversationStore>,
    ledger: Arc<AttendanceLedger>,
    users: Arc<dyn UserStore>,
    planner: ReminderPlanner,
    geofence: GeoFence,
    clock: Arc<dyn Clock>,
    settings: DialogSettings,
}

impl DialogOrchestrator {
    pub fn new(
        conversations: Arc<ConversationStore>,
        ledger: Arc<AttendanceLedger>,
        users: Arc<dyn UserStore>,
        planner: ReminderPlanner,
        geofence: GeoFence,
        clock: Arc<dyn Clock>,
        settings: DialogSettings,
    ) -> Self {
        Self {
            conversations,
            ledger,
            users,
            planner,
            geofence,
            clock,
            settings,
        }
    }

    /// Handles a slash command. Starting a flow replaces whatever flow was open.
    pub async fn on_command(&self, user_id: i64, command: Command) -> Reply {
        let result = self.dispatch_command(user_id, command).await;
        self.finish(user_id, result)
    }

    /// The only entry point that advances an open dialog.
    pub async fn on_conversation_event(&self, user_id: i64, inbound: Inbound) -> Reply {
        let result = self.dispatch_event(user_id, inbound).await;
        self.finish(user_id, result)
    }

    /// Opens the check-in flow and submits the location in one step. The first
    /// failure is the one reported.
    pub async fn check_in_at(&self, user_id: i64, latitude: f64, longitude: f64) -> Reply {
        let result = async {
            self.dispatch_command(user_id, Command::CheckIn).await?;
            self.dispatch_event(user_id, Inbound::Location { latitude, longitude })
                .await
        }
        .await;
        self.finish(user_id, result)
    }

    async fn dispatch_command(&self, user_id: i64, command: Command) -> DialogResult {
        let user = self.load_user(user_id).await?;

        match command {
            Command::Register => self.start_registration(&user),
            Command::Cancel => Ok(self.cancel(user_id)),
            _ if !user.is_registered => Err(DialogError::NotRegistered),
            Command::CheckIn => Ok(self.start_check_in(&user)),
            Command::CheckOut => self.start_check_out(&user).await,
            Command::Absent => Ok(self.start_absence(&user)),
            Command::WorkHours => Ok(self.start_work_hours(&user)),
            Command::Status => self.status(&user).await,
            Command::Event => self.start_event(&user),
            Command::Export => self.start_export(&user),
        }
    }

    async fn dispatch_event(&self, user_id: i64, inbound: Inbound) -> DialogResult {
        let user = self.load_user(user_id).await?;
        let state = self.conversations.get(user_id);

        let callback = match &inbound {
            Inbound::Callback(token) => match Callback::parse(token) {
                Some(callback) => Some(callback),
                None => {
                    warn!(user_id, %token, "Unknown callback token");
                    return Ok(Reply::text(format_error_message("不明な操作です")));
                }
            },
            _ => None,
        };

        if callback == Some(Callback::Cancel) {
            return Ok(self.cancel(user_id));
        }

        let Some(state) = state else {
            // absence type buttons open the flow from an idle conversation
            if let Some(Callback::Absence(kind)) = callback {
                if !user.is_registered {
                    return Err(DialogError::NotRegistered);
                }
                return Ok(self.choose_absence_kind(&user, kind));
            }
            return Ok(Reply::text(format_info_message(
                "進行中の操作はありません。コマンドから操作を開始してください",
            )));
        };

        debug!(user_id, action = ?state.action(), "Dialog step");

        match (state.flow, inbound, callback) {
            (Flow::Registering, Inbound::Text(text), _) => self.submit_full_name(&user, &text).await,
            (Flow::CheckingIn, Inbound::Location { latitude, longitude }, _) => {
                self.submit_location(&user, latitude, longitude).await
            }
            (Flow::CheckingIn, Inbound::Text(text), _) => self.submit_location_text(&user, &text).await,
            (Flow::CheckingOut, _, Some(Callback::ConfirmCheckOut)) => self.confirm_check_out(&user).await,
            (Flow::ReportingAbsence(_), _, Some(Callback::Absence(kind))) => {
                Ok(self.choose_absence_kind(&user, kind))
            }
            (Flow::ReportingAbsence(draft), inbound, callback) => {
                self.absence_step(&user, draft, inbound, callback).await
            }
            (Flow::SettingWorkHours(step), Inbound::Text(text), _) => {
                self.work_hours_step(&user, step, &text).await
            }
            (Flow::CreatingEvent(step), Inbound::Text(text), _) => self.event_step(&user, step, &text),
            (Flow::ExportDateSelection(step), Inbound::Text(text), _) => {
                self.export_step(&user, step, &text).await
            }
            (flow, _, _) => {
                debug!(user_id, action = ?flow.action(), "Input does not fit the current step");
                Ok(Reply::text(format_error_message(
                    "この入力は現在の操作では使えません。`/cancel` で中止できます",
                )))
            }
        }
    }

    /// Converts a step result into a reply. Failures clear the dialog unless
    /// the user can simply answer the same step again.
    fn finish(&self, user_id: i64, result: DialogResult) -> Reply {
        match result {
            Ok(reply) => reply,
            Err(e) => {
                match &e {
                    DialogError::Ledger(LedgerError::Invariant(detail)) => {
                        error!(user_id, %detail, "Attendance invariant violated")
                    }
                    DialogError::Ledger(LedgerError::Storage(cause)) => {
                        error!(user_id, "Attendance storage failed: {:#}", cause)
                    }
                    DialogError::Storage(cause) => error!(user_id, "Dialog storage failed: {:#}", cause),
                    DialogError::Scheduler(cause) => error!(user_id, "Scheduling failed: {}", cause),
                    DialogError::Ledger(conflict) if conflict.is_conflict() => {
                        info!(user_id, "Attendance conflict: {}", conflict)
                    }
                    _ => debug!(user_id, "Dialog step rejected: {}", e),
                }

                if !e.keeps_state() && self.conversations.remove(user_id).is_some() {
                    debug!(user_id, "Conversation cleared after failure");
                }
                Reply::text(format_error_message(&e.user_message()))
            }
        }
    }

    fn cancel(&self, user_id: i64) -> Reply {
        // no draft owns a scheduled task before its terminal step
        match self.conversations.remove(user_id) {
            Some(state) => {
                debug!(user_id, action = ?state.action(), "Conversation cancelled");
                Reply::text(format_info_message("操作をキャンセルしました"))
            }
            None => Reply::text(format_info_message("キャンセルする操作はありません")),
        }
    }

    async fn status(&self, user: &User) -> DialogResult {
        let record = self.ledger.record(user.id, self.today()).await?;
        Ok(Reply::text(format_record_status(record.as_ref(), user, self.settings.tz)))
    }

    async fn load_user(&self, user_id: i64) -> Result<User, DialogError> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or(DialogError::UnknownUser(user_id))
    }

    fn require_manager(&self, user: &User) -> Result<(), DialogError> {
        if user.role != Role::Manager {
            return Err(DialogError::ManagerOnly);
        }
        Ok(())
    }

    fn today(&self) -> NaiveDate {
        local_date(self.clock.now(), self.settings.tz)
    }
}
