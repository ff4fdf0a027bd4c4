//! Typed dialog state. Each flow carries exactly the fields its current step needs.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbsenceKind {
    Sick,
    OnTheWay,
    Overslept,
    Other,
}

impl AbsenceKind {
    pub const ALL: [AbsenceKind; 4] = [
        AbsenceKind::Sick,
        AbsenceKind::OnTheWay,
        AbsenceKind::Overslept,
        AbsenceKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AbsenceKind::Sick => "sick",
            AbsenceKind::OnTheWay => "on_the_way",
            AbsenceKind::Overslept => "overslept",
            AbsenceKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AbsenceKind::Sick => "体調不良",
            AbsenceKind::OnTheWay => "移動中",
            AbsenceKind::Overslept => "寝坊",
            AbsenceKind::Other => "その他",
        }
    }

    /// Sick and other absences ask for a free-text reason; the rest ask for an ETA.
    pub fn needs_reason(&self) -> bool {
        matches!(self, AbsenceKind::Sick | AbsenceKind::Other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbsenceStep {
    AwaitingEta,
    AwaitingReason,
    AwaitingCustomEta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsenceDraft {
    pub kind: AbsenceKind,
    pub step: AbsenceStep,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStep {
    AwaitingTitle,
    AwaitingTime { title: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportStep {
    AwaitingFrom,
    AwaitingTo { from: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkHoursStep {
    AwaitingStart,
    AwaitingEnd { start: NaiveTime },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flow {
    /// Waiting for the user's full name.
    Registering,
    /// Waiting for a location.
    CheckingIn,
    /// Waiting for the check-out confirmation.
    CheckingOut,
    ReportingAbsence(AbsenceDraft),
    CreatingEvent(EventStep),
    ExportDateSelection(ExportStep),
    SettingWorkHours(WorkHoursStep),
}

/// Flat view of where a user is, for logging and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationAction {
    None,
    Registering,
    CheckingIn,
    CheckingOut,
    ReportingAbsence,
    ReportingAbsenceReason,
    ReportingAbsenceCustomEta,
    CreatingEvent,
    ExportDateSelection,
    SettingWorkHours,
}

impl Flow {
    pub fn action(&self) -> ConversationAction {
        match self {
            Flow::Registering => ConversationAction::Registering,
            Flow::CheckingIn => ConversationAction::CheckingIn,
            Flow::CheckingOut => ConversationAction::CheckingOut,
            Flow::ReportingAbsence(draft) => match draft.step {
                AbsenceStep::AwaitingEta => ConversationAction::ReportingAbsence,
                AbsenceStep::AwaitingReason => ConversationAction::ReportingAbsenceReason,
                AbsenceStep::AwaitingCustomEta => ConversationAction::ReportingAbsenceCustomEta,
            },
            Flow::CreatingEvent(_) => ConversationAction::CreatingEvent,
            Flow::ExportDateSelection(_) => ConversationAction::ExportDateSelection,
            Flow::SettingWorkHours(_) => ConversationAction::SettingWorkHours,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub flow: Flow,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn action(&self) -> ConversationAction {
        self.flow.action()
    }

    #[cfg(test)]
    pub fn absence_kind(&self) -> Option<AbsenceKind> {
        match &self.flow {
            Flow::ReportingAbsence(draft) => Some(draft.kind),
            _ => None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
