pub mod state;
pub mod store;

pub use state::{
    AbsenceDraft, AbsenceKind, AbsenceStep, ConversationAction, ConversationState, EventStep,
    ExportStep, Flow, WorkHoursStep,
};
pub use store::ConversationStore;
