pub mod engine;
pub mod reminders;
pub mod schedule;
pub mod task;

pub use engine::{SchedulerConfig, SchedulerError, TaskHandler, TaskScheduler};
pub use reminders::{ReminderContext, ReminderPlanner, ReminderSettings, WorkHoursScope};
pub use schedule::Schedule;
pub use task::{ScheduledTask, TaskId, TaskPayload, TaskType};
