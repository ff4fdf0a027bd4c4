//! Scheduled task definitions.

use crate::scheduler::schedule::Schedule;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        Self(format!("task-{}", uuid::Uuid::new_v4()))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Selects the handler a task is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    CheckInReminder,
    ArrivalFollowUp,
    AttendanceStats,
    EventReminder,
}

/// Small structured data handed to the handler when the task fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskPayload {
    None,
    User {
        user_id: i64,
    },
    Arrival {
        user_id: i64,
        date: NaiveDate,
        eta: DateTime<Utc>,
    },
    Event {
        title: String,
        starts_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    Once { fire_at: DateTime<Utc> },
    Recurring { schedule: Schedule, next_fire: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub task_type: TaskType,
    /// Set for recurring registrations; a second registration under the same key replaces this one.
    pub logical_key: Option<String>,
    pub trigger: Trigger,
    pub payload: TaskPayload,
    pub created_at: DateTime<Utc>,
}

impl ScheduledTask {
    pub fn next_fire(&self) -> DateTime<Utc> {
        match &self.trigger {
            Trigger::Once { fire_at } => *fire_at,
            Trigger::Recurring { next_fire, .. } => *next_fire,
        }
    }
}
