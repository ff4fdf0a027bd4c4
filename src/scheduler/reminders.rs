//! Reminder registration and the handlers that run when reminders fire.

use crate::attendance::ledger::AttendanceLedger;
use crate::database::models::{AttendanceStatus, Role, User};
use crate::database::store::UserStore;
use crate::notify::{Notifier, notify_quietly};
use crate::scheduler::engine::{SchedulerError, TaskHandler, TaskScheduler};
use crate::scheduler::schedule::Schedule;
use crate::scheduler::task::{ScheduledTask, TaskId, TaskPayload, TaskType};
use crate::utils::format::{format_daily_summary, format_event_reminder};
use crate::utils::time::{format_time, local_date};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

pub const ATTENDANCE_STATS_KEY: &str = "attendance-stats";
pub const ARRIVAL_FOLLOW_UP_DELAY_MINUTES: i64 = 1;

pub fn checkin_reminder_key(user_id: i64) -> String {
    format!("checkin-reminder-{}", user_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkHoursScope {
    User(i64),
    AllUsers,
}

#[derive(Debug, Clone)]
pub struct ReminderSettings {
    /// How long before work start the check-in reminder goes out.
    pub reminder_lead: Duration,
    pub stats_time: NaiveTime,
    pub event_reminder_lead: Duration,
}

/// Reminder time on the work day itself. Starts earlier than the lead clamp to
/// midnight so the weekday filter and the record date stay on that day.
fn checkin_reminder_time(work_start: NaiveTime, lead: Duration) -> NaiveTime {
    match work_start.overflowing_sub_signed(lead) {
        (at, 0) => at,
        _ => NaiveTime::MIN,
    }
}

/// Keeps recurring registrations in line with users' roles and work hours.
#[derive(Clone)]
pub struct ReminderPlanner {
    scheduler: TaskScheduler,
    users: Arc<dyn UserStore>,
    settings: ReminderSettings,
}

impl ReminderPlanner {
    pub fn new(scheduler: TaskScheduler, users: Arc<dyn UserStore>, settings: ReminderSettings) -> Self {
        Self {
            scheduler,
            users,
            settings,
        }
    }

    /// Registers (or replaces) the user's daily check-in reminder, or removes it
    /// when the user should not receive one.
    pub fn register_user(&self, user: &User) -> Result<Option<TaskId>, SchedulerError> {
        let key = checkin_reminder_key(user.id);

        if !user.receives_reminders() {
            if self.scheduler.cancel_key(&key) {
                info!(user_id = user.id, "Check-in reminder removed");
            }
            return Ok(None);
        }

        let at = checkin_reminder_time(user.work_start_time, self.settings.reminder_lead);
        let id = self.scheduler.schedule_recurring(
            &key,
            TaskType::CheckInReminder,
            Schedule::Daily {
                at,
                weekdays_only: true,
            },
            TaskPayload::User { user_id: user.id },
        )?;

        Ok(Some(id))
    }

    pub async fn on_work_hours_changed(&self, scope: WorkHoursScope) -> Result<usize> {
        let users: Vec<User> = match scope {
            WorkHoursScope::User(user_id) => self.users.get_user(user_id).await?.into_iter().collect(),
            WorkHoursScope::AllUsers => self.users.active_users().await?,
        };

        let mut registered = 0;
        for user in &users {
            if self.register_user(user)?.is_some() {
                registered += 1;
            }
        }

        info!(?scope, registered, "Check-in reminders re-registered");
        Ok(registered)
    }

    pub async fn set_role(&self, user_id: i64, role: Role) -> Result<User> {
        let user = self.users.set_role(user_id, role).await?;
        self.register_user(&user)?;
        Ok(user)
    }

    pub async fn set_active(&self, user_id: i64, active: bool) -> Result<User> {
        let user = self.users.set_active(user_id, active).await?;
        self.register_user(&user)?;
        Ok(user)
    }

    pub fn schedule_stats(&self) -> Result<TaskId, SchedulerError> {
        self.scheduler.schedule_recurring(
            ATTENDANCE_STATS_KEY,
            TaskType::AttendanceStats,
            Schedule::Daily {
                at: self.settings.stats_time,
                weekdays_only: true,
            },
            TaskPayload::None,
        )
    }

    /// Follow-up one minute after the user's declared arrival time.
    pub fn schedule_arrival_follow_up(
        &self,
        user_id: i64,
        date: NaiveDate,
        eta: DateTime<Utc>,
    ) -> Result<TaskId, SchedulerError> {
        let fire_at = eta + Duration::minutes(ARRIVAL_FOLLOW_UP_DELAY_MINUTES);
        self.scheduler.schedule_delayed(
            TaskType::ArrivalFollowUp,
            fire_at - self.scheduler.now(),
            TaskPayload::Arrival { user_id, date, eta },
        )
    }

    pub fn schedule_event_reminder(
        &self,
        title: &str,
        starts_at: DateTime<Utc>,
    ) -> Result<TaskId, SchedulerError> {
        self.scheduler.schedule_once(
            TaskType::EventReminder,
            starts_at - self.settings.event_reminder_lead,
            TaskPayload::Event {
                title: title.to_string(),
                starts_at,
            },
        )
    }

    /// Registers every active employee's reminder plus the stats broadcast.
    pub async fn bootstrap(&self) -> Result<()> {
        self.on_work_hours_changed(WorkHoursScope::AllUsers).await?;
        self.schedule_stats()?;
        Ok(())
    }
}

/// Shared dependencies of the reminder handlers.
#[derive(Clone)]
pub struct ReminderContext {
    pub ledger: Arc<AttendanceLedger>,
    pub users: Arc<dyn UserStore>,
    pub notifier: Arc<dyn Notifier>,
    pub tz: FixedOffset,
}

impl ReminderContext {
    async fn notify_managers(&self, message: &str) -> Result<()> {
        for manager in self.users.managers().await? {
            notify_quietly(self.notifier.as_ref(), &manager, message).await;
        }
        Ok(())
    }
}

pub struct CheckInReminderHandler(pub ReminderContext);

#[async_trait]
impl TaskHandler for CheckInReminderHandler {
    async fn handle(&self, task: &ScheduledTask) -> Result<()> {
        let TaskPayload::User { user_id } = task.payload else {
            anyhow::bail!("unexpected payload for check-in reminder: {:?}", task.payload);
        };
        let ctx = &self.0;

        let Some(user) = ctx.users.get_user(user_id).await? else {
            debug!(user_id, "Reminder for unknown user skipped");
            return Ok(());
        };
        if !user.receives_reminders() {
            return Ok(());
        }

        let today = local_date(task.next_fire(), ctx.tz);
        let record = ctx.ledger.record(user_id, today).await?;
        if record.is_some_and(|r| r.status != AttendanceStatus::Pending) {
            debug!(user_id, "Already recorded today, reminder skipped");
            return Ok(());
        }

        let message = format!(
            "⏰ 始業時刻（{}）が近づいています。`/checkin` で出勤を記録してください。",
            user.work_start_time.format("%H:%M")
        );
        notify_quietly(ctx.notifier.as_ref(), &user, &message).await;
        Ok(())
    }
}

pub struct ArrivalFollowUpHandler(pub ReminderContext);

#[async_trait]
impl TaskHandler for ArrivalFollowUpHandler {
    async fn handle(&self, task: &ScheduledTask) -> Result<()> {
        let TaskPayload::Arrival { user_id, date, eta } = task.payload else {
            anyhow::bail!("unexpected payload for arrival follow-up: {:?}", task.payload);
        };
        let ctx = &self.0;

        let record = ctx.ledger.record(user_id, date).await?;
        let still_on_the_way = record
            .as_ref()
            .is_some_and(|r| r.status == AttendanceStatus::OnTheWay && r.check_in_time.is_none());
        if !still_on_the_way {
            debug!(user_id, "User already arrived, follow-up skipped");
            return Ok(());
        }

        let Some(user) = ctx.users.get_user(user_id).await? else {
            return Ok(());
        };

        notify_quietly(
            ctx.notifier.as_ref(),
            &user,
            &format!(
                "🚃 到着予定時刻（{}）を過ぎました。到着したら `/checkin` で出勤を記録してください。",
                format_time(eta, ctx.tz)
            ),
        )
        .await;

        ctx.notify_managers(&format!(
            "ℹ️ {} さんは到着予定時刻（{}）を過ぎてもまだ出勤していません",
            user.display_name(),
            format_time(eta, ctx.tz)
        ))
        .await
    }
}

pub struct AttendanceStatsHandler(pub ReminderContext);

#[async_trait]
impl TaskHandler for AttendanceStatsHandler {
    async fn handle(&self, task: &ScheduledTask) -> Result<()> {
        let ctx = &self.0;
        let today = local_date(task.next_fire(), ctx.tz);

        let employees: Vec<User> = ctx
            .users
            .active_users()
            .await?
            .into_iter()
            .filter(|u| u.role == Role::Employee)
            .collect();

        let summary = ctx.ledger.daily_summary(today, &employees, ctx.tz).await?;
        ctx.notify_managers(&format_daily_summary(&summary)).await
    }
}

pub struct EventReminderHandler(pub ReminderContext);

#[async_trait]
impl TaskHandler for EventReminderHandler {
    async fn handle(&self, task: &ScheduledTask) -> Result<()> {
        let TaskPayload::Event { title, starts_at } = &task.payload else {
            anyhow::bail!("unexpected payload for event reminder: {:?}", task.payload);
        };
        let ctx = &self.0;

        let message = format_event_reminder(title, *starts_at, ctx.tz);
        for user in ctx.users.active_users().await? {
            notify_quietly(ctx.notifier.as_ref(), &user, &message).await;
        }
        Ok(())
    }
}

#[cfg(test)]
impl ReminderPlanner {
    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }
}
