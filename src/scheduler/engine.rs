//! In-process timer scheduler for reminders and follow-ups.
//!
//! Every registration owns a child of the scheduler's shutdown token and a
//! tokio task sleeping until its next firing. The registry is the source of
//! truth: a timer only fires if it can still remove (one-shot) or find
//! (recurring) its own entry, so cancel and fire never both win.

use crate::scheduler::schedule::Schedule;
use crate::scheduler::task::{ScheduledTask, TaskId, TaskPayload, TaskType, Trigger};
use crate::utils::clock::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60 * 60;
pub const DEFAULT_LEAK_THRESHOLD_MINUTES: i64 = 60;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SchedulerError {
    #[error("no handler registered for {0:?}")]
    UnknownHandler(TaskType),
    #[error("schedule never fires: {0:?}")]
    InvalidSchedule(Schedule),
    #[error("scheduler is shutting down")]
    ShuttingDown,
}

/// Work executed when a task fires. Each firing runs in its own tokio task.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &ScheduledTask) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tz: FixedOffset,
    pub cleanup_interval_secs: u64,
    /// One-shot entries this far past their fire time are dropped by `sweep`.
    pub leak_threshold: Duration,
}

impl SchedulerConfig {
    pub fn new(tz: FixedOffset) -> Self {
        Self {
            tz,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            leak_threshold: Duration::minutes(DEFAULT_LEAK_THRESHOLD_MINUTES),
        }
    }
}

struct Registration {
    task: ScheduledTask,
    cancel: CancellationToken,
}

struct Inner {
    tasks: DashMap<TaskId, Registration>,
    keys: DashMap<String, TaskId>,
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    shutdown: CancellationToken,
}

pub struct TaskSchedulerBuilder {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl TaskSchedulerBuilder {
    pub fn handler(mut self, task_type: TaskType, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(task_type, handler);
        self
    }

    pub fn build(self) -> TaskScheduler {
        TaskScheduler {
            inner: Arc::new(Inner {
                tasks: DashMap::new(),
                keys: DashMap::new(),
                handlers: self.handlers,
                clock: self.clock,
                config: self.config,
                shutdown: CancellationToken::new(),
            }),
        }
    }
}

#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<Inner>,
}

impl TaskScheduler {
    pub fn builder(clock: Arc<dyn Clock>, config: SchedulerConfig) -> TaskSchedulerBuilder {
        TaskSchedulerBuilder {
            handlers: HashMap::new(),
            clock,
            config,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Fires once at `fire_at`. A time in the past fires immediately.
    pub fn schedule_once(
        &self,
        task_type: TaskType,
        fire_at: DateTime<Utc>,
        payload: TaskPayload,
    ) -> Result<TaskId, SchedulerError> {
        self.ensure_accepting(task_type)?;

        let now = self.now();
        if fire_at < now {
            warn!(
                ?task_type,
                %fire_at,
                "Fire time already passed, firing immediately"
            );
        }

        let task = ScheduledTask {
            id: TaskId::generate(),
            task_type,
            logical_key: None,
            trigger: Trigger::Once { fire_at },
            payload,
            created_at: now,
        };
        let id = task.id.clone();
        let cancel = self.inner.shutdown.child_token();
        let delay = to_std(fire_at - now);

        self.inner.tasks.insert(
            id.clone(),
            Registration {
                task,
                cancel: cancel.clone(),
            },
        );

        let inner = self.inner.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            // gone means cancelled or swept
            let Some((_, registration)) = inner.tasks.remove(&task_id) else {
                return;
            };
            inner.dispatch(registration.task).await;
        });

        info!(task_id = %id, ?task_type, %fire_at, "One-shot task scheduled");
        Ok(id)
    }

    pub fn schedule_delayed(
        &self,
        task_type: TaskType,
        delay: Duration,
        payload: TaskPayload,
    ) -> Result<TaskId, SchedulerError> {
        self.schedule_once(task_type, self.now() + delay, payload)
    }

    /// Registers a recurring task under `logical_key`, replacing any earlier
    /// registration with the same key.
    pub fn schedule_recurring(
        &self,
        logical_key: &str,
        task_type: TaskType,
        schedule: Schedule,
        payload: TaskPayload,
    ) -> Result<TaskId, SchedulerError> {
        self.ensure_accepting(task_type)?;

        let now = self.now();
        let tz = self.inner.config.tz;
        let next_fire = schedule
            .next_after(now, tz)
            .ok_or_else(|| SchedulerError::InvalidSchedule(schedule.clone()))?;

        let task = ScheduledTask {
            id: TaskId::generate(),
            task_type,
            logical_key: Some(logical_key.to_string()),
            trigger: Trigger::Recurring {
                schedule: schedule.clone(),
                next_fire,
            },
            payload,
            created_at: now,
        };
        let id = task.id.clone();
        let cancel = self.inner.shutdown.child_token();

        // the entry must exist before the key points at it, otherwise a racing
        // replacement could miss it and leave two live registrations
        self.inner.tasks.insert(
            id.clone(),
            Registration {
                task,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = self.inner.keys.insert(logical_key.to_string(), id.clone()) {
            self.remove_registration(&previous);
            debug!(logical_key, replaced = %previous, "Recurring task replaced");
        }

        let inner = self.inner.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            let mut cursor = now;

            loop {
                let now = inner.clock.now().max(cursor);
                let Some(next) = schedule.next_after(now, tz) else {
                    warn!(task_id = %task_id, "Recurring schedule exhausted");
                    inner.tasks.remove(&task_id);
                    break;
                };

                let snapshot = match inner.tasks.get_mut(&task_id) {
                    Some(mut registration) => {
                        if let Trigger::Recurring { next_fire, .. } = &mut registration.task.trigger {
                            *next_fire = next;
                        }
                        registration.task.clone()
                    }
                    None => break,
                };

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(to_std(next - now)) => {}
                }

                if !inner.tasks.contains_key(&task_id) {
                    break;
                }
                cursor = next;
                inner.dispatch(snapshot).await;
            }
        });

        info!(task_id = %id, logical_key, ?task_type, %next_fire, "Recurring task scheduled");
        Ok(id)
    }

    /// Cancels a task. Unknown or already finished ids are ignored.
    pub fn cancel(&self, id: &TaskId) -> bool {
        let removed = self.remove_registration(id);
        if removed {
            info!(task_id = %id, "Task cancelled");
        }
        removed
    }

    pub fn cancel_key(&self, logical_key: &str) -> bool {
        match self.inner.keys.remove(logical_key) {
            Some((_, id)) => self.cancel(&id),
            None => false,
        }
    }

    /// Drops one-shot entries whose fire time is older than the leak threshold.
    /// Tasks that fired normally have already removed themselves.
    pub fn sweep(&self) -> usize {
        let cutoff = self.now() - self.inner.config.leak_threshold;
        let is_leaked = |r: &Registration| {
            matches!(r.task.trigger, Trigger::Once { fire_at } if fire_at < cutoff)
        };

        let candidates: Vec<TaskId> = self
            .inner
            .tasks
            .iter()
            .filter(|r| is_leaked(r.value()))
            .map(|r| r.key().clone())
            .collect();

        let mut removed = 0;
        for id in candidates {
            if let Some((_, registration)) = self.inner.tasks.remove_if(&id, |_, r| is_leaked(r)) {
                registration.cancel.cancel();
                removed += 1;
            }
        }

        if removed > 0 {
            warn!(removed, "Swept stale one-shot tasks");
        }
        removed
    }

    pub fn spawn_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        let shutdown = self.inner.shutdown.clone();
        let interval_secs = self.inner.config.cleanup_interval_secs;

        tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            // the first tick completes immediately
            tick.tick().await;

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        scheduler.sweep();
                    }
                    _ = shutdown.cancelled() => {
                        debug!("Scheduler cleanup stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Cancels every pending timer. Later registrations are refused.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let pending = self.inner.tasks.len();
        self.inner.tasks.clear();
        self.inner.keys.clear();
        info!(pending, "Scheduler shut down");
    }

    fn ensure_accepting(&self, task_type: TaskType) -> Result<(), SchedulerError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SchedulerError::ShuttingDown);
        }
        if !self.inner.handlers.contains_key(&task_type) {
            return Err(SchedulerError::UnknownHandler(task_type));
        }
        Ok(())
    }

    fn remove_registration(&self, id: &TaskId) -> bool {
        let Some((_, registration)) = self.inner.tasks.remove(id) else {
            return false;
        };
        registration.cancel.cancel();
        if let Some(key) = &registration.task.logical_key {
            self.inner.keys.remove_if(key, |_, current| current == id);
        }
        true
    }
}

impl Inner {
    async fn dispatch(&self, task: ScheduledTask) {
        let Some(handler) = self.handlers.get(&task.task_type).cloned() else {
            warn!(task_id = %task.id, task_type = ?task.task_type, "No handler for task");
            return;
        };

        let task_id = task.id.clone();
        let task_type = task.task_type;
        debug!(task_id = %task_id, ?task_type, "Task firing");

        let outcome = tokio::spawn(async move { handler.handle(&task).await }).await;
        match outcome {
            Ok(Ok(())) => debug!(task_id = %task_id, "Task completed"),
            Ok(Err(e)) => error!(task_id = %task_id, ?task_type, "Task handler failed: {:#}", e),
            Err(e) => error!(task_id = %task_id, ?task_type, "Task handler panicked: {}", e),
        }
    }
}

fn to_std(delta: Duration) -> std::time::Duration {
    delta.to_std().unwrap_or_default()
}

#[cfg(test)]
impl TaskScheduler {
    pub fn get(&self, id: &TaskId) -> Option<ScheduledTask> {
        self.inner.tasks.get(id).map(|r| r.task.clone())
    }

    pub fn find_by_key(&self, logical_key: &str) -> Option<ScheduledTask> {
        let id = self.inner.keys.get(logical_key)?.clone();
        self.get(&id)
    }

    pub fn pending(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<_> = self.inner.tasks.iter().map(|r| r.task.clone()).collect();
        tasks.sort_by_key(|t| t.next_fire());
        tasks
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::ManualClock;
    use chrono::{NaiveTime, TimeZone};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recording {
        fired: Mutex<Vec<ScheduledTask>>,
        calls: AtomicUsize,
        fail: bool,
        panic: bool,
    }

    impl Recording {
        fn count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TaskHandler for Recording {
        async fn handle(&self, task: &ScheduledTask) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.fired.lock().unwrap().push(task.clone());
            if self.panic {
                panic!("handler blew up");
            }
            if self.fail {
                anyhow::bail!("handler failed");
            }
            Ok(())
        }
    }

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn start() -> DateTime<Utc> {
        jst().with_ymd_and_hms(2025, 3, 4, 8, 0, 0).unwrap().to_utc()
    }

    fn setup() -> (TaskScheduler, Arc<Recording>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let recording = Arc::new(Recording::default());
        let scheduler = TaskScheduler::builder(clock.clone(), SchedulerConfig::new(jst()))
            .handler(TaskType::ArrivalFollowUp, recording.clone())
            .handler(TaskType::CheckInReminder, recording.clone())
            .build();
        (scheduler, recording, clock)
    }

    async fn advance(mins: u64) {
        tokio::time::sleep(std::time::Duration::from_secs(mins * 60)).await;
    }

    fn user(user_id: i64) -> TaskPayload {
        TaskPayload::User { user_id }
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_fires_once_and_removes_itself() {
        let (scheduler, recording, _) = setup();
        let id = scheduler
            .schedule_delayed(TaskType::ArrivalFollowUp, Duration::minutes(46), user(1))
            .unwrap();
        assert_eq!(scheduler.get(&id).unwrap().next_fire(), start() + Duration::minutes(46));

        advance(45).await;
        assert_eq!(recording.count(), 0);

        advance(2).await;
        assert_eq!(recording.count(), 1);
        assert!(scheduler.get(&id).is_none());
        assert_eq!(recording.fired.lock().unwrap()[0].payload, user(1));

        advance(120).await;
        assert_eq!(recording.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn past_fire_time_fires_immediately() {
        let (scheduler, recording, _) = setup();
        scheduler
            .schedule_once(TaskType::ArrivalFollowUp, start() - Duration::hours(2), user(1))
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(recording.count(), 1);
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent_and_prevents_firing() {
        let (scheduler, recording, _) = setup();
        let id = scheduler
            .schedule_delayed(TaskType::ArrivalFollowUp, Duration::minutes(5), user(1))
            .unwrap();

        assert!(scheduler.cancel(&id));
        assert!(!scheduler.cancel(&id));
        assert!(!scheduler.cancel(&TaskId::generate()));
        assert!(!scheduler.cancel_key("checkin-reminder-404"));

        advance(10).await;
        assert_eq!(recording.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recurring_same_key_keeps_one_registration() {
        let (scheduler, recording, _) = setup();
        let at = |h, m| Schedule::Daily {
            at: NaiveTime::from_hms_opt(h, m, 0).unwrap(),
            weekdays_only: false,
        };

        let first = scheduler
            .schedule_recurring("checkin-reminder-1", TaskType::CheckInReminder, at(8, 50), user(1))
            .unwrap();
        let second = scheduler
            .schedule_recurring("checkin-reminder-1", TaskType::CheckInReminder, at(8, 20), user(1))
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.get(&first).is_none());
        assert_eq!(scheduler.find_by_key("checkin-reminder-1").unwrap().id, second);

        // only the replacement fires
        advance(60).await;
        assert_eq!(recording.count(), 1);
        assert_eq!(recording.fired.lock().unwrap()[0].id, second);
        assert_eq!(scheduler.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recurring_keeps_firing_until_cancelled() {
        let (scheduler, recording, _) = setup();
        let daily = Schedule::Daily {
            at: NaiveTime::from_hms_opt(8, 10, 0).unwrap(),
            weekdays_only: false,
        };
        scheduler
            .schedule_recurring("poll", TaskType::CheckInReminder, daily, TaskPayload::None)
            .unwrap();

        // Tuesday, Wednesday and Thursday at 08:10
        advance(2 * 24 * 60 + 15).await;
        assert_eq!(recording.count(), 3);

        assert!(scheduler.cancel_key("poll"));
        advance(60).await;
        assert_eq!(recording.count(), 3);
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failing_handlers_do_not_stop_other_tasks() {
        let clock = Arc::new(ManualClock::new(start()));
        let failing = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let panicking = Arc::new(Recording {
            panic: true,
            ..Default::default()
        });
        let healthy = Arc::new(Recording::default());
        let scheduler = TaskScheduler::builder(clock, SchedulerConfig::new(jst()))
            .handler(TaskType::AttendanceStats, failing.clone())
            .handler(TaskType::EventReminder, panicking.clone())
            .handler(TaskType::ArrivalFollowUp, healthy.clone())
            .build();

        scheduler
            .schedule_delayed(TaskType::AttendanceStats, Duration::minutes(1), TaskPayload::None)
            .unwrap();
        scheduler
            .schedule_delayed(TaskType::EventReminder, Duration::minutes(1), TaskPayload::None)
            .unwrap();
        scheduler
            .schedule_delayed(TaskType::ArrivalFollowUp, Duration::minutes(2), user(1))
            .unwrap();

        advance(3).await;
        assert_eq!(failing.count(), 1);
        assert_eq!(panicking.count(), 1);
        assert_eq!(healthy.count(), 1);

        scheduler
            .schedule_delayed(TaskType::EventReminder, Duration::minutes(1), TaskPayload::None)
            .unwrap();
        advance(2).await;
        assert_eq!(panicking.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_handler_is_rejected() {
        let (scheduler, _, _) = setup();
        let err = scheduler
            .schedule_delayed(TaskType::EventReminder, Duration::minutes(1), TaskPayload::None)
            .unwrap_err();
        assert_eq!(err, SchedulerError::UnknownHandler(TaskType::EventReminder));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_only_leaked_one_shots() {
        let (scheduler, recording, clock) = setup();
        let leaked = scheduler
            .schedule_delayed(TaskType::ArrivalFollowUp, Duration::minutes(1), user(1))
            .unwrap();

        // wall clock jumps ahead while the timer has not run yet
        clock.advance(Duration::hours(2));
        let live = scheduler
            .schedule_delayed(TaskType::ArrivalFollowUp, Duration::minutes(30), user(2))
            .unwrap();
        scheduler
            .schedule_recurring(
                "checkin-reminder-3",
                TaskType::CheckInReminder,
                Schedule::Daily {
                    at: NaiveTime::from_hms_opt(8, 50, 0).unwrap(),
                    weekdays_only: true,
                },
                user(3),
            )
            .unwrap();

        assert_eq!(scheduler.sweep(), 1);
        assert!(scheduler.get(&leaked).is_none());
        assert!(scheduler.get(&live).is_some());
        assert_eq!(scheduler.sweep(), 0);

        advance(5).await;
        assert_eq!(recording.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fired_tasks_are_not_counted_by_sweep() {
        let (scheduler, recording, clock) = setup();
        scheduler
            .schedule_delayed(TaskType::ArrivalFollowUp, Duration::minutes(1), user(1))
            .unwrap();

        advance(2).await;
        assert_eq!(recording.count(), 1);

        clock.advance(Duration::hours(3));
        assert_eq!(scheduler.sweep(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_everything() {
        let (scheduler, recording, _) = setup();
        scheduler
            .schedule_delayed(TaskType::ArrivalFollowUp, Duration::minutes(1), user(1))
            .unwrap();
        scheduler
            .schedule_recurring(
                "checkin-reminder-1",
                TaskType::CheckInReminder,
                Schedule::Daily {
                    at: NaiveTime::from_hms_opt(8, 1, 0).unwrap(),
                    weekdays_only: false,
                },
                user(1),
            )
            .unwrap();

        scheduler.shutdown();
        assert!(scheduler.is_empty());
        assert_eq!(
            scheduler
                .schedule_delayed(TaskType::ArrivalFollowUp, Duration::minutes(1), user(1))
                .unwrap_err(),
            SchedulerError::ShuttingDown
        );

        advance(10).await;
        assert_eq!(recording.count(), 0);
    }
}
