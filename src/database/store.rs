use crate::database::models::{AttendanceRecord, Role, User};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A second row for the same (user, date) was about to be written.
    #[error("attendance record for user {user_id} on {date} already exists")]
    Duplicate { user_id: i64, date: NaiveDate },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistence boundary for attendance records.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn load_record(&self, user_id: i64, date: NaiveDate) -> Result<Option<AttendanceRecord>>;

    /// Inserts when `record.id` is `None`, updates otherwise. Returns the stored row.
    async fn save_record(&self, record: &AttendanceRecord) -> Result<AttendanceRecord, StoreError>;

    async fn records_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>>;

    async fn records_on(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        self.records_between(date, date).await
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_or_get_user(
        &self,
        discord_id: &str,
        username: &str,
        default_hours: WorkHours,
    ) -> Result<User>;

    async fn get_user(&self, user_id: i64) -> Result<Option<User>>;

    /// Active and registered users of any role.
    async fn active_users(&self) -> Result<Vec<User>>;

    async fn managers(&self) -> Result<Vec<User>> {
        Ok(self
            .active_users()
            .await?
            .into_iter()
            .filter(|u| u.role == Role::Manager)
            .collect())
    }

    async fn complete_registration(&self, user_id: i64, full_name: &str) -> Result<User>;

    async fn update_work_hours(&self, user_id: i64, hours: WorkHours) -> Result<User>;

    async fn set_role(&self, user_id: i64, role: Role) -> Result<User>;

    async fn set_active(&self, user_id: i64, active: bool) -> Result<User>;
}
