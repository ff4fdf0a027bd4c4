use crate::database::models::{AttendanceRecord, AttendanceStatus, Role, User};
use crate::database::store::{AttendanceStore, StoreError, UserStore, WorkHours};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const USER_COLUMNS: &str = "id, discord_id, username, full_name, role, is_active, is_registered, \
     work_start_time, work_end_time, created_at";

const RECORD_COLUMNS: &str = "id, user_id, date, status, check_in_time, check_out_time, \
     check_in_latitude, check_in_longitude, is_within_office_radius, absence_reason, \
     estimated_arrival_time, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn get_user_by_discord_id(&self, discord_id: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE discord_id = ?"))
            .bind(discord_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn require_user(&self, user_id: i64) -> Result<User> {
        self.get_user(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User {} not found", user_id))
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let role: String = row.try_get("role")?;

    Ok(User {
        id: row.try_get("id")?,
        discord_id: row.try_get("discord_id")?,
        username: row.try_get("username")?,
        full_name: row.try_get("full_name")?,
        role: role.parse()?,
        is_active: row.try_get("is_active")?,
        is_registered: row.try_get("is_registered")?,
        work_start_time: row.try_get("work_start_time")?,
        work_end_time: row.try_get("work_end_time")?,
        created_at: row.try_get("created_at")?,
    })
}

fn record_from_row(row: &SqliteRow) -> Result<AttendanceRecord> {
    let status: String = row.try_get("status")?;

    Ok(AttendanceRecord {
        id: Some(row.try_get("id")?),
        user_id: row.try_get("user_id")?,
        date: row.try_get("date")?,
        status: status.parse::<AttendanceStatus>()?,
        check_in_time: row.try_get("check_in_time")?,
        check_out_time: row.try_get("check_out_time")?,
        check_in_latitude: row.try_get("check_in_latitude")?,
        check_in_longitude: row.try_get("check_in_longitude")?,
        is_within_office_radius: row.try_get("is_within_office_radius")?,
        absence_reason: row.try_get("absence_reason")?,
        estimated_arrival_time: row.try_get("estimated_arrival_time")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl AttendanceStore for SqliteStore {
    async fn load_record(&self, user_id: i64, date: NaiveDate) -> Result<Option<AttendanceRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE user_id = ? AND date = ?"
        ))
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn save_record(&self, record: &AttendanceRecord) -> Result<AttendanceRecord, StoreError> {
        let mut stored = record.clone();

        match record.id {
            None => {
                let result = sqlx::query(
                    "INSERT INTO attendance_records (user_id, date, status, check_in_time, check_out_time,
                        check_in_latitude, check_in_longitude, is_within_office_radius, absence_reason,
                        estimated_arrival_time, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(record.user_id)
                .bind(record.date)
                .bind(record.status.as_str())
                .bind(record.check_in_time)
                .bind(record.check_out_time)
                .bind(record.check_in_latitude)
                .bind(record.check_in_longitude)
                .bind(record.is_within_office_radius)
                .bind(record.absence_reason.as_deref())
                .bind(record.estimated_arrival_time)
                .bind(record.created_at)
                .bind(record.updated_at)
                .execute(&self.pool)
                .await;

                match result {
                    Ok(done) => stored.id = Some(done.last_insert_rowid()),
                    Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                        return Err(StoreError::Duplicate {
                            user_id: record.user_id,
                            date: record.date,
                        });
                    }
                    Err(e) => {
                        return Err(anyhow::Error::new(e)
                            .context("failed to insert attendance record")
                            .into());
                    }
                }
            }
            Some(id) => {
                sqlx::query(
                    "UPDATE attendance_records
                     SET status = ?, check_in_time = ?, check_out_time = ?, check_in_latitude = ?,
                         check_in_longitude = ?, is_within_office_radius = ?, absence_reason = ?,
                         estimated_arrival_time = ?, updated_at = ?
                     WHERE id = ?",
                )
                .bind(record.status.as_str())
                .bind(record.check_in_time)
                .bind(record.check_out_time)
                .bind(record.check_in_latitude)
                .bind(record.check_in_longitude)
                .bind(record.is_within_office_radius)
                .bind(record.absence_reason.as_deref())
                .bind(record.estimated_arrival_time)
                .bind(record.updated_at)
                .bind(id)
                .execute(&self.pool)
                .await
                .context("failed to update attendance record")?;
            }
        }

        Ok(stored)
    }

    async fn records_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records
             WHERE date >= ? AND date <= ?
             ORDER BY date ASC, user_id ASC"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn create_or_get_user(
        &self,
        discord_id: &str,
        username: &str,
        default_hours: WorkHours,
    ) -> Result<User> {
        if let Some(user) = self.get_user_by_discord_id(discord_id).await? {
            return Ok(user);
        }

        let result = sqlx::query(
            "INSERT INTO users (discord_id, username, work_start_time, work_end_time, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(discord_id)
        .bind(username)
        .bind(default_hours.start)
        .bind(default_hours.end)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.require_user(result.last_insert_rowid()).await
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn active_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE is_active = TRUE AND is_registered = TRUE
             ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn complete_registration(&self, user_id: i64, full_name: &str) -> Result<User> {
        sqlx::query("UPDATE users SET full_name = ?, is_registered = TRUE WHERE id = ?")
            .bind(full_name)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        self.require_user(user_id).await
    }

    async fn update_work_hours(&self, user_id: i64, hours: WorkHours) -> Result<User> {
        sqlx::query("UPDATE users SET work_start_time = ?, work_end_time = ? WHERE id = ?")
            .bind(hours.start)
            .bind(hours.end)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        self.require_user(user_id).await
    }

    async fn set_role(&self, user_id: i64, role: Role) -> Result<User> {
        sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        self.require_user(user_id).await
    }

    async fn set_active(&self, user_id: i64, active: bool) -> Result<User> {
        sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        self.require_user(user_id).await
    }
}
