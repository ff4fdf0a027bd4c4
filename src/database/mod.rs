#[cfg(test)]
pub mod memory;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod store;

pub use queries::SqliteStore;

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqliteConnectOptions};
use std::str::FromStr;

pub async fn create_connection(database_url: &str) -> Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = SqlitePool::connect_with(connect_options).await?;

    // Run migrations
    migrations::run_migrations(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{AttendanceRecord, AttendanceStatus, Role};
    use crate::database::store::{AttendanceStore, StoreError, UserStore, WorkHours};
    use chrono::{NaiveDate, NaiveTime, Utc};

    fn hours() -> WorkHours {
        WorkHours {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        }
    }

    async fn store() -> SqliteStore {
        // every in-memory connection is its own database, so keep exactly one
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    #[tokio::test]
    async fn sqlite_rejects_second_record_for_same_day() {
        let store = store().await;
        let user = store.create_or_get_user("42", "taro", hours()).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();

        let record = AttendanceRecord::pending(user.id, date, Utc::now());
        let saved = store.save_record(&record).await.unwrap();
        assert!(saved.id.is_some());

        let err = store.save_record(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn sqlite_round_trips_updates() {
        let store = store().await;
        let user = store.create_or_get_user("42", "taro", hours()).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();

        let mut record = store
            .save_record(&AttendanceRecord::pending(user.id, date, Utc::now()))
            .await
            .unwrap();
        record.status = AttendanceStatus::Absent;
        record.absence_reason = Some("flu".to_string());
        store.save_record(&record).await.unwrap();

        let loaded = store.load_record(user.id, date).await.unwrap().unwrap();
        assert_eq!(loaded.status, AttendanceStatus::Absent);
        assert_eq!(loaded.absence_reason.as_deref(), Some("flu"));
        assert_eq!(store.records_on(date).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sqlite_user_lifecycle() {
        let store = store().await;
        let user = store.create_or_get_user("42", "taro", hours()).await.unwrap();
        assert!(!user.is_registered);
        assert!(store.active_users().await.unwrap().is_empty());

        let again = store.create_or_get_user("42", "taro", hours()).await.unwrap();
        assert_eq!(again.id, user.id);

        store.complete_registration(user.id, "山田 太郎").await.unwrap();
        let manager = store.set_role(user.id, Role::Manager).await.unwrap();
        assert_eq!(manager.role, Role::Manager);
        assert_eq!(store.managers().await.unwrap().len(), 1);

        store.set_active(user.id, false).await.unwrap();
        assert!(store.active_users().await.unwrap().is_empty());
    }
}
