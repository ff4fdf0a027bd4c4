//! In-process store used by unit tests. Mirrors the SQLite uniqueness rules.

use crate::database::models::{AttendanceRecord, Role, User};
use crate::database::store::{AttendanceStore, StoreError, UserStore, WorkHours};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<(i64, NaiveDate), AttendanceRecord>>,
    users: Mutex<BTreeMap<i64, User>>,
    next_id: AtomicI64,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `save_record` fail as if the database were down.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn update_user(&self, user_id: i64, f: impl FnOnce(&mut User)) -> Result<User> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| anyhow::anyhow!("User {} not found", user_id))?;
        f(user);
        Ok(user.clone())
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn load_record(&self, user_id: i64, date: NaiveDate) -> Result<Option<AttendanceRecord>> {
        // let other tasks interleave between the read and the following write
        tokio::task::yield_now().await;
        Ok(self.records.lock().unwrap().get(&(user_id, date)).cloned())
    }

    async fn save_record(&self, record: &AttendanceRecord) -> Result<AttendanceRecord, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("database is unavailable").into());
        }

        let key = (record.user_id, record.date);
        let mut records = self.records.lock().unwrap();
        let mut stored = record.clone();

        match record.id {
            None if records.contains_key(&key) => {
                return Err(StoreError::Duplicate {
                    user_id: record.user_id,
                    date: record.date,
                });
            }
            None => stored.id = Some(self.next_id()),
            Some(_) => {}
        }

        records.insert(key, stored.clone());
        Ok(stored)
    }

    async fn records_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        let mut found: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.date >= from && r.date <= to)
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.date, r.user_id));
        Ok(found)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_or_get_user(
        &self,
        discord_id: &str,
        username: &str,
        default_hours: WorkHours,
    ) -> Result<User> {
        let mut users = self.users.lock().unwrap();

        if let Some(user) = users.values().find(|u| u.discord_id == discord_id) {
            return Ok(user.clone());
        }

        let user = User {
            id: self.next_id(),
            discord_id: discord_id.to_string(),
            username: username.to_string(),
            full_name: None,
            role: Role::Employee,
            is_active: true,
            is_registered: false,
            work_start_time: default_hours.start,
            work_end_time: default_hours.end,
            created_at: Utc::now(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        Ok(self.users.lock().unwrap().get(&user_id).cloned())
    }

    async fn active_users(&self) -> Result<Vec<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.is_active && u.is_registered)
            .cloned()
            .collect())
    }

    async fn complete_registration(&self, user_id: i64, full_name: &str) -> Result<User> {
        self.update_user(user_id, |u| {
            u.full_name = Some(full_name.to_string());
            u.is_registered = true;
        })
    }

    async fn update_work_hours(&self, user_id: i64, hours: WorkHours) -> Result<User> {
        self.update_user(user_id, |u| {
            u.work_start_time = hours.start;
            u.work_end_time = hours.end;
        })
    }

    async fn set_role(&self, user_id: i64, role: Role) -> Result<User> {
        self.update_user(user_id, |u| u.role = role)
    }

    async fn set_active(&self, user_id: i64, active: bool) -> Result<User> {
        self.update_user(user_id, |u| u.is_active = active)
    }
}
