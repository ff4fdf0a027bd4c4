use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Employee,
    Manager,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Manager => "manager",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "employee" => Ok(Role::Employee),
            "manager" => Ok(Role::Manager),
            _ => Err(anyhow::anyhow!("Invalid role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub discord_id: String,
    pub username: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub is_registered: bool,
    pub work_start_time: NaiveTime,
    pub work_end_time: NaiveTime,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }

    /// Reminders and follow-ups only apply to active, registered employees.
    pub fn receives_reminders(&self) -> bool {
        self.is_active && self.is_registered && self.role == Role::Employee
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Pending,
    Present,
    Absent,
    OnTheWay,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Pending => "pending",
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::OnTheWay => "on_the_way",
        }
    }

    pub fn is_absence(&self) -> bool {
        matches!(self, AttendanceStatus::Absent | AttendanceStatus::OnTheWay)
    }
}

impl FromStr for AttendanceStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AttendanceStatus::Pending),
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "on_the_way" => Ok(AttendanceStatus::OnTheWay),
            _ => Err(anyhow::anyhow!("Invalid attendance status: {}", s)),
        }
    }
}

/// One row per (user, local business date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// `None` until the record has been stored for the first time.
    pub id: Option<i64>,
    pub user_id: i64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub check_in_latitude: Option<f64>,
    pub check_in_longitude: Option<f64>,
    pub is_within_office_radius: bool,
    pub absence_reason: Option<String>,
    pub estimated_arrival_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn pending(user_id: i64, date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            user_id,
            date,
            status: AttendanceStatus::Pending,
            check_in_time: None,
            check_out_time: None,
            check_in_latitude: None,
            check_in_longitude: None,
            is_within_office_radius: false,
            absence_reason: None,
            estimated_arrival_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Late when the local check-in time is strictly after the work start.
    pub fn lateness(&self, work_start: NaiveTime, tz: FixedOffset) -> Option<Duration> {
        let checked_in = self.check_in_time?.with_timezone(&tz).time();
        (checked_in > work_start).then(|| checked_in.signed_duration_since(work_start))
    }

    pub fn is_late(&self, work_start: NaiveTime, tz: FixedOffset) -> bool {
        self.lateness(work_start, tz).is_some()
    }

    /// Early when the local check-out time is strictly before the work end.
    pub fn early_leave(&self, work_end: NaiveTime, tz: FixedOffset) -> Option<Duration> {
        let checked_out = self.check_out_time?.with_timezone(&tz).time();
        (checked_out < work_end).then(|| work_end.signed_duration_since(checked_out))
    }

    pub fn is_early(&self, work_end: NaiveTime, tz: FixedOffset) -> bool {
        self.early_leave(work_end, tz).is_some()
    }

    pub fn work_duration(&self) -> Option<Duration> {
        Some(self.check_out_time? - self.check_in_time?)
    }
}
