use crate::attendance::geo::Coordinates;
use crate::database::models::{AttendanceRecord, AttendanceStatus, User};
use crate::database::store::{AttendanceStore, StoreError};
use crate::utils::clock::Clock;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("already checked in today")]
    AlreadyCheckedIn,
    #[error("already checked out today")]
    AlreadyCheckedOut,
    #[error("already reported absent today")]
    AlreadyMarkedAbsent,
    #[error("no check-in recorded today")]
    NoCheckInRecord,
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("attendance storage failed")]
    Storage(#[source] anyhow::Error),
    #[error("attendance invariant violated: {0}")]
    Invariant(String),
}

impl LedgerError {
    /// Expected business conflicts, as opposed to bad input or infrastructure faults.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            LedgerError::AlreadyCheckedIn
                | LedgerError::AlreadyCheckedOut
                | LedgerError::AlreadyMarkedAbsent
                | LedgerError::NoCheckInRecord
        )
    }
}

/// Checks applied to a user supplied arrival estimate. Everything is off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EtaPolicy {
    pub require_future: bool,
    pub max_ahead: Option<Duration>,
}

impl EtaPolicy {
    pub fn validate(&self, eta: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), String> {
        if self.require_future && eta <= now {
            return Err("到着予定時刻は現在より後である必要があります".to_string());
        }

        if let Some(max_ahead) = self.max_ahead {
            if eta - now > max_ahead {
                return Err(format!(
                    "到着予定時刻は{}分以内で指定してください",
                    max_ahead.num_minutes()
                ));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DailySummary {
    pub date: Option<NaiveDate>,
    pub present: usize,
    pub late: usize,
    pub on_the_way: usize,
    pub absent: usize,
    /// Employees without any record for the day.
    pub missing: Vec<String>,
}

/// Owns the one-record-per-user-per-day attendance facts.
///
/// Every mutation for a (user, date) pair runs under that pair's lock, and the
/// store's uniqueness constraint backs it up across processes.
pub struct AttendanceLedger {
    store: Arc<dyn AttendanceStore>,
    clock: Arc<dyn Clock>,
    eta_policy: EtaPolicy,
    locks: DashMap<(i64, NaiveDate), Arc<Mutex<()>>>,
}

impl AttendanceLedger {
    pub fn new(store: Arc<dyn AttendanceStore>, clock: Arc<dyn Clock>, eta_policy: EtaPolicy) -> Self {
        Self {
            store,
            clock,
            eta_policy,
            locks: DashMap::new(),
        }
    }

    pub async fn check_in(
        &self,
        user_id: i64,
        date: NaiveDate,
        location: Coordinates,
        within_radius: bool,
    ) -> Result<AttendanceRecord, LedgerError> {
        self.serialized(user_id, date, move || async move {
            let now = self.clock.now();
            let mut record = self.load_or_new(user_id, date, now).await?;

            if record.check_in_time.is_some() {
                return Err(LedgerError::AlreadyCheckedIn);
            }
            if record.status == AttendanceStatus::Absent {
                return Err(LedgerError::AlreadyMarkedAbsent);
            }

            record.check_in_time = Some(now);
            record.check_in_latitude = Some(location.latitude);
            record.check_in_longitude = Some(location.longitude);
            record.is_within_office_radius = within_radius;
            record.status = AttendanceStatus::Present;
            record.updated_at = now;

            let saved = self.persist(&record).await?;
            info!(user_id, %date, within_radius, "Checked in");
            Ok(saved)
        })
        .await
    }

    pub async fn check_out(&self, user_id: i64, date: NaiveDate) -> Result<AttendanceRecord, LedgerError> {
        self.serialized(user_id, date, move || async move {
            let now = self.clock.now();
            let mut record = self
                .load(user_id, date)
                .await?
                .filter(|r| r.check_in_time.is_some())
                .ok_or(LedgerError::NoCheckInRecord)?;

            if record.check_out_time.is_some() {
                return Err(LedgerError::AlreadyCheckedOut);
            }

            record.check_out_time = Some(now);
            record.updated_at = now;

            let saved = self.persist(&record).await?;
            info!(user_id, %date, "Checked out");
            Ok(saved)
        })
        .await
    }

    /// Records an absence. Supplying an arrival estimate makes the user "on the way".
    pub async fn mark_absent(
        &self,
        user_id: i64,
        date: NaiveDate,
        reason: &str,
        estimated_arrival: Option<DateTime<Utc>>,
    ) -> Result<AttendanceRecord, LedgerError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LedgerError::Validation("理由を入力してください".to_string()));
        }

        self.serialized(user_id, date, move || async move {
            let now = self.clock.now();
            if let Some(eta) = estimated_arrival {
                self.eta_policy.validate(eta, now).map_err(LedgerError::Validation)?;
            }

            let mut record = self.load_or_new(user_id, date, now).await?;

            if record.check_in_time.is_some() {
                return Err(LedgerError::AlreadyCheckedIn);
            }
            if record.status.is_absence() {
                return Err(LedgerError::AlreadyMarkedAbsent);
            }

            record.status = match estimated_arrival {
                Some(_) => AttendanceStatus::OnTheWay,
                None => AttendanceStatus::Absent,
            };
            record.absence_reason = Some(reason.to_string());
            record.estimated_arrival_time = estimated_arrival;
            record.updated_at = now;

            let saved = self.persist(&record).await?;
            info!(user_id, %date, status = saved.status.as_str(), "Marked absent");
            Ok(saved)
        })
        .await
    }

    pub async fn record(&self, user_id: i64, date: NaiveDate) -> Result<Option<AttendanceRecord>, LedgerError> {
        self.load(user_id, date).await
    }

    pub async fn records_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, LedgerError> {
        self.store
            .records_between(from, to)
            .await
            .map_err(LedgerError::Storage)
    }

    /// Counts for the managers' daily broadcast. Only employees are counted.
    pub async fn daily_summary(
        &self,
        date: NaiveDate,
        employees: &[User],
        tz: FixedOffset,
    ) -> Result<DailySummary, LedgerError> {
        let records = self.store.records_on(date).await.map_err(LedgerError::Storage)?;
        let mut summary = DailySummary {
            date: Some(date),
            ..Default::default()
        };

        for employee in employees {
            match records.iter().find(|r| r.user_id == employee.id) {
                Some(r) if r.status == AttendanceStatus::Present => {
                    summary.present += 1;
                    if r.is_late(employee.work_start_time, tz) {
                        summary.late += 1;
                    }
                }
                Some(r) if r.status == AttendanceStatus::OnTheWay => summary.on_the_way += 1,
                Some(r) if r.status == AttendanceStatus::Absent => summary.absent += 1,
                _ => summary.missing.push(employee.display_name().to_string()),
            }
        }

        Ok(summary)
    }

    async fn serialized<T, F, Fut>(&self, user_id: i64, date: NaiveDate, op: F) -> Result<T, LedgerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let key = (user_id, date);
        let lock = self.locks.entry(key).or_default().clone();

        let result = {
            let _guard = lock.lock().await;
            op().await
        };

        drop(lock);
        self.locks.remove_if(&key, |_, l| Arc::strong_count(l) == 1);
        result
    }

    async fn load(&self, user_id: i64, date: NaiveDate) -> Result<Option<AttendanceRecord>, LedgerError> {
        self.store
            .load_record(user_id, date)
            .await
            .map_err(LedgerError::Storage)
    }

    async fn load_or_new(
        &self,
        user_id: i64,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, LedgerError> {
        Ok(self
            .load(user_id, date)
            .await?
            .unwrap_or_else(|| AttendanceRecord::pending(user_id, date, now)))
    }

    async fn persist(&self, record: &AttendanceRecord) -> Result<AttendanceRecord, LedgerError> {
        if record.check_out_time.is_some() && record.check_in_time.is_none() {
            return Err(LedgerError::Invariant(format!(
                "check-out without check-in for user {} on {}",
                record.user_id, record.date
            )));
        }

        self.store.save_record(record).await.map_err(|e| match e {
            StoreError::Duplicate { user_id, date } => {
                error!(user_id, %date, "Duplicate attendance record detected");
                LedgerError::Invariant(e.to_string())
            }
            StoreError::Other(e) => LedgerError::Storage(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::utils::clock::ManualClock;
    use chrono::{NaiveTime, TimeZone};

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        jst().with_ymd_and_hms(2025, 3, 4, h, m, 0).unwrap().to_utc()
    }

    fn office() -> Coordinates {
        Coordinates::new(35.6812, 139.7671).unwrap()
    }

    fn ledger_at(h: u32, m: u32) -> (Arc<AttendanceLedger>, Arc<ManualClock>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(at(h, m)));
        let store = Arc::new(MemoryStore::new());
        let ledger = AttendanceLedger::new(store.clone(), clock.clone(), EtaPolicy::default());
        (Arc::new(ledger), clock, store)
    }

    #[tokio::test]
    async fn check_in_creates_present_record_and_computes_lateness() {
        let (ledger, _, store) = ledger_at(9, 15);

        let record = ledger.check_in(1, day(), office(), true).await.unwrap();

        assert_eq!(record.status, AttendanceStatus::Present);
        assert!(record.is_within_office_radius);
        assert_eq!(record.check_in_latitude, Some(35.6812));
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(record.lateness(nine, jst()), Some(Duration::minutes(15)));
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn second_check_in_is_rejected_and_record_unchanged() {
        let (ledger, clock, _) = ledger_at(8, 55);
        let first = ledger.check_in(1, day(), office(), true).await.unwrap();

        clock.advance(Duration::minutes(10));
        let err = ledger.check_in(1, day(), office(), false).await.unwrap_err();

        assert!(matches!(err, LedgerError::AlreadyCheckedIn));
        assert_eq!(ledger.record(1, day()).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn late_and_early_boundaries_are_strict() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let six = NaiveTime::from_hms_opt(18, 0, 0).unwrap();

        let (ledger, clock, _) = ledger_at(9, 0);
        let on_time = ledger.check_in(1, day(), office(), true).await.unwrap();
        assert!(!on_time.is_late(nine, jst()));

        clock.set(at(9, 1));
        let late = ledger.check_in(2, day(), office(), true).await.unwrap();
        assert!(late.is_late(nine, jst()));

        clock.set(at(18, 0));
        let left_on_time = ledger.check_out(1, day()).await.unwrap();
        assert!(!left_on_time.is_early(six, jst()));

        clock.set(at(17, 59));
        let left_early = ledger.check_out(2, day()).await.unwrap();
        assert!(left_early.is_early(six, jst()));
        assert_eq!(left_early.early_leave(six, jst()), Some(Duration::minutes(1)));
    }

    #[tokio::test]
    async fn check_out_requires_check_in_and_happens_once() {
        let (ledger, clock, _) = ledger_at(9, 0);
        assert!(matches!(
            ledger.check_out(1, day()).await.unwrap_err(),
            LedgerError::NoCheckInRecord
        ));

        ledger.mark_absent(2, day(), "flu", None).await.unwrap();
        assert!(matches!(
            ledger.check_out(2, day()).await.unwrap_err(),
            LedgerError::NoCheckInRecord
        ));

        ledger.check_in(1, day(), office(), true).await.unwrap();
        clock.set(at(18, 30));
        let record = ledger.check_out(1, day()).await.unwrap();
        assert_eq!(record.status, AttendanceStatus::Present);
        assert_eq!(record.work_duration(), Some(Duration::minutes(570)));

        assert!(matches!(
            ledger.check_out(1, day()).await.unwrap_err(),
            LedgerError::AlreadyCheckedOut
        ));
    }

    #[tokio::test]
    async fn absence_is_reported_once() {
        let (ledger, _, _) = ledger_at(8, 30);

        let record = ledger.mark_absent(1, day(), "flu", None).await.unwrap();
        assert_eq!(record.status, AttendanceStatus::Absent);
        assert_eq!(record.absence_reason.as_deref(), Some("flu"));

        let err = ledger.mark_absent(1, day(), "flu", None).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyMarkedAbsent));

        let err = ledger.check_in(1, day(), office(), true).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyMarkedAbsent));
    }

    #[tokio::test]
    async fn eta_makes_user_on_the_way_and_check_in_still_allowed() {
        let (ledger, clock, _) = ledger_at(8, 30);
        let eta = at(9, 15);

        let record = ledger.mark_absent(1, day(), "traffic", Some(eta)).await.unwrap();
        assert_eq!(record.status, AttendanceStatus::OnTheWay);
        assert_eq!(record.estimated_arrival_time, Some(eta));

        clock.set(at(9, 20));
        let arrived = ledger.check_in(1, day(), office(), true).await.unwrap();
        assert_eq!(arrived.status, AttendanceStatus::Present);
        assert_eq!(arrived.absence_reason.as_deref(), Some("traffic"));
    }

    #[tokio::test]
    async fn cannot_mark_present_day_absent() {
        let (ledger, _, _) = ledger_at(9, 0);
        ledger.check_in(1, day(), office(), true).await.unwrap();

        let err = ledger.mark_absent(1, day(), "went home", None).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyCheckedIn));
    }

    #[tokio::test]
    async fn blank_reason_is_a_validation_error_without_mutation() {
        let (ledger, _, store) = ledger_at(9, 0);
        let err = ledger.mark_absent(1, day(), "   ", None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(!err.is_conflict());
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn eta_policy_is_enforced_when_configured() {
        let clock = Arc::new(ManualClock::new(at(8, 30)));
        let policy = EtaPolicy {
            require_future: true,
            max_ahead: Some(Duration::hours(3)),
        };
        let ledger = AttendanceLedger::new(Arc::new(MemoryStore::new()), clock, policy);

        let past = ledger.mark_absent(1, day(), "traffic", Some(at(8, 0))).await;
        assert!(matches!(past, Err(LedgerError::Validation(_))));

        let too_far = ledger.mark_absent(1, day(), "traffic", Some(at(12, 0))).await;
        assert!(matches!(too_far, Err(LedgerError::Validation(_))));

        let ok = ledger.mark_absent(1, day(), "traffic", Some(at(9, 0))).await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn default_eta_policy_accepts_past_estimates() {
        let (ledger, _, _) = ledger_at(10, 0);
        let record = ledger.mark_absent(1, day(), "overslept", Some(at(9, 0))).await.unwrap();
        assert_eq!(record.status, AttendanceStatus::OnTheWay);
    }

    #[tokio::test]
    async fn storage_failure_surfaces_as_storage_error() {
        let (ledger, _, store) = ledger_at(9, 0);
        store.fail_writes(true);

        let err = ledger.check_in(1, day(), office(), true).await.unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_check_outs_only_one_succeeds() {
        let (ledger, _, _) = ledger_at(9, 0);
        ledger.check_in(1, day(), office(), true).await.unwrap();

        let a = tokio::spawn({
            let ledger = ledger.clone();
            async move { ledger.check_out(1, day()).await }
        });
        let b = tokio::spawn({
            let ledger = ledger.clone();
            async move { ledger.check_out(1, day()).await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(LedgerError::AlreadyCheckedOut))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_operations_keep_one_record_per_day() {
        let (ledger, _, store) = ledger_at(9, 0);

        let mut handles = Vec::new();
        for i in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    ledger.check_in(1, day(), office(), true).await.map(|_| ())
                } else {
                    ledger.mark_absent(1, day(), "flu", None).await.map(|_| ())
                }
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => successes += 1,
                Err(e) => assert!(e.is_conflict(), "unexpected error: {e:?}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(store.record_count(), 1);
        assert!(ledger.locks.is_empty());
    }

    #[tokio::test]
    async fn daily_summary_counts_each_employee_once() {
        use crate::database::models::Role;

        let (ledger, clock, _) = ledger_at(9, 10);
        let employee = |id: i64, name: &str| User {
            id,
            discord_id: id.to_string(),
            username: name.to_string(),
            full_name: None,
            role: Role::Employee,
            is_active: true,
            is_registered: true,
            work_start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            work_end_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            created_at: Utc::now(),
        };
        let staff = vec![
            employee(1, "a"),
            employee(2, "b"),
            employee(3, "c"),
            employee(4, "d"),
        ];

        ledger.check_in(1, day(), office(), true).await.unwrap();
        clock.set(at(8, 50));
        ledger.check_in(2, day(), office(), true).await.unwrap();
        ledger.mark_absent(3, day(), "flu", None).await.unwrap();

        let summary = ledger.daily_summary(day(), &staff, jst()).await.unwrap();
        assert_eq!(summary.present, 2);
        assert_eq!(summary.late, 1);
        assert_eq!(summary.absent, 1);
        assert_eq!(summary.on_the_way, 0);
        assert_eq!(summary.missing, vec!["d".to_string()]);
    }
}
