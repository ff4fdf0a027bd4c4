use crate::conversation::state::{ConversationState, Flow};
use crate::utils::clock::Clock;
use chrono::Duration;
use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_TTL_MINUTES: i64 = 30;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

/// Per-user dialog state with a fixed time-to-live.
///
/// Expired entries disappear lazily on `get` and eagerly on `sweep`; both only
/// ever remove an entry that is still expired at the moment of removal.
pub struct ConversationStore {
    entries: DashMap<i64, ConversationState>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ConversationStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, Duration::minutes(DEFAULT_TTL_MINUTES))
    }

    pub fn with_ttl(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            ttl,
        }
    }

    pub fn get(&self, user_id: i64) -> Option<ConversationState> {
        let now = self.clock.now();

        {
            let entry = self.entries.get(&user_id)?;
            if !entry.is_expired(now) {
                return Some(entry.clone());
            }
        }

        // a fresh state may have been set since the read above
        if self.entries.remove_if(&user_id, |_, s| s.is_expired(now)).is_some() {
            debug!(user_id, "Conversation state expired");
        }
        None
    }

    /// Replaces the user's state, stamping `created_at = now` and `expires_at = now + ttl`.
    pub fn set(&self, user_id: i64, flow: Flow) -> ConversationState {
        let now = self.clock.now();
        let state = ConversationState {
            flow,
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.set_state(user_id, state.clone());
        state
    }

    /// Replaces the user's state keeping the caller's timestamps.
    pub fn set_state(&self, user_id: i64, state: ConversationState) {
        debug!(user_id, action = ?state.action(), "Conversation state set");
        self.entries.insert(user_id, state);
    }

    pub fn remove(&self, user_id: i64) -> Option<ConversationState> {
        self.entries.remove(&user_id).map(|(_, state)| state)
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;

        self.entries.retain(|_, state| {
            let keep = !state.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });

        removed
    }

    /// Runs `sweep` every `interval_secs` until `shutdown` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval_secs: u64,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let removed = self.sweep();
                        if removed > 0 {
                            info!(removed, "Swept expired conversation states");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        debug!("Conversation sweeper stopped");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
impl ConversationStore {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::state::{AbsenceDraft, AbsenceKind, AbsenceStep, ConversationAction};
    use crate::utils::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn setup() -> (ConversationStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 4, 0, 0, 0).unwrap(),
        ));
        (ConversationStore::new(clock.clone()), clock)
    }

    fn reason_flow() -> Flow {
        Flow::ReportingAbsence(AbsenceDraft {
            kind: AbsenceKind::Sick,
            step: AbsenceStep::AwaitingReason,
        })
    }

    #[test]
    fn state_lives_for_thirty_minutes() {
        let (store, clock) = setup();
        store.set(7, reason_flow());

        clock.advance(Duration::minutes(29));
        let state = store.get(7).expect("still alive at T+29m");
        assert_eq!(state.action(), ConversationAction::ReportingAbsenceReason);
        assert_eq!(state.absence_kind(), Some(AbsenceKind::Sick));

        clock.advance(Duration::minutes(2));
        assert!(store.get(7).is_none());
    }

    #[test]
    fn expired_read_purges_entry() {
        let (store, clock) = setup();
        store.set(7, reason_flow());

        clock.advance(Duration::minutes(30) + Duration::seconds(1));
        assert!(store.get(7).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn exactly_at_expiry_is_still_readable() {
        let (store, clock) = setup();
        store.set(7, Flow::CheckingIn);
        clock.advance(Duration::minutes(30));
        assert!(store.get(7).is_some());
    }

    #[test]
    fn set_replaces_the_whole_state() {
        let (store, clock) = setup();
        store.set(7, reason_flow());
        clock.advance(Duration::minutes(20));
        store.set(7, Flow::CheckingOut);

        let state = store.get(7).unwrap();
        assert_eq!(state.flow, Flow::CheckingOut);
        assert_eq!(state.absence_kind(), None);
        assert_eq!(state.expires_at, clock.now() + Duration::minutes(30));
    }

    #[test]
    fn explicit_timestamps_are_kept() {
        let (store, clock) = setup();
        let now = clock.now();
        store.set_state(
            7,
            ConversationState {
                flow: Flow::Registering,
                created_at: now,
                expires_at: now + Duration::minutes(5),
            },
        );

        clock.advance(Duration::minutes(6));
        assert!(store.get(7).is_none());
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let (store, clock) = setup();
        store.set(1, Flow::CheckingIn);
        clock.advance(Duration::minutes(20));
        store.set(2, Flow::CheckingOut);
        clock.advance(Duration::minutes(15));

        assert_eq!(store.sweep(), 1);
        assert!(store.get(1).is_none());
        assert!(store.get(2).is_some());

        // lazy eviction already happened, nothing to double count
        clock.advance(Duration::minutes(30));
        assert!(store.get(2).is_none());
        assert_eq!(store.sweep(), 0);
    }

    #[test]
    fn remove_is_independent_per_user() {
        let (store, _) = setup();
        store.set(1, Flow::CheckingIn);
        store.set(2, Flow::CheckingIn);
        assert!(store.remove(1).is_some());
        assert!(store.remove(1).is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweeper_runs_until_shutdown() {
        let (store, clock) = setup();
        let store = Arc::new(store);
        store.set(1, Flow::CheckingIn);
        clock.advance(Duration::hours(1));

        let shutdown = CancellationToken::new();
        let handle = store.clone().spawn_sweeper(300, shutdown.clone());
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert!(store.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
