// SPDX-License-Identifier: MIT OR Apache-2.0

use tracing::{debug, warn};
use vestibule_core::{PresenceKey, Resource, SessionId, Subject};
use vestibule_store::{PresenceStore, SweptRow};

use crate::analytics::{AnalyticsEvent, AnalyticsSink};
use crate::clock::{Clock, SystemClock};

/// Tracks online/offline state per (subject, resource) pair and per session.
///
/// Raw signals are folded into at most one state transition each: a signal matching the current
/// state is a no-op with no analytics. Every real transition emits exactly one analytics record
/// carrying the time spent in the state being left.
#[derive(Clone, Debug)]
pub struct PresenceTracker<S, A, C = SystemClock> {
    store: S,
    sink: A,
    clock: C,
}

impl<S, A> PresenceTracker<S, A>
where
    S: PresenceStore,
    A: AnalyticsSink,
{
    pub fn new(store: S, sink: A) -> Self {
        Self {
            store,
            sink,
            clock: SystemClock,
        }
    }
}

impl<S, A, C> PresenceTracker<S, A, C>
where
    S: PresenceStore,
    A: AnalyticsSink,
    C: Clock,
{
    /// A tracker reading time from the given clock instead of the wall clock.
    pub fn with_clock(store: S, sink: A, clock: C) -> Self {
        Self { store, sink, clock }
    }

    /// Signal that a subject is online on a resource.
    ///
    /// Returns `true` when this transitioned the row, `false` for a duplicate signal.
    pub async fn go_online(
        &mut self,
        subject: Subject,
        resource: Resource,
    ) -> Result<bool, S::Error> {
        self.apply(subject, resource, true).await
    }

    /// Signal that a subject is offline on a resource.
    pub async fn go_offline(
        &mut self,
        subject: Subject,
        resource: Resource,
    ) -> Result<bool, S::Error> {
        self.apply(subject, resource, false).await
    }

    /// Signal session-global presence, independent of any resource.
    pub async fn session_online(&mut self, session: SessionId) -> Result<bool, S::Error> {
        self.apply_session(session, true).await
    }

    pub async fn session_offline(&mut self, session: SessionId) -> Result<bool, S::Error> {
        self.apply_session(session, false).await
    }

    /// Force every currently-online row to offline, for crash recovery and maintenance resets.
    ///
    /// Safe to run concurrently with individual signals: rows that already transitioned before
    /// the sweep reaches them are skipped by the store's guard, so none is recorded twice.
    /// Returns how many rows actually transitioned.
    pub async fn force_all_offline(&mut self) -> Result<usize, S::Error> {
        let now = self.clock.now();
        let swept = self.store.sweep_all_offline(now).await?;
        let count = swept.len();

        for row in swept {
            let event = match row {
                SweptRow::Resource { key, shift } => {
                    AnalyticsEvent::from_shift(shift, key.subject, Some(key.resource), now)
                }
                SweptRow::Session { session, shift } => {
                    AnalyticsEvent::from_shift(shift, Subject::Session(session), None, now)
                }
            };
            self.emit(event);
        }

        debug!(count, "forced all presence rows offline");
        Ok(count)
    }

    /// All subjects currently online on a resource.
    pub async fn online_subjects(&self, resource: &Resource) -> Result<Vec<Subject>, S::Error> {
        self.store.online_by_resource(resource).await
    }

    async fn apply(
        &mut self,
        subject: Subject,
        resource: Resource,
        target_online: bool,
    ) -> Result<bool, S::Error> {
        let now = self.clock.now();
        let key = PresenceKey { resource, subject };

        let Some(shift) = self.store.apply_presence(&key, target_online, now).await? else {
            return Ok(false);
        };

        self.emit(AnalyticsEvent::from_shift(
            shift,
            key.subject,
            Some(key.resource),
            now,
        ));
        Ok(true)
    }

    async fn apply_session(
        &mut self,
        session: SessionId,
        target_online: bool,
    ) -> Result<bool, S::Error> {
        let now = self.clock.now();

        let Some(shift) = self
            .store
            .apply_session_presence(&session, target_online, now)
            .await?
        else {
            return Ok(false);
        };

        self.emit(AnalyticsEvent::from_shift(
            shift,
            Subject::Session(session),
            None,
            now,
        ));
        Ok(true)
    }

    // Best-effort: the transition is already committed, a failed record is dropped.
    fn emit(&self, event: AnalyticsEvent) {
        if let Err(error) = self.sink.record(event) {
            warn!(%error, "dropping analytics record");
        }
    }
}

#[cfg(test)]
mod tests {
    use vestibule_core::{AccountId, PresenceKey, Resource, SessionId, Subject};
    use vestibule_store::{MemoryStore, PresenceStore};

    use super::PresenceTracker;
    use crate::analytics::{ChannelSink, PresenceEventKind};
    use crate::clock::test_clock::ManualClock;

    fn room(id: &str) -> Resource {
        Resource::new("room", id)
    }

    fn session_subject(id: &str) -> Subject {
        Subject::Session(SessionId::new(id))
    }

    #[tokio::test]
    async fn duplicate_online_signals_emit_once() {
        let clock = ManualClock::at(1_000);
        let (sink, mut events) = ChannelSink::new();
        let mut tracker = PresenceTracker::with_clock(MemoryStore::new(), sink, clock.clone());

        assert!(
            tracker
                .go_online(session_subject("s1"), room("1"))
                .await
                .unwrap()
        );

        clock.advance(500);
        assert!(
            !tracker
                .go_online(session_subject("s1"), room("1"))
                .await
                .unwrap()
        );

        let event = events.try_recv().expect("should return Ok");
        assert_eq!(event.kind, PresenceEventKind::CameOnline);
        assert_eq!(event.timestamp, 1_000);
        assert_eq!(event.duration, None);

        // The duplicate produced neither analytics nor a timestamp change.
        assert!(events.try_recv().is_err());
        let state = tracker
            .store
            .presence(&PresenceKey {
                resource: room("1"),
                subject: session_subject("s1"),
            })
            .await
            .unwrap()
            .expect("row exists");
        assert_eq!(state.last_online, Some(1_000));
    }

    #[tokio::test]
    async fn durations_measure_the_state_being_left() {
        let clock = ManualClock::at(0);
        let (sink, mut events) = ChannelSink::new();
        let mut tracker = PresenceTracker::with_clock(MemoryStore::new(), sink, clock.clone());

        tracker
            .go_online(session_subject("s1"), room("1"))
            .await
            .unwrap();

        clock.advance(2_000);
        tracker
            .go_offline(session_subject("s1"), room("1"))
            .await
            .unwrap();

        // Immediate rejoin: the offline span is zero.
        tracker
            .go_online(session_subject("s1"), room("1"))
            .await
            .unwrap();

        let online = events.try_recv().expect("should return Ok");
        assert_eq!(online.duration, None);

        let offline = events.try_recv().expect("should return Ok");
        assert_eq!(offline.kind, PresenceEventKind::WentOffline);
        assert_eq!(offline.duration, Some(2_000));

        let rejoin = events.try_recv().expect("should return Ok");
        assert_eq!(rejoin.kind, PresenceEventKind::CameOnline);
        assert_eq!(rejoin.duration, Some(0));
    }

    #[tokio::test]
    async fn force_all_offline_records_each_row_once() {
        let clock = ManualClock::at(100);
        let (sink, mut events) = ChannelSink::new();
        let mut tracker = PresenceTracker::with_clock(MemoryStore::new(), sink, clock.clone());

        tracker
            .go_online(session_subject("s1"), room("1"))
            .await
            .unwrap();
        tracker
            .go_online(session_subject("s2"), room("1"))
            .await
            .unwrap();
        tracker
            .go_online(Subject::Account(AccountId::new("u1")), room("2"))
            .await
            .unwrap();
        for _ in 0..3 {
            events.try_recv().expect("should return Ok");
        }

        clock.advance(400);
        assert_eq!(tracker.force_all_offline().await.unwrap(), 3);

        for _ in 0..3 {
            let event = events.try_recv().expect("should return Ok");
            assert_eq!(event.kind, PresenceEventKind::WentOffline);
            assert_eq!(event.duration, Some(400));
        }
        assert!(events.try_recv().is_err());

        // Nothing is left online, the sweep converged.
        assert!(tracker.online_subjects(&room("1")).await.unwrap().is_empty());
        assert_eq!(tracker.force_all_offline().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn session_presence_follows_the_same_discipline() {
        let clock = ManualClock::at(10);
        let (sink, mut events) = ChannelSink::new();
        let store = MemoryStore::new();
        let mut tracker = PresenceTracker::with_clock(store.clone(), sink, clock.clone());

        assert!(tracker.session_online(SessionId::new("s1")).await.unwrap());
        assert!(!tracker.session_online(SessionId::new("s1")).await.unwrap());

        clock.advance(90);
        assert!(tracker.session_offline(SessionId::new("s1")).await.unwrap());

        let online = events.try_recv().expect("should return Ok");
        assert_eq!(online.resource, None);
        assert_eq!(online.subject, session_subject("s1"));

        let offline = events.try_recv().expect("should return Ok");
        assert_eq!(offline.duration, Some(90));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn transitions_commit_even_when_the_sink_is_gone() {
        let clock = ManualClock::at(0);
        let (sink, events) = ChannelSink::new();
        drop(events);
        let mut tracker = PresenceTracker::with_clock(MemoryStore::new(), sink, clock);

        // The record is dropped but the state transition still happens.
        assert!(
            tracker
                .go_online(session_subject("s1"), room("1"))
                .await
                .unwrap()
        );
        assert_eq!(tracker.online_subjects(&room("1")).await.unwrap().len(), 1);
    }
}
