// SPDX-License-Identifier: MIT OR Apache-2.0

//! The online/offline state machine for presence rows.
//!
//! Transitions are pure functions from the current state to the next state plus the side effect
//! to emit, so they can be tested in isolation and applied atomically by whatever store holds the
//! row. Duplicate signals return `None`: no state change, no side effect.

use serde::{Deserialize, Serialize};

use crate::identity::Subject;
use crate::resource::Resource;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Key of one tracked (subject, resource) presence row.
///
/// Ordered resource-first so all rows of one resource form a contiguous key range.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PresenceKey {
    pub resource: Resource,
    pub subject: Subject,
}

/// Value of one presence row.
///
/// `last_online` records the instant of the most recent transition in either direction, which is
/// what the duration of the following transition is measured against.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceState {
    pub online: bool,
    pub last_online: Option<Timestamp>,
}

/// A transition that actually happened, with the time spent in the state being left.
///
/// Durations are absent when the row had no previous timestamp to measure against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceShift {
    CameOnline { offline_for: Option<u64> },
    WentOffline { online_for: Option<u64> },
}

/// Transition a row to online.
///
/// Returns `None` when the row is already online: no timestamp change and nothing to emit, the
/// signal is idempotent.
pub fn go_online(
    current: Option<&PresenceState>,
    now: Timestamp,
) -> Option<(PresenceState, PresenceShift)> {
    match current {
        Some(state) if state.online => None,
        _ => {
            let offline_for = current
                .and_then(|state| state.last_online)
                .map(|last| now.saturating_sub(last));
            let next = PresenceState {
                online: true,
                last_online: Some(now),
            };
            Some((next, PresenceShift::CameOnline { offline_for }))
        }
    }
}

/// Transition a row to offline.
///
/// Returns `None` when the row is already offline or was never seen.
pub fn go_offline(
    current: Option<&PresenceState>,
    now: Timestamp,
) -> Option<(PresenceState, PresenceShift)> {
    match current {
        Some(state) if state.online => {
            let online_for = state.last_online.map(|last| now.saturating_sub(last));
            let next = PresenceState {
                online: false,
                last_online: Some(now),
            };
            Some((next, PresenceShift::WentOffline { online_for }))
        }
        _ => None,
    }
}

/// Transition a row towards the requested direction.
pub fn transition(
    current: Option<&PresenceState>,
    target_online: bool,
    now: Timestamp,
) -> Option<(PresenceState, PresenceShift)> {
    if target_online {
        go_online(current, now)
    } else {
        go_offline(current, now)
    }
}

#[cfg(test)]
mod tests {
    use super::{PresenceShift, PresenceState, go_offline, go_online};

    #[test]
    fn first_online_has_no_duration() {
        let (state, shift) = go_online(None, 100).expect("should transition");
        assert!(state.online);
        assert_eq!(state.last_online, Some(100));
        assert_eq!(shift, PresenceShift::CameOnline { offline_for: None });
    }

    #[test]
    fn duplicate_online_is_a_no_op() {
        let (state, _) = go_online(None, 100).expect("should transition");

        // The second signal neither changes state nor emits.
        assert!(go_online(Some(&state), 250).is_none());
        assert_eq!(state.last_online, Some(100));
    }

    #[test]
    fn offline_measures_the_online_span() {
        let (state, _) = go_online(None, 100).expect("should transition");
        let (state, shift) = go_offline(Some(&state), 1_100).expect("should transition");

        assert!(!state.online);
        assert_eq!(state.last_online, Some(1_100));
        assert_eq!(
            shift,
            PresenceShift::WentOffline {
                online_for: Some(1_000)
            }
        );
    }

    #[test]
    fn online_after_offline_measures_the_offline_span() {
        let (state, _) = go_online(None, 100).expect("should transition");
        let (state, _) = go_offline(Some(&state), 200).expect("should transition");
        let (_, shift) = go_online(Some(&state), 200).expect("should transition");

        // An immediate rejoin reports a zero-length offline span.
        assert_eq!(
            shift,
            PresenceShift::CameOnline {
                offline_for: Some(0)
            }
        );
    }

    #[test]
    fn offline_without_history_is_a_no_op() {
        assert!(go_offline(None, 100).is_none());

        let never_online = PresenceState::default();
        assert!(go_offline(Some(&never_online), 100).is_none());
    }
}
