// SPDX-License-Identifier: MIT OR Apache-2.0

//! Presence tracking for vestibule subjects.
//!
//! [`PresenceTracker`] converts raw online/offline signals into deduplicated state transitions
//! through the guarded store transitions, and emits one duration-annotated analytics record per
//! transition that actually happened. Analytics emission is best-effort: a failing sink is
//! logged and never fails the state transition that triggered it.

mod analytics;
mod clock;
mod tracker;

pub use analytics::{
    AnalyticsEvent, AnalyticsSink, ChannelSink, NullSink, PresenceEventKind, SinkClosed,
};
pub use clock::{Clock, SystemClock};
pub use tracker::PresenceTracker;
