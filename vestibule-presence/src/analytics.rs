// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use vestibule_core::{PresenceShift, Resource, Subject, Timestamp};

/// Direction of a recorded presence transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceEventKind {
    CameOnline,
    WentOffline,
}

/// One duration-annotated presence record handed to the analytics sink.
///
/// `resource` is `None` for session-global presence. `duration` is the time spent in the state
/// being left, absent when the subject had no recorded history to measure against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub kind: PresenceEventKind,
    pub subject: Subject,
    pub resource: Option<Resource>,
    pub timestamp: Timestamp,
    pub duration: Option<u64>,
}

impl AnalyticsEvent {
    pub(crate) fn from_shift(
        shift: PresenceShift,
        subject: Subject,
        resource: Option<Resource>,
        timestamp: Timestamp,
    ) -> Self {
        let (kind, duration) = match shift {
            PresenceShift::CameOnline { offline_for } => {
                (PresenceEventKind::CameOnline, offline_for)
            }
            PresenceShift::WentOffline { online_for } => {
                (PresenceEventKind::WentOffline, online_for)
            }
        };

        Self {
            kind,
            subject,
            resource,
            timestamp,
            duration,
        }
    }
}

/// The sink failed to accept a record. The record is dropped, nothing else is affected.
#[derive(Debug, Error, PartialEq)]
#[error("analytics sink is closed")]
pub struct SinkClosed;

/// Fire-and-forget destination for analytics records.
///
/// Implementations must not block; a sink that cannot accept a record reports [`SinkClosed`]
/// and the caller drops the record.
pub trait AnalyticsSink {
    fn record(&self, event: AnalyticsEvent) -> Result<(), SinkClosed>;
}

/// Sink delivering records over an unbounded channel to an in-process consumer.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AnalyticsEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AnalyticsEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AnalyticsSink for ChannelSink {
    fn record(&self, event: AnalyticsEvent) -> Result<(), SinkClosed> {
        self.tx.send(event).map_err(|_| SinkClosed)
    }
}

/// Sink discarding every record, for deployments without analytics ingestion.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl AnalyticsSink for NullSink {
    fn record(&self, _event: AnalyticsEvent) -> Result<(), SinkClosed> {
        Ok(())
    }
}
