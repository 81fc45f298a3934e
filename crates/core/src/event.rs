//! Run event stream — typed events, monotonic sequencing, and the
//! three-channel bus (progress / control / monitor).
//!
//! Every event a run emits is stamped with the run's correlation id and a
//! strictly increasing sequence number. Bookmarks reference sequences that
//! have already been committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::model::ModelOutput;
use crate::run::StopReason;
use crate::tool::{ToolCall, ToolResult};

/// A named, persisted cursor into a session's event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub name: String,
    /// Sequence number of the last event covered by this bookmark.
    pub sequence: u64,
    /// Iteration the bookmark was taken after.
    pub iteration: u32,
}

/// Which logical channel an event is delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventChannel {
    /// Textual deltas and user-visible tool/model status. Bounded; new
    /// events are dropped under backpressure (oldest preserved).
    Progress,
    /// Approval requests and interrupts. Unbuffered; the loop blocks at the
    /// intercept point until drained or the deadline passes.
    Control,
    /// Audit and metric records. Bounded and lossy; overflow is counted.
    Monitor,
}

/// The event payload variants.
///
/// `ModelCallEnd` and `ToolCallEnd` carry the full output/result so a
/// session can be resumed purely by replaying its event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    ProgressDelta {
        text: String,
    },
    ModelCallStart {
        iteration: u32,
    },
    ModelCallEnd {
        iteration: u32,
        output: ModelOutput,
    },
    ToolCallStart {
        iteration: u32,
        call: ToolCall,
    },
    ToolCallEnd {
        iteration: u32,
        result: ToolResult,
    },
    ControlRequest {
        request_id: String,
        prompt: String,
    },
    Monitor {
        name: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        detail: Value,
    },
    Bookmark {
        bookmark: Bookmark,
    },
    Ping,
    Stopped {
        reason: StopReason,
    },
}

impl EventPayload {
    /// Route this payload to its delivery channel.
    pub fn channel(&self) -> EventChannel {
        match self {
            Self::ControlRequest { .. } => EventChannel::Control,
            Self::Monitor { .. } => EventChannel::Monitor,
            _ => EventChannel::Progress,
        }
    }
}

/// A stamped event as delivered to subscribers and persisted to sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// Correlation id of the run that emitted this event.
    pub correlation_id: String,
    /// Strictly monotonic within a run.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Receiver halves of the three bus channels.
pub struct EventStreams {
    pub progress: mpsc::Receiver<RunEvent>,
    pub control: mpsc::Receiver<RunEvent>,
    pub monitor: mpsc::Receiver<RunEvent>,
}

/// Per-run event bus.
///
/// Progress and monitor sends never block the loop: a full progress buffer
/// drops the new event and reports backpressure on the monitor channel; a
/// full monitor buffer just counts the loss. Control sends block until the
/// consumer drains them or the run deadline expires.
pub struct EventBus {
    correlation_id: String,
    seq: AtomicU64,
    progress: mpsc::Sender<RunEvent>,
    control: mpsc::Sender<RunEvent>,
    monitor: mpsc::Sender<RunEvent>,
    monitor_dropped: AtomicU64,
}

impl EventBus {
    pub const DEFAULT_PROGRESS_CAPACITY: usize = 256;
    pub const DEFAULT_MONITOR_CAPACITY: usize = 256;

    /// Create a bus and hand back the subscriber side.
    pub fn new(correlation_id: impl Into<String>) -> (Self, EventStreams) {
        Self::with_capacity(
            correlation_id,
            Self::DEFAULT_PROGRESS_CAPACITY,
            Self::DEFAULT_MONITOR_CAPACITY,
        )
    }

    pub fn with_capacity(
        correlation_id: impl Into<String>,
        progress_capacity: usize,
        monitor_capacity: usize,
    ) -> (Self, EventStreams) {
        let (progress_tx, progress_rx) = mpsc::channel(progress_capacity.max(1));
        // Capacity 1 is the closest tokio offers to a rendezvous channel.
        let (control_tx, control_rx) = mpsc::channel(1);
        let (monitor_tx, monitor_rx) = mpsc::channel(monitor_capacity.max(1));
        (
            Self {
                correlation_id: correlation_id.into(),
                seq: AtomicU64::new(0),
                progress: progress_tx,
                control: control_tx,
                monitor: monitor_tx,
                monitor_dropped: AtomicU64::new(0),
            },
            EventStreams {
                progress: progress_rx,
                control: control_rx,
                monitor: monitor_rx,
            },
        )
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Fast-forward the sequence counter so the next event is numbered at
    /// least `next`. Used when continuing a session whose log already holds
    /// events, keeping bookmark sequences unambiguous session-wide.
    pub fn advance_to(&self, next: u64) {
        self.seq.fetch_max(next, Ordering::SeqCst);
    }

    fn stamp(&self, payload: EventPayload) -> RunEvent {
        RunEvent {
            correlation_id: self.correlation_id.clone(),
            sequence: self.seq.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Sequence number the next emitted event will carry.
    pub fn next_sequence(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Sequence number of the most recently emitted event, if any.
    pub fn last_sequence(&self) -> Option<u64> {
        self.seq.load(Ordering::SeqCst).checked_sub(1)
    }

    /// Monitor events lost to overflow so far.
    pub fn monitor_dropped(&self) -> u64 {
        self.monitor_dropped.load(Ordering::Relaxed)
    }

    /// Emit a progress or monitor event. Never blocks.
    ///
    /// Returns the stamped event so the caller can persist it. Control
    /// payloads must go through [`EventBus::request_control`].
    pub fn emit(&self, payload: EventPayload) -> RunEvent {
        debug_assert!(payload.channel() != EventChannel::Control);
        let event = self.stamp(payload);
        match event.payload.channel() {
            EventChannel::Progress => {
                if self.progress.try_send(event.clone()).is_err() {
                    // Oldest-preserved: the new event is the one dropped.
                    debug!(sequence = event.sequence, "progress buffer full, event dropped");
                    self.emit_monitor_raw(
                        "backpressure",
                        serde_json::json!({ "dropped_sequence": event.sequence }),
                    );
                }
            }
            EventChannel::Monitor => {
                if self.monitor.try_send(event.clone()).is_err() {
                    self.monitor_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            EventChannel::Control => unreachable!("control events use request_control"),
        }
        event
    }

    fn emit_monitor_raw(&self, name: &str, detail: Value) {
        let event = self.stamp(EventPayload::Monitor {
            name: name.into(),
            detail,
        });
        if self.monitor.try_send(event).is_err() {
            self.monitor_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Convenience for metric/audit records.
    pub fn monitor(&self, name: impl Into<String>, detail: Value) -> RunEvent {
        self.emit(EventPayload::Monitor {
            name: name.into(),
            detail,
        })
    }

    /// Send a control request, blocking until the consumer accepts it or
    /// the call deadline/cancellation fires.
    pub async fn request_control(
        &self,
        request_id: impl Into<String>,
        prompt: impl Into<String>,
        call: &CallContext,
    ) -> Result<RunEvent> {
        let event = self.stamp(EventPayload::ControlRequest {
            request_id: request_id.into(),
            prompt: prompt.into(),
        });
        let send = self.control.send(event.clone());
        if let Some(remaining) = call.remaining() {
            tokio::select! {
                biased;
                _ = call.cancellation().cancelled() => Err(Error::Cancelled),
                _ = tokio::time::sleep(remaining) => Err(Error::Timeout),
                sent = send => sent
                    .map(|_| event)
                    .map_err(|_| Error::Internal("control channel closed".into())),
            }
        } else {
            tokio::select! {
                biased;
                _ = call.cancellation().cancelled() => Err(Error::Cancelled),
                sent = send => sent
                    .map(|_| event)
                    .map_err(|_| Error::Internal("control channel closed".into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequences_are_strictly_monotonic() {
        let (bus, mut streams) = EventBus::new("run-1");
        for _ in 0..5 {
            bus.emit(EventPayload::ProgressDelta { text: "x".into() });
        }
        let mut last = None;
        for _ in 0..5 {
            let event = streams.progress.recv().await.unwrap();
            if let Some(prev) = last {
                assert!(event.sequence > prev);
            }
            last = Some(event.sequence);
        }
    }

    #[tokio::test]
    async fn progress_overflow_drops_newest_and_reports_backpressure() {
        let (bus, mut streams) = EventBus::with_capacity("run-1", 2, 8);
        for i in 0..4 {
            bus.emit(EventPayload::ProgressDelta {
                text: format!("{i}"),
            });
        }
        // The first two events survive (oldest preserved).
        let first = streams.progress.recv().await.unwrap();
        let second = streams.progress.recv().await.unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);

        // Backpressure was reported on the monitor channel.
        let monitor = streams.monitor.recv().await.unwrap();
        match monitor.payload {
            EventPayload::Monitor { ref name, .. } => assert_eq!(name, "backpressure"),
            ref other => panic!("expected monitor event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn monitor_overflow_is_counted() {
        let (bus, _streams) = EventBus::with_capacity("run-1", 8, 1);
        bus.monitor("m1", Value::Null);
        bus.monitor("m2", Value::Null);
        bus.monitor("m3", Value::Null);
        assert_eq!(bus.monitor_dropped(), 2);
    }

    #[tokio::test]
    async fn control_send_blocks_until_drained() {
        let (bus, mut streams) = EventBus::new("run-1");
        let call = CallContext::unbounded();

        // Fill the single control slot.
        bus.request_control("r1", "approve?", &call).await.unwrap();

        // Second request blocks until the consumer drains the first.
        let pending = tokio::spawn({
            let call = call.clone();
            async move { bus.request_control("r2", "approve again?", &call).await }
        });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        let first = streams.control.recv().await.unwrap();
        assert!(matches!(first.payload, EventPayload::ControlRequest { .. }));
        pending.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn control_send_times_out_at_deadline() {
        let (bus, _streams) = EventBus::new("run-1");
        let call = CallContext::unbounded();
        bus.request_control("r1", "first", &call).await.unwrap();

        let bounded = CallContext::with_timeout(
            std::time::Duration::from_millis(20),
            tokio_util::sync::CancellationToken::new(),
        );
        let err = bus
            .request_control("r2", "second", &bounded)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[test]
    fn event_wire_shape() {
        let (bus, _streams) = EventBus::new("run-9");
        let event = bus.emit(EventPayload::ProgressDelta { text: "hi".into() });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress_delta");
        assert_eq!(json["correlation_id"], "run-9");
        assert_eq!(json["sequence"], 0);
    }
}
