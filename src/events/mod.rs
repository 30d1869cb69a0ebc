//! In-process publish/subscribe for pipeline events.
//!
//! One `tokio::sync::broadcast` channel per event type, bundled behind a
//! cheaply clonable [`EventBus`] handle.  Publishing never blocks: a send
//! with no live receivers is a no-op, and a lagging receiver drops its oldest
//! events rather than stalling the publisher.  That property is what keeps
//! the hotkey listener thread decoupled from transcription latency — the
//! listener only ever executes a channel send; the long-running handler runs
//! in its own task on the worker pool.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::stt::{EngineSlot, Transcription};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Push-to-talk key activity, stamped at the listener thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The push-to-talk key went down.
    Pressed { at: Instant },
    /// The push-to-talk key came back up.
    Released { at: Instant },
    /// The cancel key was pressed; any active capture should be aborted.
    CancelRequested { at: Instant },
}

/// The audio collaborator hit a device or permission problem.
#[derive(Debug, Clone)]
pub struct CaptureErrorEvent {
    pub reason: String,
    pub at: Instant,
}

/// Why an engine reported a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// `initialize()` failed.
    InitFailed,
    /// No admission permit within the acquire timeout.
    ConcurrencyLimit,
    /// A per-call deadline expired.
    Timeout,
    /// Any other per-call transcription failure.
    CallFailed,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::InitFailed => "init-failed",
            FailureReason::ConcurrencyLimit => "concurrency-limit",
            FailureReason::Timeout => "timeout",
            FailureReason::CallFailed => "call-failed",
        }
    }
}

/// One engine failure, consumed by the watchdog.
#[derive(Debug, Clone)]
pub struct FailureEvent {
    pub engine: EngineSlot,
    pub at: Instant,
    pub reason: FailureReason,
    pub cause: String,
    /// Extra details (exit code, durations) for logs; never transcript text.
    pub context: HashMap<&'static str, String>,
}

impl FailureEvent {
    pub fn new(engine: EngineSlot, reason: FailureReason, cause: impl Into<String>) -> Self {
        Self {
            engine,
            at: Instant::now(),
            reason,
            cause: cause.into(),
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.insert(key, value.into());
        self
    }
}

/// The orchestrator finished one transcription (possibly with empty text).
#[derive(Debug, Clone)]
pub struct TranscriptionCompletedEvent {
    pub transcription: Transcription,
    pub at: Instant,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Handle to the process-wide event channels.  Clone freely; all clones share
/// the same channels.
#[derive(Debug, Clone)]
pub struct EventBus {
    hotkey: broadcast::Sender<HotkeyEvent>,
    capture_errors: broadcast::Sender<CaptureErrorEvent>,
    failures: broadcast::Sender<FailureEvent>,
    completed: broadcast::Sender<TranscriptionCompletedEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (hotkey, _) = broadcast::channel(64);
        let (capture_errors, _) = broadcast::channel(16);
        let (failures, _) = broadcast::channel(64);
        let (completed, _) = broadcast::channel(32);
        Self {
            hotkey,
            capture_errors,
            failures,
            completed,
        }
    }

    // -- publish ------------------------------------------------------------

    pub fn publish_hotkey(&self, event: HotkeyEvent) {
        let _ = self.hotkey.send(event);
    }

    pub fn publish_capture_error(&self, event: CaptureErrorEvent) {
        log::warn!("capture error: {}", event.reason);
        let _ = self.capture_errors.send(event);
    }

    pub fn publish_failure(&self, event: FailureEvent) {
        log::warn!(
            "engine {} failure ({}): {}",
            event.engine,
            event.reason.as_str(),
            event.cause
        );
        let _ = self.failures.send(event);
    }

    pub fn publish_completed(&self, event: TranscriptionCompletedEvent) {
        let _ = self.completed.send(event);
    }

    // -- subscribe ----------------------------------------------------------

    pub fn subscribe_hotkey(&self) -> broadcast::Receiver<HotkeyEvent> {
        self.hotkey.subscribe()
    }

    pub fn subscribe_capture_errors(&self) -> broadcast::Receiver<CaptureErrorEvent> {
        self.capture_errors.subscribe()
    }

    pub fn subscribe_failures(&self) -> broadcast::Receiver<FailureEvent> {
        self.failures.subscribe()
    }

    pub fn subscribe_completed(&self) -> broadcast::Receiver<TranscriptionCompletedEvent> {
        self.completed.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
