//! Push-to-talk event loop.
//!
//! [`DictationController`] consumes hotkey and capture-error events from the
//! bus and drives the session lifecycle:
//!
//! ```text
//! HotkeyEvent::Pressed
//!   └─▶ CaptureStateMachine::start_capture + CaptureSource::start_session
//!
//! HotkeyEvent::Released
//!   └─▶ stop_capture → read_all → spawn(orchestrator.transcribe)
//!
//! HotkeyEvent::CancelRequested / CaptureErrorEvent
//!   └─▶ cancel_capture + CaptureSource::cancel_session
//! ```
//!
//! The transcription itself is spawned as a task, so this loop (and with it
//! the hotkey listener) is never blocked by engine latency.  Capture is
//! strictly serialized by the state machine; transcriptions from different
//! sessions may still overlap.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use crate::audio::CaptureSource;
use crate::events::{EventBus, HotkeyEvent};
use crate::pipeline::orchestrator::TranscriptionOrchestrator;
use crate::pipeline::session::{CaptureStateMachine, SessionId};

// ---------------------------------------------------------------------------
// DictationController
// ---------------------------------------------------------------------------

/// Wires hotkey events to capture sessions and the orchestrator.
pub struct DictationController {
    bus: EventBus,
    sessions: Arc<CaptureStateMachine>,
    capture: Arc<dyn CaptureSource>,
    orchestrator: Arc<TranscriptionOrchestrator>,
}

impl DictationController {
    pub fn new(
        bus: EventBus,
        sessions: Arc<CaptureStateMachine>,
        capture: Arc<dyn CaptureSource>,
        orchestrator: Arc<TranscriptionOrchestrator>,
    ) -> Self {
        Self {
            bus,
            sessions,
            capture,
            orchestrator,
        }
    }

    /// Run until the bus closes.  Spawn this as a task from `main`.
    pub async fn run(self) {
        let mut hotkeys = self.bus.subscribe_hotkey();
        let mut capture_errors = self.bus.subscribe_capture_errors();
        let mut current: Option<SessionId> = None;

        loop {
            tokio::select! {
                event = hotkeys.recv() => match event {
                    Ok(HotkeyEvent::Pressed { .. }) => self.on_pressed(&mut current),
                    Ok(HotkeyEvent::Released { .. }) => self.on_released(&mut current),
                    Ok(HotkeyEvent::CancelRequested { .. }) => self.on_cancel(&mut current),
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("controller: lagged, {skipped} hotkey event(s) dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
                event = capture_errors.recv() => match event {
                    Ok(error) => {
                        log::warn!("controller: capture error ({}), cancelling", error.reason);
                        self.on_cancel(&mut current);
                    }
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },
            }
        }

        log::info!("controller: event bus closed, shutting down");
    }

    fn on_pressed(&self, current: &mut Option<SessionId>) {
        if current.is_some() {
            // Key repeat while already recording.
            return;
        }

        let id = SessionId::next();
        if !self.sessions.start_capture(id) {
            log::warn!("controller: another session is active, ignoring press");
            return;
        }

        if let Err(e) = self.capture.start_session(id) {
            log::warn!("controller: could not start capture: {e}");
            self.sessions.cancel_capture();
            return;
        }

        log::debug!("controller: {id} recording");
        *current = Some(id);
    }

    fn on_released(&self, current: &mut Option<SessionId>) {
        let Some(id) = current.take() else {
            // Release without a matching press (e.g. after a cancel).
            return;
        };

        if !self.sessions.stop_capture(id) {
            log::warn!("controller: stale release for {id}, ignoring");
            return;
        }

        self.capture.stop_session(id);
        let clip = self.capture.read_all(id);
        log::debug!("controller: {id} captured {} ms", clip.duration_ms());

        // Long-running handler: run on the worker pool so this loop stays
        // responsive to the next press.
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            orchestrator.transcribe(clip).await;
        });
    }

    fn on_cancel(&self, current: &mut Option<SessionId>) {
        *current = None;
        if let Some(id) = self.sessions.cancel_capture() {
            self.capture.cancel_session(id);
            log::debug!("controller: {id} cancelled");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioValidator, CaptureError, PcmClip};
    use crate::metrics::PipelineMetrics;
    use crate::pipeline::orchestrator::{OrchestrationMode, OrchestratorConfig};
    use crate::pipeline::timing::TimingCoordinator;
    use crate::stt::mock::MockEngine;
    use crate::stt::{EngineSlot, TranscribeEngine};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    /// Capture double that returns a canned one-second clip.
    #[derive(Default)]
    struct FakeCapture {
        started: AtomicUsize,
        stopped: AtomicUsize,
        cancelled: AtomicUsize,
    }

    impl CaptureSource for FakeCapture {
        fn start_session(&self, _id: SessionId) -> Result<(), CaptureError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn stop_session(&self, _id: SessionId) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
        fn cancel_session(&self, _id: SessionId) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
        fn read_all(&self, _id: SessionId) -> PcmClip {
            PcmClip::from_bytes(vec![0u8; 32_000])
        }
    }

    fn controller_fixture() -> (
        EventBus,
        Arc<FakeCapture>,
        Arc<CaptureStateMachine>,
        DictationController,
    ) {
        let bus = EventBus::new();
        let capture = Arc::new(FakeCapture::default());
        let sessions = Arc::new(CaptureStateMachine::new());

        let primary = Arc::new(MockEngine::ok(EngineSlot::Primary, "typed text", 0.9))
            as Arc<dyn TranscribeEngine>;
        let secondary =
            Arc::new(MockEngine::ok(EngineSlot::Secondary, "s", 0.9)) as Arc<dyn TranscribeEngine>;

        let orchestrator = Arc::new(TranscriptionOrchestrator::new(
            primary,
            secondary,
            None,
            None,
            None,
            TimingCoordinator::from_millis(0),
            Arc::new(PipelineMetrics::new()),
            AudioValidator::from_millis(100, 60_000),
            bus.clone(),
            OrchestratorConfig {
                mode: OrchestrationMode::Single,
                preferred: EngineSlot::Primary,
                reconciliation_enabled: false,
                confidence_threshold: 0.7,
                parallel_timeout: Duration::from_secs(10),
            },
        ));

        let controller = DictationController::new(
            bus.clone(),
            Arc::clone(&sessions),
            Arc::clone(&capture) as Arc<dyn CaptureSource>,
            orchestrator,
        );
        (bus, capture, sessions, controller)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn press_release_produces_a_transcription() {
        let (bus, capture, sessions, controller) = controller_fixture();
        let mut completed = bus.subscribe_completed();
        let runner = tokio::spawn(controller.run());

        bus.publish_hotkey(HotkeyEvent::Pressed { at: Instant::now() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.publish_hotkey(HotkeyEvent::Released { at: Instant::now() });

        let event = tokio::time::timeout(Duration::from_secs(2), completed.recv())
            .await
            .expect("completed event")
            .unwrap();
        assert_eq!(event.transcription.text, "typed text");

        assert_eq!(capture.started.load(Ordering::SeqCst), 1);
        assert_eq!(capture.stopped.load(Ordering::SeqCst), 1);
        assert!(!sessions.is_active());

        runner.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancel_between_press_and_release_skips_transcription() {
        let (bus, capture, sessions, controller) = controller_fixture();
        let mut completed = bus.subscribe_completed();
        let runner = tokio::spawn(controller.run());

        bus.publish_hotkey(HotkeyEvent::Pressed { at: Instant::now() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.publish_hotkey(HotkeyEvent::CancelRequested { at: Instant::now() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.publish_hotkey(HotkeyEvent::Released { at: Instant::now() });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(completed.try_recv().is_err(), "no transcription expected");
        assert_eq!(capture.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(capture.stopped.load(Ordering::SeqCst), 0);
        assert!(!sessions.is_active());

        runner.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn release_without_press_is_ignored() {
        let (bus, capture, _, controller) = controller_fixture();
        let runner = tokio::spawn(controller.run());

        bus.publish_hotkey(HotkeyEvent::Released { at: Instant::now() });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(capture.stopped.load(Ordering::SeqCst), 0);
        runner.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn capture_error_cancels_the_active_session() {
        let (bus, capture, sessions, controller) = controller_fixture();
        let runner = tokio::spawn(controller.run());

        bus.publish_hotkey(HotkeyEvent::Pressed { at: Instant::now() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sessions.is_active());

        bus.publish_capture_error(crate::events::CaptureErrorEvent {
            reason: "device unplugged".into(),
            at: Instant::now(),
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!sessions.is_active());
        assert_eq!(capture.cancelled.load(Ordering::SeqCst), 1);
        runner.abort();
    }
}
