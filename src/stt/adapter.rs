//! Async engine surface with per-call admission control.
//!
//! [`EngineAdapter`] wraps a blocking [`SttBackend`] with:
//!
//! - a [`Semaphore`] bounding concurrent calls, with a capped wait for a
//!   permit (`acquire_timeout`);
//! - the `spawn_blocking` bridge onto the shared worker pool;
//! - failure reporting: every init or call failure becomes a
//!   [`FailureEvent`] on the bus for the watchdog.
//!
//! [`TranscribeEngine`] is the seam the orchestrator, parallel service, and
//! watchdog consume — and the seam tests mock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::audio::PcmClip;
use crate::events::{EventBus, FailureEvent, FailureReason};
use crate::stt::backend::{EngineError, FailKind, SttBackend};
use crate::stt::types::{EngineResult, EngineSlot};

// ---------------------------------------------------------------------------
// TranscribeEngine
// ---------------------------------------------------------------------------

/// One engine position in the pipeline: lifecycle, health, and admission-
/// bounded transcription.
#[async_trait]
pub trait TranscribeEngine: Send + Sync {
    /// Which position this engine fills.
    fn slot(&self) -> EngineSlot;

    /// Stable identifier for logs.
    fn engine_name(&self) -> &str;

    /// Fast probe: initialized, not closed, last known state good.
    fn is_healthy(&self) -> bool;

    /// Acquire resources.  Idempotent.
    async fn initialize(&self) -> Result<(), EngineError>;

    /// Transcribe one clip under this engine's admission limit.
    async fn transcribe(&self, clip: PcmClip) -> Result<EngineResult, EngineError>;

    /// Release resources.  Idempotent.
    async fn close(&self);
}

// ---------------------------------------------------------------------------
// EngineAdapter
// ---------------------------------------------------------------------------

/// Production [`TranscribeEngine`] over a blocking backend.
pub struct EngineAdapter {
    slot: EngineSlot,
    backend: Arc<dyn SttBackend>,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
    bus: EventBus,
}

impl EngineAdapter {
    /// `max_concurrent` is this engine's admission capacity;
    /// `acquire_timeout` caps how long a call waits for a permit before
    /// failing with `concurrency_limit`.
    pub fn new(
        slot: EngineSlot,
        backend: Arc<dyn SttBackend>,
        max_concurrent: usize,
        acquire_timeout: Duration,
        bus: EventBus,
    ) -> Self {
        Self {
            slot,
            backend,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            acquire_timeout,
            bus,
        }
    }

    fn report_failure(&self, error: &EngineError) {
        let reason = match error {
            EngineError::Init { .. } => FailureReason::InitFailed,
            EngineError::NotInitialized { .. } => FailureReason::CallFailed,
            EngineError::Transcription { kind, .. } => match kind {
                FailKind::ConcurrencyLimit => FailureReason::ConcurrencyLimit,
                FailKind::Timeout => FailureReason::Timeout,
                _ => FailureReason::CallFailed,
            },
        };

        let mut event = FailureEvent::new(self.slot, reason, error.to_string());
        if let EngineError::Transcription {
            duration_ms,
            exit_code,
            ..
        } = error
        {
            event = event.with_context("duration_ms", duration_ms.to_string());
            if let Some(code) = exit_code {
                event = event.with_context("exit_code", code.to_string());
            }
        }
        self.bus.publish_failure(event);
    }
}

#[async_trait]
impl TranscribeEngine for EngineAdapter {
    fn slot(&self) -> EngineSlot {
        self.slot
    }

    fn engine_name(&self) -> &str {
        self.backend.engine_name()
    }

    fn is_healthy(&self) -> bool {
        self.backend.is_healthy()
    }

    async fn initialize(&self) -> Result<(), EngineError> {
        let name = self.engine_name().to_owned();
        let backend = Arc::clone(&self.backend);
        let result = tokio::task::spawn_blocking(move || backend.initialize())
            .await
            .unwrap_or_else(|e| {
                Err(EngineError::Init {
                    engine: name,
                    cause: format!("initialize task failed: {e}"),
                })
            });
        if let Err(ref e) = result {
            self.report_failure(e);
        }
        result
    }

    async fn transcribe(&self, clip: PcmClip) -> Result<EngineResult, EngineError> {
        let start = Instant::now();

        // Admission: wait up to `acquire_timeout` for a permit.
        let permit = match timeout(
            self.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            // The semaphore is never closed; treat both arms as saturation.
            Ok(Err(_)) | Err(_) => {
                let error = EngineError::transcription(
                    self.engine_name(),
                    FailKind::ConcurrencyLimit,
                    format!(
                        "no admission permit within {} ms",
                        self.acquire_timeout.as_millis()
                    ),
                    start.elapsed().as_millis() as u64,
                );
                self.report_failure(&error);
                return Err(error);
            }
        };

        let backend = Arc::clone(&self.backend);
        let joined = tokio::task::spawn_blocking(move || {
            // The permit lives exactly as long as the blocking call.
            let _permit = permit;
            backend.transcribe(&clip)
        })
        .await;

        let result = match joined {
            Ok(Ok(raw)) => {
                let mut result = EngineResult::new(raw.text, raw.confidence, self.slot);
                result.tokens = self.backend.take_last_tokens();
                result.raw = self.backend.take_last_raw();
                Ok(result)
            }
            Ok(Err(e)) => Err(e),
            Err(join_err) => Err(EngineError::transcription(
                self.engine_name(),
                FailKind::Inference,
                format!("transcription task failed: {join_err}"),
                start.elapsed().as_millis() as u64,
            )),
        };

        if let Err(ref e) = result {
            self.report_failure(e);
        }
        result
    }

    async fn close(&self) {
        let backend = Arc::clone(&self.backend);
        let _ = tokio::task::spawn_blocking(move || backend.close()).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
