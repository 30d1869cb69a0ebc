//! Dual-engine fan-out under one wall-clock deadline.
//!
//! [`ParallelTranscriber`] validates the clip once, submits both engines as
//! tasks on the shared worker pool, and awaits both against a single
//! deadline.  The returned pair always keeps engine positions — primary in
//! the left slot, secondary in the right — regardless of completion order.
//! A late engine's task is aborted and its result discarded; it can never
//! leak into a later call because every call owns fresh tasks.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use crate::audio::{AudioError, AudioValidator, PcmClip};
use crate::stt::adapter::TranscribeEngine;
use crate::stt::backend::EngineError;
use crate::stt::types::EngineResult;

// ---------------------------------------------------------------------------
// ParallelError
// ---------------------------------------------------------------------------

/// Aggregate failures: per-engine errors alone do not fail the pair.
#[derive(Debug, Error)]
pub enum ParallelError {
    /// The clip failed validation; no engine work was performed.
    #[error(transparent)]
    InvalidAudio(#[from] AudioError),

    /// Both engines were still running when the deadline expired.
    #[error("both engines missed the {limit_ms} ms deadline (elapsed {elapsed_ms} ms)")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },

    /// Neither engine produced a result before the deadline.
    #[error("both engines failed")]
    BothFailed,
}

/// How one engine's task ended.
enum SlotOutcome {
    Done(EngineResult),
    Failed,
    Late,
}

// ---------------------------------------------------------------------------
// ParallelTranscriber
// ---------------------------------------------------------------------------

/// Fans one clip out to both engines.
pub struct ParallelTranscriber {
    primary: Arc<dyn TranscribeEngine>,
    secondary: Arc<dyn TranscribeEngine>,
    validator: AudioValidator,
    default_timeout: Duration,
}

impl ParallelTranscriber {
    pub fn new(
        primary: Arc<dyn TranscribeEngine>,
        secondary: Arc<dyn TranscribeEngine>,
        validator: AudioValidator,
        default_timeout: Duration,
    ) -> Self {
        Self {
            primary,
            secondary,
            validator,
            default_timeout,
        }
    }

    /// Validate once, then transcribe on both engines.
    ///
    /// The effective deadline is `min(timeout, service default)`.  Either
    /// side of the returned pair may be `None` (that engine failed or missed
    /// the deadline); both-`None` outcomes surface as errors instead.
    pub async fn transcribe_both(
        &self,
        clip: PcmClip,
        timeout: Duration,
    ) -> Result<(Option<EngineResult>, Option<EngineResult>), ParallelError> {
        self.validator.validate(&clip)?;
        self.transcribe_both_prevalidated(clip, timeout).await
    }

    /// Fan-out without re-validating — for callers that already ran the
    /// validator on this clip (the smart-upgrade path).
    pub async fn transcribe_both_prevalidated(
        &self,
        clip: PcmClip,
        timeout: Duration,
    ) -> Result<(Option<EngineResult>, Option<EngineResult>), ParallelError> {
        let limit = timeout.min(self.default_timeout);
        let start = Instant::now();
        let deadline = start + limit;

        let mut primary_task = spawn_engine(&self.primary, clip.clone());
        let mut secondary_task = spawn_engine(&self.secondary, clip);

        // Both tasks are already running; awaiting one does not delay the
        // other, and both share the same absolute deadline.
        let primary_outcome = await_slot(&mut primary_task, deadline).await;
        let secondary_outcome = await_slot(&mut secondary_task, deadline).await;

        match (primary_outcome, secondary_outcome) {
            (SlotOutcome::Late, SlotOutcome::Late) => Err(ParallelError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
                limit_ms: limit.as_millis() as u64,
            }),
            (SlotOutcome::Done(p), SlotOutcome::Done(s)) => Ok((Some(p), Some(s))),
            (SlotOutcome::Done(p), _) => Ok((Some(p), None)),
            (_, SlotOutcome::Done(s)) => Ok((None, Some(s))),
            // Failed/Failed, Failed/Late, Late/Failed: nothing to return.
            _ => Err(ParallelError::BothFailed),
        }
    }
}

fn spawn_engine(
    engine: &Arc<dyn TranscribeEngine>,
    clip: PcmClip,
) -> JoinHandle<Result<EngineResult, EngineError>> {
    let engine = Arc::clone(engine);
    tokio::spawn(async move { engine.transcribe(clip).await })
}

async fn await_slot(
    task: &mut JoinHandle<Result<EngineResult, EngineError>>,
    deadline: Instant,
) -> SlotOutcome {
    match timeout_at(deadline, &mut *task).await {
        Ok(Ok(Ok(result))) => SlotOutcome::Done(result),
        // Engine error: the adapter already published the FailureEvent.
        Ok(Ok(Err(_))) => SlotOutcome::Failed,
        // Task panicked or was cancelled.
        Ok(Err(_)) => SlotOutcome::Failed,
        Err(_) => {
            // Deadline expired with the engine still running; drop its
            // output on the floor.
            task.abort();
            SlotOutcome::Late
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
