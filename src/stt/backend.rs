//! The blocking recognition capability and its error taxonomy.
//!
//! [`SttBackend`] is the seam between the pipeline and the two opaque
//! recognizers.  It is object-safe and `Send + Sync` so a backend can be held
//! behind an `Arc<dyn SttBackend>` and driven from the blocking thread pool.
//!
//! Lifecycle contract:
//!
//! - `initialize()` is idempotent and must succeed before `transcribe()`.
//! - `close()` is idempotent, releases everything on every exit path, and is
//!   safe after a failed `initialize()`.
//! - `initialize()`/`close()` are mutually exclusive with in-flight
//!   transcriptions; concurrency across `transcribe()` calls is bounded by
//!   the adapter's admission permits, not by the backend.

use thiserror::Error;

use crate::audio::PcmClip;

// ---------------------------------------------------------------------------
// FailKind
// ---------------------------------------------------------------------------

/// Sub-reason of a per-call transcription failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailKind {
    /// The call exceeded its deadline (subprocess hard timeout, or the
    /// parallel service's wall clock).
    Timeout,
    /// The external recognizer exited with a non-zero status.
    NonZeroExit,
    /// File or pipe I/O failed (temp WAV, stdout/stderr, spawn).
    Io,
    /// No admission permit became available within `acquire_timeout_ms`.
    ConcurrencyLimit,
    /// The engine's output could not be parsed.
    Parse,
    /// The recognizer itself reported an inference failure.
    Inference,
}

impl FailKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailKind::Timeout => "timeout",
            FailKind::NonZeroExit => "non_zero_exit",
            FailKind::Io => "io_failure",
            FailKind::ConcurrencyLimit => "concurrency_limit",
            FailKind::Parse => "parse_error",
            FailKind::Inference => "inference_error",
        }
    }
}

impl std::fmt::Display for FailKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Everything that can go wrong inside an engine, tagged rather than thrown:
/// the orchestrator branches on these, it never unwinds.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Initialization failed; the engine stays unhealthy until the watchdog
    /// restarts it.
    #[error("engine {engine} failed to initialize: {cause}")]
    Init { engine: String, cause: String },

    /// A single transcription call failed.
    #[error("engine {engine} transcription failed ({kind}): {cause}")]
    Transcription {
        engine: String,
        kind: FailKind,
        cause: String,
        duration_ms: u64,
        /// Exit code of the external recognizer, when one exists.
        exit_code: Option<i32>,
        /// Up to 2 KB of the recognizer's stderr.
        stderr_snippet: Option<String>,
    },

    /// The engine was asked to transcribe before `initialize()` succeeded or
    /// after `close()`.
    #[error("engine {engine} is not initialized")]
    NotInitialized { engine: String },
}

impl EngineError {
    /// Shorthand for a transcription failure without process details.
    pub fn transcription(
        engine: impl Into<String>,
        kind: FailKind,
        cause: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        EngineError::Transcription {
            engine: engine.into(),
            kind,
            cause: cause.into(),
            duration_ms,
            exit_code: None,
            stderr_snippet: None,
        }
    }

    /// The failure sub-reason, when this is a per-call failure.
    pub fn fail_kind(&self) -> Option<FailKind> {
        match self {
            EngineError::Transcription { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// RawTranscription
// ---------------------------------------------------------------------------

/// A backend's unlabelled answer: the adapter stamps the engine slot on it.
#[derive(Debug, Clone, Default)]
pub struct RawTranscription {
    /// Transcript text; empty is valid (silence/noise).
    pub text: String,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f32,
}

// ---------------------------------------------------------------------------
// SttBackend
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe recognition capability.
///
/// Implementations must tolerate concurrent `transcribe()` calls up to the
/// admission limit their adapter enforces.
pub trait SttBackend: Send + Sync {
    /// Stable identifier for logs ("whisper-inproc", "whisper-cli").
    fn engine_name(&self) -> &str;

    /// Acquire native/process prerequisites.  Idempotent.
    fn initialize(&self) -> Result<(), EngineError>;

    /// Transcribe one clip.  Blocking; runs on the blocking thread pool.
    fn transcribe(&self, clip: &PcmClip) -> Result<RawTranscription, EngineError>;

    /// Fast liveness probe: initialized, not closed, last known state good.
    fn is_healthy(&self) -> bool;

    /// Release all resources.  Idempotent; safe after a failed initialize.
    fn close(&self);

    /// Tokens from the most recent successful `transcribe()` that produced
    /// structured output.  Single-shot: consuming clears the cache.
    fn take_last_tokens(&self) -> Option<Vec<String>> {
        None
    }

    /// Raw structured output from the most recent successful `transcribe()`.
    /// Single-shot: consuming clears the cache.
    fn take_last_raw(&self) -> Option<serde_json::Value> {
        None
    }
}

// Compile-time assertion: Box<dyn SttBackend> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SttBackend>) {}
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
