//! Speech-to-text engines and their orchestration plumbing.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │        TranscribeEngine (async trait, one per slot)        │
//! │                                                            │
//! │   EngineAdapter ── admission permits, failure events       │
//! │        │                                                   │
//! │        ▼ spawn_blocking                                    │
//! │   SttBackend (blocking trait)                              │
//! │     ├── WhisperBackend     in-process model  (primary)     │
//! │     └── SubprocessBackend  external binary   (secondary)   │
//! │                                                            │
//! │   ParallelTranscriber ── both slots, one deadline          │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The blocking [`SttBackend`] is the opaque recognition capability; the
//! async [`TranscribeEngine`] is what the pipeline actually holds.  Engines
//! are addressed by [`EngineSlot`]; a published result carries a
//! [`SourceLabel`] ("primary", "secondary", or "reconciled").

pub mod adapter;
pub mod backend;
pub mod parallel;
pub mod subprocess;
pub mod types;
pub mod whisper;

#[cfg(test)]
pub mod mock;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use adapter::{EngineAdapter, TranscribeEngine};
pub use backend::{EngineError, FailKind, RawTranscription, SttBackend};
pub use parallel::{ParallelError, ParallelTranscriber};
pub use subprocess::{OutputMode, RecognizerConfig, SubprocessBackend, SUBPROCESS_ENGINE_NAME};
pub use types::{EngineResult, EngineSlot, SourceLabel, Transcription};
pub use whisper::{WhisperBackend, WhisperConfig, WHISPER_ENGINE_NAME};
