//! Push-to-talk pipeline: sessions, timing, policy, and the event loop.
//!
//! # Architecture
//!
//! ```text
//! HotkeyEvent (bus)
//!        │
//!        ▼
//! DictationController::run()  ← async tokio task
//!        │
//!        ├─ Pressed  → CaptureStateMachine::start_capture, mic session opens
//!        │
//!        └─ Released
//!              │
//!              ├─ stop_capture → CaptureSource::read_all → PcmClip
//!              └─ spawn(TranscriptionOrchestrator::transcribe)
//!                    │
//!                    ├─ single: one engine
//!                    ├─ smart:  one engine, dual on low confidence
//!                    └─ dual:   ParallelTranscriber + Reconciler
//!                    │
//!                    └─ TranscriptionCompletedEvent (bus) → text injection
//! ```
//!
//! [`TimingCoordinator`] decides when a pause between utterances becomes a
//! paragraph break in the published text.

pub mod controller;
pub mod orchestrator;
pub mod session;
pub mod timing;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use controller::DictationController;
pub use orchestrator::{OrchestrationMode, OrchestratorConfig, TranscriptionOrchestrator};
pub use session::{CaptureStateMachine, SessionId};
pub use timing::TimingCoordinator;
