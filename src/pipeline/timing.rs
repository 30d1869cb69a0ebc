//! Paragraph-break timing.
//!
//! Dictated utterances that arrive close together belong to the same
//! paragraph; a long pause means the user started a new thought.
//! [`TimingCoordinator`] tracks the wall-clock time of the last completed
//! transcription and tells the orchestrator when to prepend a newline.

use std::sync::Mutex;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// TimingCoordinator
// ---------------------------------------------------------------------------

/// Inter-utterance silence tracker.  A `silence_gap` of zero disables
/// paragraph breaks entirely.
#[derive(Debug)]
pub struct TimingCoordinator {
    last_completed: Mutex<Option<Instant>>,
    silence_gap: Duration,
}

impl TimingCoordinator {
    pub fn new(silence_gap: Duration) -> Self {
        Self {
            last_completed: Mutex::new(None),
            silence_gap,
        }
    }

    pub fn from_millis(silence_gap_ms: u64) -> Self {
        Self::new(Duration::from_millis(silence_gap_ms))
    }

    /// `true` iff a previous transcription exists and more than the silence
    /// gap has elapsed since it completed.
    pub fn should_add_paragraph_break(&self) -> bool {
        if self.silence_gap.is_zero() {
            return false;
        }
        self.last_completed
            .lock()
            .unwrap()
            .is_some_and(|last| last.elapsed() > self.silence_gap)
    }

    /// Stamp now as the completion time of the latest transcription.
    pub fn record_transcription(&self) {
        *self.last_completed.lock().unwrap() = Some(Instant::now());
    }

    /// Forget the previous transcription entirely.
    pub fn reset(&self) {
        *self.last_completed.lock().unwrap() = None;
    }
}

/// Prepend a single paragraph break, without doubling an existing one.
pub fn with_paragraph_break(text: &str) -> String {
    if text.starts_with('\n') {
        text.to_owned()
    } else {
        format!("\n{text}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
