//! Typing collaborator — clipboard-based text injection.
//!
//! Raw key-event synthesis mangles non-ASCII text and combining characters,
//! so injection goes through the clipboard instead:
//!
//! 1. **Save** the original clipboard content.
//! 2. **Set** the transcribed text into the clipboard.
//! 3. **Simulate** Ctrl+V (⌘V on macOS) in the focused window.
//! 4. **Restore** the original clipboard content (best-effort, optional).
//!
//! [`TextInjector::run`] subscribes to completed-transcription events and
//! performs the sequence on the blocking pool.  Empty results (failed
//! transcriptions) are suppressed, and injection failures are logged, never
//! propagated — the pipeline does not depend on this collaborator's
//! reliability.

pub mod clipboard;
pub mod keyboard;

pub use clipboard::{restore_clipboard, save_clipboard, set_clipboard};
pub use keyboard::simulate_paste;

use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;

use crate::events::EventBus;

// ---------------------------------------------------------------------------
// InjectError
// ---------------------------------------------------------------------------

/// All errors that can surface during text injection.
#[derive(Debug, Error)]
pub enum InjectError {
    /// Could not open or read the system clipboard.
    #[error("cannot access clipboard: {0}")]
    ClipboardAccess(String),

    /// Could not write text to the system clipboard.
    #[error("cannot set clipboard text: {0}")]
    ClipboardSet(String),

    /// Could not simulate a key press/release event.
    #[error("cannot simulate key press: {0}")]
    KeySimulation(String),
}

// ---------------------------------------------------------------------------
// TextInjector
// ---------------------------------------------------------------------------

/// Delay between clipboard writes and the synthetic paste, giving the OS
/// clipboard time to settle.
const CLIPBOARD_SETTLE: Duration = Duration::from_millis(50);

/// Pastes completed transcriptions into the focused window.
#[derive(Debug, Clone)]
pub struct TextInjector {
    restore_clipboard: bool,
}

impl TextInjector {
    pub fn new(restore_clipboard: bool) -> Self {
        Self { restore_clipboard }
    }

    /// One save → set → paste → restore cycle.  Blocking; call from the
    /// blocking pool.
    pub fn inject(&self, text: &str) -> Result<(), InjectError> {
        let saved = if self.restore_clipboard {
            save_clipboard()?
        } else {
            None
        };

        set_clipboard(text)?;
        std::thread::sleep(CLIPBOARD_SETTLE);
        simulate_paste()?;
        std::thread::sleep(CLIPBOARD_SETTLE);

        if self.restore_clipboard {
            // Best-effort: the text has already been pasted.
            if let Err(e) = restore_clipboard(saved) {
                log::warn!("inject: clipboard restore failed: {e}");
            }
        }
        Ok(())
    }

    /// Consume completed transcriptions until the bus closes.  Spawn as a
    /// task from `main`.
    pub async fn run(self, bus: EventBus) {
        let mut completed = bus.subscribe_completed();
        loop {
            match completed.recv().await {
                Ok(event) => {
                    let text = event.transcription.text;
                    if text.is_empty() {
                        log::debug!("inject: skipping empty transcription");
                        continue;
                    }

                    let injector = self.clone();
                    let joined =
                        tokio::task::spawn_blocking(move || injector.inject(&text)).await;
                    match joined {
                        Ok(Ok(())) => log::debug!("inject: pasted transcription"),
                        Ok(Err(e)) => log::warn!("inject: injection failed: {e}"),
                        Err(e) => log::warn!("inject: task failed: {e}"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("inject: lagged, {skipped} transcription(s) dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
