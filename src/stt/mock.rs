//! Scriptable [`TranscribeEngine`] double for pipeline tests.
//!
//! Behaviors are queued per call; when the queue is empty the default
//! behavior repeats.  No model files, no subprocesses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::audio::PcmClip;
use crate::stt::adapter::TranscribeEngine;
use crate::stt::backend::{EngineError, FailKind};
use crate::stt::types::{EngineResult, EngineSlot};

/// What one `transcribe` call should do.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Sleep `delay`, then answer with `text`/`confidence`.
    Ok {
        text: String,
        confidence: f32,
        delay: Duration,
    },
    /// Sleep `delay`, then fail with `kind`.
    Fail { kind: FailKind, delay: Duration },
}

impl MockBehavior {
    pub fn ok(text: &str, confidence: f32) -> Self {
        MockBehavior::Ok {
            text: text.into(),
            confidence,
            delay: Duration::ZERO,
        }
    }

    pub fn ok_after(text: &str, confidence: f32, delay: Duration) -> Self {
        MockBehavior::Ok {
            text: text.into(),
            confidence,
            delay,
        }
    }

    pub fn fail() -> Self {
        MockBehavior::Fail {
            kind: FailKind::Inference,
            delay: Duration::ZERO,
        }
    }
}

/// Scriptable engine double.
pub struct MockEngine {
    slot: EngineSlot,
    healthy: AtomicBool,
    default: MockBehavior,
    script: Mutex<VecDeque<MockBehavior>>,
    /// `initialize` fails while this is non-zero (each failure decrements).
    failing_inits: AtomicUsize,
    pub transcribe_calls: AtomicUsize,
    pub init_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
}

impl MockEngine {
    pub fn new(slot: EngineSlot, default: MockBehavior) -> Self {
        Self {
            slot,
            healthy: AtomicBool::new(true),
            default,
            script: Mutex::new(VecDeque::new()),
            failing_inits: AtomicUsize::new(0),
            transcribe_calls: AtomicUsize::new(0),
            init_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Always answers `text` with `confidence`, immediately.
    pub fn ok(slot: EngineSlot, text: &str, confidence: f32) -> Self {
        Self::new(slot, MockBehavior::ok(text, confidence))
    }

    /// Always answers after `delay`.
    pub fn ok_after(slot: EngineSlot, text: &str, confidence: f32, delay: Duration) -> Self {
        Self::new(slot, MockBehavior::ok_after(text, confidence, delay))
    }

    /// Always fails.
    pub fn failing(slot: EngineSlot) -> Self {
        Self::new(slot, MockBehavior::fail())
    }

    /// Queue a one-shot behavior ahead of the default.
    pub fn queue(&self, behavior: MockBehavior) {
        self.script.lock().unwrap().push_back(behavior);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Make the next `n` `initialize` calls fail.
    pub fn fail_next_inits(&self, n: usize) {
        self.failing_inits.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl TranscribeEngine for MockEngine {
    fn slot(&self) -> EngineSlot {
        self.slot
    }

    fn engine_name(&self) -> &str {
        match self.slot {
            EngineSlot::Primary => "mock-primary",
            EngineSlot::Secondary => "mock-secondary",
        }
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> Result<(), EngineError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_inits.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_inits.store(remaining - 1, Ordering::SeqCst);
            self.healthy.store(false, Ordering::SeqCst);
            return Err(EngineError::Init {
                engine: self.engine_name().into(),
                cause: "scripted init failure".into(),
            });
        }
        self.healthy.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn transcribe(&self, _clip: PcmClip) -> Result<EngineResult, EngineError> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());

        match behavior {
            MockBehavior::Ok {
                text,
                confidence,
                delay,
            } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(EngineResult::new(text, confidence, self.slot))
            }
            MockBehavior::Fail { kind, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Err(EngineError::transcription(
                    self.engine_name(),
                    kind,
                    "scripted failure",
                    delay.as_millis() as u64,
                ))
            }
        }
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.healthy.store(false, Ordering::SeqCst);
    }
}
