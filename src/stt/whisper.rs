//! In-process recognizer backed by `whisper_rs`.
//!
//! [`WhisperBackend`] owns the loaded model context.  Every transcription
//! creates a short-lived `WhisperState` bound to that context — the model
//! weights are read-only after loading, so per-call states are the only shape
//! that is safe to run concurrently.  Confidence is the mean of the decoder's
//! per-token probabilities.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::PcmClip;
use crate::reconcile::tokenize;
use crate::stt::backend::{EngineError, FailKind, RawTranscription, SttBackend};

/// Stable log identifier for this engine.
pub const WHISPER_ENGINE_NAME: &str = "whisper-inproc";

/// Whisper shows diminishing returns past 8 threads.
fn auto_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// WhisperConfig
// ---------------------------------------------------------------------------

/// Settings for the in-process engine.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Path to the GGML model file.
    pub model_path: PathBuf,
    /// ISO-639-1 language code, or `"auto"` for built-in detection.
    pub language: String,
    /// Inference threads; `0` = auto (available parallelism, capped at 8).
    pub threads: i32,
}

impl WhisperConfig {
    fn effective_threads(&self) -> i32 {
        if self.threads > 0 {
            self.threads
        } else {
            auto_threads()
        }
    }
}

// ---------------------------------------------------------------------------
// WhisperBackend
// ---------------------------------------------------------------------------

/// The fast in-process engine.
///
/// `initialize()` loads the model; `close()` drops it.  Transcriptions hold
/// an `Arc` to the context, so a close during an in-flight call lets that
/// call finish against the old model and releases the weights when the last
/// holder drops.
pub struct WhisperBackend {
    config: WhisperConfig,
    ctx: RwLock<Option<Arc<WhisperContext>>>,
    last_tokens: Mutex<Option<Vec<String>>>,
}

impl std::fmt::Debug for WhisperBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperBackend")
            .field("config", &self.config)
            .field("loaded", &self.is_healthy())
            .finish_non_exhaustive()
    }
}

// `WhisperContext` wraps a raw pointer but whisper-rs declares it Send+Sync —
// the model weights are read-only after loading, and each call gets its own
// `WhisperState`.
// SAFETY: WhisperContext is Send+Sync as declared by whisper-rs.
unsafe impl Send for WhisperBackend {}
unsafe impl Sync for WhisperBackend {}

impl WhisperBackend {
    pub fn new(config: WhisperConfig) -> Self {
        Self {
            config,
            ctx: RwLock::new(None),
            last_tokens: Mutex::new(None),
        }
    }

    fn load_context(path: &Path) -> Result<WhisperContext, EngineError> {
        if !path.exists() {
            return Err(EngineError::Init {
                engine: WHISPER_ENGINE_NAME.into(),
                cause: format!("model not found: {}", path.display()),
            });
        }
        let path_str = path.to_str().ok_or_else(|| EngineError::Init {
            engine: WHISPER_ENGINE_NAME.into(),
            cause: format!("model path is not valid UTF-8: {}", path.display()),
        })?;

        WhisperContext::new_with_params(path_str, WhisperContextParameters::default()).map_err(
            |e| EngineError::Init {
                engine: WHISPER_ENGINE_NAME.into(),
                cause: e.to_string(),
            },
        )
    }

    fn current_context(&self) -> Result<Arc<WhisperContext>, EngineError> {
        self.ctx
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| EngineError::NotInitialized {
                engine: WHISPER_ENGINE_NAME.into(),
            })
    }
}

impl SttBackend for WhisperBackend {
    fn engine_name(&self) -> &str {
        WHISPER_ENGINE_NAME
    }

    /// Load the model.  Idempotent: a second call with the model already
    /// loaded is a no-op.
    fn initialize(&self) -> Result<(), EngineError> {
        let mut guard = self.ctx.write().unwrap();
        if guard.is_some() {
            return Ok(());
        }
        let ctx = Self::load_context(&self.config.model_path)?;
        *guard = Some(Arc::new(ctx));
        log::info!(
            "{WHISPER_ENGINE_NAME}: model loaded from {}",
            self.config.model_path.display()
        );
        Ok(())
    }

    fn transcribe(&self, clip: &PcmClip) -> Result<RawTranscription, EngineError> {
        let ctx = self.current_context()?;
        let audio = clip.to_samples();
        let start = Instant::now();

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        let lang: Option<&str> = if self.config.language == "auto" {
            None
        } else {
            Some(self.config.language.as_str())
        };
        params.set_language(lang);
        params.set_n_threads(self.config.effective_threads());
        params.set_print_progress(false);
        params.set_print_realtime(false);

        let fail = |cause: String| {
            EngineError::transcription(
                WHISPER_ENGINE_NAME,
                FailKind::Inference,
                cause,
                start.elapsed().as_millis() as u64,
            )
        };

        let mut state = ctx.create_state().map_err(|e| fail(e.to_string()))?;
        state.full(params, &audio).map_err(|e| fail(e.to_string()))?;

        let n_segments = state.full_n_segments().map_err(|e| fail(e.to_string()))?;

        let mut text = String::new();
        let mut prob_sum = 0.0f64;
        let mut prob_count = 0usize;

        for i in 0..n_segments {
            let seg_text = state
                .full_get_segment_text(i)
                .map_err(|e| fail(format!("segment {i}: {e}")))?;
            text.push_str(&seg_text);

            let n_tokens = state.full_n_tokens(i).map_err(|e| fail(e.to_string()))?;
            for j in 0..n_tokens {
                let p = state
                    .full_get_token_prob(i, j)
                    .map_err(|e| fail(e.to_string()))?;
                prob_sum += p as f64;
                prob_count += 1;
            }
        }

        let text = text.trim().to_owned();
        let confidence = if prob_count == 0 {
            0.0
        } else {
            (prob_sum / prob_count as f64).clamp(0.0, 1.0) as f32
        };

        *self.last_tokens.lock().unwrap() =
            Some(tokenize(&text).into_iter().collect::<Vec<String>>());

        log::debug!(
            "{WHISPER_ENGINE_NAME}: {} segment(s) in {} ms, confidence {confidence:.2}",
            n_segments,
            start.elapsed().as_millis()
        );

        Ok(RawTranscription { text, confidence })
    }

    fn is_healthy(&self) -> bool {
        self.ctx.read().unwrap().is_some()
    }

    /// Drop the model.  Idempotent; safe after a failed `initialize()`.
    fn close(&self) {
        if self.ctx.write().unwrap().take().is_some() {
            log::info!("{WHISPER_ENGINE_NAME}: model released");
        }
        self.last_tokens.lock().unwrap().take();
    }

    fn take_last_tokens(&self) -> Option<Vec<String>> {
        self.last_tokens.lock().unwrap().take()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(path: &str) -> WhisperBackend {
        WhisperBackend::new(WhisperConfig {
            model_path: PathBuf::from(path),
            language: "en".into(),
            threads: 0,
        })
    }

    #[test]
    fn initialize_missing_model_fails() {
        let b = backend("/nonexistent/model.bin");
        let err = b.initialize().unwrap_err();
        assert!(matches!(err, EngineError::Init { .. }));
        assert!(!b.is_healthy());
    }

    #[test]
    fn transcribe_before_initialize_is_not_initialized() {
        let b = backend("/nonexistent/model.bin");
        let clip = PcmClip::from_bytes(vec![0u8; 32_000]);
        let err = b.transcribe(&clip).unwrap_err();
        assert!(matches!(err, EngineError::NotInitialized { .. }));
    }

    #[test]
    fn close_is_idempotent_and_safe_after_failed_init() {
        let b = backend("/nonexistent/model.bin");
        let _ = b.initialize();
        b.close();
        b.close();
        assert!(!b.is_healthy());
    }

    #[test]
    fn auto_threads_is_positive_and_capped() {
        let t = auto_threads();
        assert!((1..=8).contains(&t));
    }

    #[test]
    fn effective_threads_respects_override() {
        let mut cfg = WhisperConfig {
            model_path: PathBuf::new(),
            language: "en".into(),
            threads: 3,
        };
        assert_eq!(cfg.effective_threads(), 3);
        cfg.threads = 0;
        assert!(cfg.effective_threads() >= 1);
    }
}
