//! Application settings structs, defaults and TOML persistence.
//!
//! One struct per `settings.toml` section.  All of them implement
//! `Serialize`, `Deserialize`, `Default` and `Clone` so the file round-trips
//! losslessly and a missing file falls back to defaults.
//!
//! The `*_config()` helpers at the bottom translate the serialized settings
//! into the runtime configuration types the components take.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::audio::AudioValidator;
use crate::pipeline::{OrchestrationMode, OrchestratorConfig};
use crate::reconcile::{ReconcileStrategy, Reconciler};
use crate::stt::{EngineSlot, OutputMode, RecognizerConfig, WhisperConfig};
use crate::watchdog::WatchdogConfig;

use super::AppPaths;

// ---------------------------------------------------------------------------
// OrchestrationSettings
// ---------------------------------------------------------------------------

/// Execution-strategy selection and result routing.
///
/// | Mode   | Behaviour |
/// |--------|-----------|
/// | single | one engine per clip |
/// | smart  | one engine; low primary confidence upgrades to dual |
/// | dual   | both engines + reconciler on every clip |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationSettings {
    /// Execution strategy.
    pub mode: OrchestrationMode,
    /// Engine preferred in single/smart mode.
    pub primary_engine: EngineSlot,
    /// Pause length after which a paragraph break is inserted; 0 disables.
    pub silence_gap_ms: u64,
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            mode: OrchestrationMode::Smart,
            primary_engine: EngineSlot::Primary,
            silence_gap_ms: 1_000,
        }
    }
}

// ---------------------------------------------------------------------------
// ReconciliationSettings
// ---------------------------------------------------------------------------

/// Dual-result merging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationSettings {
    /// Master switch; `false` forces single-engine mode.
    pub enabled: bool,
    /// Which merge algorithm runs.
    pub strategy: ReconcileStrategy,
    /// Overlap strategy: below this similarity both results are distrusted
    /// and the longer text wins.
    pub overlap_threshold: f32,
    /// Smart mode: primary confidence below this triggers the dual upgrade.
    pub confidence_threshold: f32,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: ReconcileStrategy::Simple,
            overlap_threshold: 0.6,
            confidence_threshold: 0.7,
        }
    }
}

// ---------------------------------------------------------------------------
// ParallelSettings
// ---------------------------------------------------------------------------

/// Dual-transcription deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelSettings {
    /// Wall-clock limit for both engines together.
    pub timeout_ms: u64,
}

impl Default for ParallelSettings {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

// ---------------------------------------------------------------------------
// ConcurrencySettings
// ---------------------------------------------------------------------------

/// Per-engine admission permits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencySettings {
    /// Concurrent calls allowed into the in-process engine.
    pub primary_max: usize,
    /// Concurrent recognizer subprocesses.
    pub secondary_max: usize,
    /// How long a call waits for a permit before failing.
    pub acquire_timeout_ms: u64,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self {
            primary_max: 4,
            secondary_max: 2,
            acquire_timeout_ms: 1_000,
        }
    }
}

// ---------------------------------------------------------------------------
// WatchdogSettings
// ---------------------------------------------------------------------------

/// Engine failure supervision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogSettings {
    pub enabled: bool,
    /// Sliding window over which failures are counted.
    pub window_minutes: u64,
    /// Restarts allowed inside the window before the engine is disabled.
    pub max_restarts_per_window: u32,
    /// Disabled duration after the budget is exhausted.
    pub cooldown_minutes: u64,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window_minutes: 60,
            max_restarts_per_window: 3,
            cooldown_minutes: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioSettings
// ---------------------------------------------------------------------------

/// Capture device and clip acceptance bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Clips shorter than this are rejected before any engine work.
    pub min_duration_ms: u64,
    /// Clips longer than this are rejected.
    pub max_duration_ms: u64,
    /// Input device name; empty = system default.
    pub device: String,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            min_duration_ms: 500,
            max_duration_ms: 60_000,
            device: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// WhisperSettings  (primary engine)
// ---------------------------------------------------------------------------

/// In-process engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperSettings {
    /// GGML model file.
    pub model_path: PathBuf,
    /// ISO-639-1 code, or `"auto"`.
    pub language: String,
    /// Inference threads; 0 = auto.
    pub threads: i32,
}

impl Default for WhisperSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            language: "en".into(),
            threads: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// SubprocessSettings  (secondary engine)
// ---------------------------------------------------------------------------

/// External recognizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubprocessSettings {
    /// Recognizer binary.
    pub binary_path: PathBuf,
    /// Model file handed to the binary.
    pub model_path: PathBuf,
    pub language: String,
    /// `text` or `json` stdout format.
    pub output_mode: OutputMode,
    /// Hard per-call deadline.
    pub timeout_seconds: u64,
    /// Worker threads handed to the binary.
    pub threads: u32,
    /// Stdout accumulation cap in bytes.
    pub max_stdout_bytes: usize,
    /// Stderr accumulation cap in bytes.
    pub max_stderr_bytes: usize,
}

impl Default for SubprocessSettings {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::new(),
            model_path: PathBuf::new(),
            language: "en".into(),
            output_mode: OutputMode::Text,
            timeout_seconds: 10,
            threads: 4,
            max_stdout_bytes: 1_048_576,
            max_stderr_bytes: 262_144,
        }
    }
}

// ---------------------------------------------------------------------------
// HotkeyConfig
// ---------------------------------------------------------------------------

/// Global hotkey bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotkeyConfig {
    /// Push-to-talk key name (e.g. `"F9"`).
    pub push_to_talk_key: String,
    /// Key that aborts an in-flight capture (e.g. `"Escape"`).
    pub cancel_key: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            push_to_talk_key: "F9".into(),
            cancel_key: "Escape".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// InjectConfig
// ---------------------------------------------------------------------------

/// Typing collaborator behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectConfig {
    /// Whether completed transcriptions are typed at all.
    pub enabled: bool,
    /// Restore the previous clipboard content after pasting.
    pub restore_clipboard: bool,
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            restore_clipboard: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub orchestration: OrchestrationSettings,
    pub reconciliation: ReconciliationSettings,
    pub parallel: ParallelSettings,
    pub concurrency: ConcurrencySettings,
    pub watchdog: WatchdogSettings,
    pub audio: AudioSettings,
    pub whisper: WhisperSettings,
    pub subprocess: SubprocessSettings,
    pub hotkey: HotkeyConfig,
    pub inject: InjectConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet,
    /// so callers never special-case the first run.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to the platform-appropriate `settings.toml`, creating parent
    /// directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // -- runtime config views -----------------------------------------------

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            mode: self.orchestration.mode,
            preferred: self.orchestration.primary_engine,
            reconciliation_enabled: self.reconciliation.enabled,
            confidence_threshold: self.reconciliation.confidence_threshold,
            parallel_timeout: Duration::from_millis(self.parallel.timeout_ms),
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.reconciliation.strategy,
            self.reconciliation.overlap_threshold,
        )
    }

    pub fn watchdog_config(&self) -> WatchdogConfig {
        WatchdogConfig::from_minutes(
            self.watchdog.window_minutes,
            self.watchdog.max_restarts_per_window,
            self.watchdog.cooldown_minutes,
        )
    }

    pub fn validator(&self) -> AudioValidator {
        AudioValidator::from_millis(self.audio.min_duration_ms, self.audio.max_duration_ms)
    }

    pub fn whisper_config(&self) -> WhisperConfig {
        WhisperConfig {
            model_path: self.whisper.model_path.clone(),
            language: self.whisper.language.clone(),
            threads: self.whisper.threads,
        }
    }

    pub fn recognizer_config(&self) -> RecognizerConfig {
        RecognizerConfig {
            binary_path: self.subprocess.binary_path.clone(),
            model_path: self.subprocess.model_path.clone(),
            language: self.subprocess.language.clone(),
            output_mode: self.subprocess.output_mode,
            timeout: Duration::from_secs(self.subprocess.timeout_seconds),
            threads: self.subprocess.threads,
            max_stdout_bytes: self.subprocess.max_stdout_bytes,
            max_stderr_bytes: self.subprocess.max_stderr_bytes,
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.concurrency.acquire_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
