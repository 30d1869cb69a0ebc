//! Engine identity and result types shared across the transcription stack.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// EngineSlot
// ---------------------------------------------------------------------------

/// Which of the two engine positions a value belongs to.
///
/// The pipeline always runs with exactly two engines; a closed enum means a
/// failure event, a watchdog entry, or a metrics label can only ever name a
/// known engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineSlot {
    /// The fast in-process recognizer.
    Primary,
    /// The external subprocess recognizer.
    Secondary,
}

impl EngineSlot {
    /// Stable lowercase label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            EngineSlot::Primary => "primary",
            EngineSlot::Secondary => "secondary",
        }
    }

    /// The other slot.
    pub fn other(self) -> EngineSlot {
        match self {
            EngineSlot::Primary => EngineSlot::Secondary,
            EngineSlot::Secondary => EngineSlot::Primary,
        }
    }
}

impl std::fmt::Display for EngineSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SourceLabel
// ---------------------------------------------------------------------------

/// Where a published transcription came from: one engine, or the reconciler
/// over both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceLabel {
    Primary,
    Secondary,
    Reconciled,
}

impl SourceLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceLabel::Primary => "primary",
            SourceLabel::Secondary => "secondary",
            SourceLabel::Reconciled => "reconciled",
        }
    }
}

impl From<EngineSlot> for SourceLabel {
    fn from(slot: EngineSlot) -> Self {
        match slot {
            EngineSlot::Primary => SourceLabel::Primary,
            EngineSlot::Secondary => SourceLabel::Secondary,
        }
    }
}

impl std::fmt::Display for SourceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EngineResult
// ---------------------------------------------------------------------------

/// One engine's answer for one clip.
///
/// `text` may be empty — silence and noise are valid inputs, and an empty
/// transcript is a valid answer.  `confidence` is always within `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct EngineResult {
    pub text: String,
    pub confidence: f32,
    pub engine: EngineSlot,
    /// Lower-cased alphabetic tokens, when the engine produced structured
    /// output.
    pub tokens: Option<Vec<String>>,
    /// Raw structured output (JSON mode of the subprocess engine).
    pub raw: Option<serde_json::Value>,
}

impl EngineResult {
    /// Build a result, clamping `confidence` into `[0.0, 1.0]`.
    pub fn new(text: impl Into<String>, confidence: f32, engine: EngineSlot) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            engine,
            tokens: None,
            raw: None,
        }
    }

    /// `true` when the text is empty or whitespace-only.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Transcription
// ---------------------------------------------------------------------------

/// The orchestrator's final answer for one capture, published on the bus.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    pub confidence: f32,
    pub source: SourceLabel,
}

impl Transcription {
    pub fn new(text: impl Into<String>, confidence: f32, source: SourceLabel) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source,
        }
    }

    /// An empty publication: what a failed transcription looks like
    /// downstream.
    pub fn empty(source: SourceLabel) -> Self {
        Self::new("", 0.0, source)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
