//! Reconciliation: deriving one text from two candidate engine results.
//!
//! All strategies are pure functions over `(primary, secondary)` where at
//! least one side is present.  When only one side is present it is returned
//! unchanged; the orchestrator decides what label the outgoing transcription
//! carries.
//!
//! | Strategy   | Picks |
//! |------------|-------|
//! | simple     | primary, unless its text is blank |
//! | confidence | the higher-confidence result |
//! | overlap    | the result whose token set covers more of the union |

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::stt::EngineResult;

// ---------------------------------------------------------------------------
// ReconcileStrategy
// ---------------------------------------------------------------------------

/// Named reconciler algorithm, selectable from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileStrategy {
    Simple,
    Confidence,
    Overlap,
}

impl ReconcileStrategy {
    /// Stable lowercase label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ReconcileStrategy::Simple => "simple",
            ReconcileStrategy::Confidence => "confidence",
            ReconcileStrategy::Overlap => "overlap",
        }
    }
}

impl std::fmt::Display for ReconcileStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// A configured strategy plus its tuning knobs.  Stateless and `Copy`-cheap;
/// `reconcile` has no side effects.
#[derive(Debug, Clone)]
pub struct Reconciler {
    strategy: ReconcileStrategy,
    overlap_threshold: f32,
}

impl Reconciler {
    pub fn new(strategy: ReconcileStrategy, overlap_threshold: f32) -> Self {
        Self {
            strategy,
            overlap_threshold: overlap_threshold.clamp(0.0, 1.0),
        }
    }

    pub fn strategy(&self) -> ReconcileStrategy {
        self.strategy
    }

    /// Merge two candidate results into one.
    ///
    /// Returns `None` only when both inputs are absent, which the callers
    /// never allow to happen.
    pub fn reconcile(
        &self,
        primary: Option<&EngineResult>,
        secondary: Option<&EngineResult>,
    ) -> Option<EngineResult> {
        match (primary, secondary) {
            (None, None) => None,
            (Some(p), None) => Some(p.clone()),
            (None, Some(s)) => Some(s.clone()),
            (Some(p), Some(s)) => Some(match self.strategy {
                ReconcileStrategy::Simple => simple(p, s),
                ReconcileStrategy::Confidence => confidence(p, s),
                ReconcileStrategy::Overlap => overlap(p, s, self.overlap_threshold),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Primary preference: secondary only gets a say when primary is blank.
fn simple(primary: &EngineResult, secondary: &EngineResult) -> EngineResult {
    if !primary.is_blank() {
        primary.clone()
    } else if !secondary.is_blank() {
        secondary.clone()
    } else {
        primary.clone()
    }
}

/// Higher confidence wins; ties prefer non-empty text, then primary.
fn confidence(primary: &EngineResult, secondary: &EngineResult) -> EngineResult {
    if primary.confidence > secondary.confidence {
        primary.clone()
    } else if secondary.confidence > primary.confidence {
        secondary.clone()
    } else if !primary.is_blank() {
        primary.clone()
    } else if !secondary.is_blank() {
        secondary.clone()
    } else {
        primary.clone()
    }
}

/// Token-set similarity against the union of both token sets.
///
/// With `A` and `B` the two token sets and `U = A ∪ B`, each side scores
/// `|side| / |U|`.  Below-threshold agreement falls back to the longer text.
/// All ties break toward primary.
fn overlap(primary: &EngineResult, secondary: &EngineResult, threshold: f32) -> EngineResult {
    let a = tokenize(&primary.text);
    let b = tokenize(&secondary.text);
    let union: BTreeSet<&str> = a.union(&b).map(String::as_str).collect();

    if union.is_empty() {
        return longer_of(primary, secondary);
    }

    let sim_a = a.len() as f32 / union.len() as f32;
    let sim_b = b.len() as f32 / union.len() as f32;

    if sim_a < threshold && sim_b < threshold {
        return longer_of(primary, secondary);
    }

    if sim_a >= sim_b {
        primary.clone()
    } else {
        secondary.clone()
    }
}

fn longer_of(primary: &EngineResult, secondary: &EngineResult) -> EngineResult {
    if secondary.text.len() > primary.text.len() {
        secondary.clone()
    } else {
        primary.clone()
    }
}

/// Lower-cased alphabetic runs.  "The quick-brown fox!" → {the, quick, brown, fox}.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
