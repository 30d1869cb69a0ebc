//! Pipeline counters and timers.
//!
//! [`PipelineMetrics`] is a fixed-cardinality, lock-free counter block: every
//! label is a closed enum, every slot an atomic.  It never stores transcribed
//! text.  Readers take a [`MetricsSnapshot`] for logging and assertions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::reconcile::ReconcileStrategy;
use crate::stt::{EngineSlot, SourceLabel};

// ---------------------------------------------------------------------------
// FailureLabel
// ---------------------------------------------------------------------------

/// Reason label on `engine.failure_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureLabel {
    TranscriptionError,
    UnexpectedError,
    ConcurrencyLimit,
    Timeout,
    InitFailure,
    WatchdogCooldown,
}

impl FailureLabel {
    pub const ALL: [FailureLabel; 6] = [
        FailureLabel::TranscriptionError,
        FailureLabel::UnexpectedError,
        FailureLabel::ConcurrencyLimit,
        FailureLabel::Timeout,
        FailureLabel::InitFailure,
        FailureLabel::WatchdogCooldown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FailureLabel::TranscriptionError => "transcription_error",
            FailureLabel::UnexpectedError => "unexpected_error",
            FailureLabel::ConcurrencyLimit => "concurrency_limit",
            FailureLabel::Timeout => "timeout",
            FailureLabel::InitFailure => "init_failure",
            FailureLabel::WatchdogCooldown => "watchdog_cooldown",
        }
    }

    fn index(self) -> usize {
        match self {
            FailureLabel::TranscriptionError => 0,
            FailureLabel::UnexpectedError => 1,
            FailureLabel::ConcurrencyLimit => 2,
            FailureLabel::Timeout => 3,
            FailureLabel::InitFailure => 4,
            FailureLabel::WatchdogCooldown => 5,
        }
    }
}

fn source_index(label: SourceLabel) -> usize {
    match label {
        SourceLabel::Primary => 0,
        SourceLabel::Secondary => 1,
        SourceLabel::Reconciled => 2,
    }
}

fn slot_index(slot: EngineSlot) -> usize {
    match slot {
        EngineSlot::Primary => 0,
        EngineSlot::Secondary => 1,
    }
}

fn strategy_index(strategy: ReconcileStrategy) -> usize {
    match strategy {
        ReconcileStrategy::Simple => 0,
        ReconcileStrategy::Confidence => 1,
        ReconcileStrategy::Overlap => 2,
    }
}

// ---------------------------------------------------------------------------
// PipelineMetrics
// ---------------------------------------------------------------------------

/// Counters/timers for the transcription pipeline.
///
/// - `engine.success_total{engine}` / `engine.latency{engine}` (ns)
/// - `engine.failure_total{engine, reason}`
/// - `reconcile.strategy_total{strategy}`
/// - `reconcile.selected_total{engine}`
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    success_total: [AtomicU64; 3],
    latency_ns_total: [AtomicU64; 3],
    failure_total: [[AtomicU64; 6]; 3],
    strategy_total: [AtomicU64; 3],
    selected_total: [AtomicU64; 2],
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// One successful transcription with its wall-clock duration.
    pub fn record_success(&self, source: SourceLabel, elapsed: Duration) {
        self.success_total[source_index(source)].fetch_add(1, Ordering::Relaxed);
        self.latency_ns_total[source_index(source)]
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    /// One failed transcription with its reason label.
    pub fn record_failure(&self, source: SourceLabel, reason: FailureLabel) {
        self.failure_total[source_index(source)][reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// One reconciliation run: which strategy ran, and whose result it chose.
    pub fn record_reconcile(&self, strategy: ReconcileStrategy, selected: EngineSlot) {
        self.strategy_total[strategy_index(strategy)].fetch_add(1, Ordering::Relaxed);
        self.selected_total[slot_index(selected)].fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            success_total: std::array::from_fn(|i| self.success_total[i].load(Ordering::Relaxed)),
            latency_ns_total: std::array::from_fn(|i| {
                self.latency_ns_total[i].load(Ordering::Relaxed)
            }),
            failure_total: std::array::from_fn(|i| {
                std::array::from_fn(|j| self.failure_total[i][j].load(Ordering::Relaxed))
            }),
            strategy_total: std::array::from_fn(|i| self.strategy_total[i].load(Ordering::Relaxed)),
            selected_total: std::array::from_fn(|i| self.selected_total[i].load(Ordering::Relaxed)),
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsSnapshot
// ---------------------------------------------------------------------------

/// Plain-data copy of the counters, safe to hold across awaits and assert on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    success_total: [u64; 3],
    latency_ns_total: [u64; 3],
    failure_total: [[u64; 6]; 3],
    strategy_total: [u64; 3],
    selected_total: [u64; 2],
}

impl MetricsSnapshot {
    pub fn success_total(&self, source: SourceLabel) -> u64 {
        self.success_total[source_index(source)]
    }

    pub fn latency_ns_total(&self, source: SourceLabel) -> u64 {
        self.latency_ns_total[source_index(source)]
    }

    pub fn failure_total(&self, source: SourceLabel, reason: FailureLabel) -> u64 {
        self.failure_total[source_index(source)][reason.index()]
    }

    /// All failures for one engine label, across reasons.
    pub fn failures_for(&self, source: SourceLabel) -> u64 {
        self.failure_total[source_index(source)].iter().sum()
    }

    pub fn strategy_total(&self, strategy: ReconcileStrategy) -> u64 {
        self.strategy_total[strategy_index(strategy)]
    }

    pub fn selected_total(&self, slot: EngineSlot) -> u64 {
        self.selected_total[slot_index(slot)]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_counts_and_latency_accumulate() {
        let m = PipelineMetrics::new();
        m.record_success(SourceLabel::Primary, Duration::from_millis(20));
        m.record_success(SourceLabel::Primary, Duration::from_millis(30));
        m.record_success(SourceLabel::Reconciled, Duration::from_millis(5));

        let snap = m.snapshot();
        assert_eq!(snap.success_total(SourceLabel::Primary), 2);
        assert_eq!(snap.success_total(SourceLabel::Secondary), 0);
        assert_eq!(snap.success_total(SourceLabel::Reconciled), 1);
        assert_eq!(
            snap.latency_ns_total(SourceLabel::Primary),
            Duration::from_millis(50).as_nanos() as u64
        );
    }

    #[test]
    fn failure_counts_are_per_reason() {
        let m = PipelineMetrics::new();
        m.record_failure(SourceLabel::Reconciled, FailureLabel::TranscriptionError);
        m.record_failure(SourceLabel::Reconciled, FailureLabel::TranscriptionError);
        m.record_failure(SourceLabel::Primary, FailureLabel::ConcurrencyLimit);

        let snap = m.snapshot();
        assert_eq!(
            snap.failure_total(SourceLabel::Reconciled, FailureLabel::TranscriptionError),
            2
        );
        assert_eq!(
            snap.failure_total(SourceLabel::Primary, FailureLabel::ConcurrencyLimit),
            1
        );
        assert_eq!(
            snap.failure_total(SourceLabel::Primary, FailureLabel::Timeout),
            0
        );
        assert_eq!(snap.failures_for(SourceLabel::Reconciled), 2);
    }

    #[test]
    fn reconcile_counters() {
        let m = PipelineMetrics::new();
        m.record_reconcile(ReconcileStrategy::Simple, EngineSlot::Secondary);
        m.record_reconcile(ReconcileStrategy::Overlap, EngineSlot::Primary);

        let snap = m.snapshot();
        assert_eq!(snap.strategy_total(ReconcileStrategy::Simple), 1);
        assert_eq!(snap.strategy_total(ReconcileStrategy::Overlap), 1);
        assert_eq!(snap.strategy_total(ReconcileStrategy::Confidence), 0);
        assert_eq!(snap.selected_total(EngineSlot::Secondary), 1);
        assert_eq!(snap.selected_total(EngineSlot::Primary), 1);
    }

    #[test]
    fn labels_are_low_cardinality_constants() {
        for label in FailureLabel::ALL {
            assert!(!label.as_str().is_empty());
            assert!(!label.as_str().contains(' '));
        }
    }

    #[test]
    fn metrics_are_shareable_across_threads() {
        use std::sync::Arc;
        let m = Arc::new(PipelineMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&m);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        m.record_success(SourceLabel::Primary, Duration::from_nanos(1));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(m.snapshot().success_total(SourceLabel::Primary), 400);
    }
}
