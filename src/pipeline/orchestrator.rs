//! The central transcription policy.
//!
//! [`TranscriptionOrchestrator::transcribe`] turns one captured clip into
//! exactly one [`TranscriptionCompletedEvent`] — always, even when everything
//! below it fails (the event then carries empty text).  Engine errors never
//! escape: they become metrics, failure events for the watchdog, and empty
//! publications.
//!
//! Execution strategies:
//!
//! - **single** — one engine, chosen by preference, health, and watchdog
//!   state.
//! - **smart** — single first; a below-threshold primary answer is discarded
//!   and the secondary engine re-answers under the reconcile deadline.  When
//!   that upgrade fails, the discarded low-confidence text stays discarded:
//!   the published result is empty.
//! - **dual** — both engines in parallel, merged by the configured
//!   reconciler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::audio::{AudioValidator, PcmClip};
use crate::events::{EventBus, TranscriptionCompletedEvent};
use crate::metrics::{FailureLabel, PipelineMetrics};
use crate::reconcile::Reconciler;
use crate::stt::{
    EngineError, EngineSlot, FailKind, ParallelError, ParallelTranscriber, SourceLabel,
    Transcription, TranscribeEngine,
};
use crate::watchdog::EngineWatchdog;

use super::timing::{with_paragraph_break, TimingCoordinator};

// ---------------------------------------------------------------------------
// OrchestrationMode
// ---------------------------------------------------------------------------

/// Which execution strategy `transcribe` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestrationMode {
    /// One engine only.
    Single,
    /// One engine, upgrading to dual when the primary's confidence is low.
    Smart,
    /// Both engines plus the reconciler on every clip.
    Dual,
}

/// Orchestrator tuning, distilled from [`crate::config::AppConfig`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub mode: OrchestrationMode,
    /// Engine preferred in single/smart mode.
    pub preferred: EngineSlot,
    /// Gate on reconciliation; `false` forces single mode.
    pub reconciliation_enabled: bool,
    /// Smart-upgrade trigger: primary confidence below this re-runs dual.
    pub confidence_threshold: f32,
    /// Wall-clock deadline for dual transcription.
    pub parallel_timeout: Duration,
}

// ---------------------------------------------------------------------------
// TranscriptionOrchestrator
// ---------------------------------------------------------------------------

/// Owns no engine resources; holds shared handles to everything it
/// coordinates.  Re-entrant: overlapping calls contend only on the engines'
/// admission permits and the worker pool.
pub struct TranscriptionOrchestrator {
    primary: Arc<dyn TranscribeEngine>,
    secondary: Arc<dyn TranscribeEngine>,
    parallel: Option<Arc<ParallelTranscriber>>,
    reconciler: Option<Reconciler>,
    watchdog: Option<Arc<EngineWatchdog>>,
    timing: TimingCoordinator,
    metrics: Arc<PipelineMetrics>,
    validator: AudioValidator,
    bus: EventBus,
    config: OrchestratorConfig,
}

impl TranscriptionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        primary: Arc<dyn TranscribeEngine>,
        secondary: Arc<dyn TranscribeEngine>,
        parallel: Option<Arc<ParallelTranscriber>>,
        reconciler: Option<Reconciler>,
        watchdog: Option<Arc<EngineWatchdog>>,
        timing: TimingCoordinator,
        metrics: Arc<PipelineMetrics>,
        validator: AudioValidator,
        bus: EventBus,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            parallel,
            reconciler,
            watchdog,
            timing,
            metrics,
            validator,
            bus,
            config,
        }
    }

    /// Transcribe one clip and publish exactly one completed event.
    pub async fn transcribe(&self, clip: PcmClip) {
        let transcription = match self.effective_mode() {
            OrchestrationMode::Single => self.run_single(clip, false).await,
            OrchestrationMode::Smart => self.run_single(clip, true).await,
            OrchestrationMode::Dual => self.run_dual(clip).await,
        };
        self.publish(transcription);
    }

    /// The configured mode, demoted to single when reconciliation is off or
    /// its dependencies are missing.
    fn effective_mode(&self) -> OrchestrationMode {
        let deps_ready = self.parallel.is_some() && self.reconciler.is_some();
        if !self.config.reconciliation_enabled || !deps_ready {
            OrchestrationMode::Single
        } else {
            self.config.mode
        }
    }

    fn engine(&self, slot: EngineSlot) -> &Arc<dyn TranscribeEngine> {
        match slot {
            EngineSlot::Primary => &self.primary,
            EngineSlot::Secondary => &self.secondary,
        }
    }

    fn is_enabled(&self, slot: EngineSlot) -> bool {
        self.watchdog
            .as_ref()
            .is_none_or(|w| w.is_engine_enabled(slot))
    }

    fn is_selectable(&self, slot: EngineSlot) -> bool {
        self.is_enabled(slot) && self.engine(slot).is_healthy()
    }

    // -- Mode-Single --------------------------------------------------------

    async fn run_single(&self, clip: PcmClip, allow_upgrade: bool) -> Transcription {
        let preferred = self.config.preferred;

        if let Err(e) = self.validator.validate(&clip) {
            log::warn!("rejecting clip: {e}");
            self.metrics
                .record_failure(preferred.into(), FailureLabel::UnexpectedError);
            return Transcription::empty(preferred.into());
        }

        let slot = if self.is_selectable(preferred) {
            preferred
        } else if self.is_selectable(preferred.other()) {
            log::warn!(
                "engine {preferred} unavailable, falling back to {}",
                preferred.other()
            );
            preferred.other()
        } else {
            log::error!(
                "both engines unavailable \
                 (primary enabled={} healthy={}, secondary enabled={} healthy={})",
                self.is_enabled(EngineSlot::Primary),
                self.engine(EngineSlot::Primary).is_healthy(),
                self.is_enabled(EngineSlot::Secondary),
                self.engine(EngineSlot::Secondary).is_healthy(),
            );
            let reason = if !self.is_enabled(EngineSlot::Primary)
                || !self.is_enabled(EngineSlot::Secondary)
            {
                FailureLabel::WatchdogCooldown
            } else {
                FailureLabel::UnexpectedError
            };
            self.metrics.record_failure(preferred.into(), reason);
            return Transcription::empty(preferred.into());
        };

        let start = Instant::now();
        match self.engine(slot).transcribe(clip.clone()).await {
            Ok(result) => {
                if allow_upgrade
                    && slot == EngineSlot::Primary
                    && result.confidence < self.config.confidence_threshold
                {
                    log::info!(
                        "primary confidence {:.2} below {:.2}, upgrading to dual transcription",
                        result.confidence,
                        self.config.confidence_threshold
                    );
                    // The low-confidence answer is discarded here and never
                    // resurfaces, even if the upgrade fails.
                    return self.run_upgrade(clip).await;
                }

                self.metrics.record_success(slot.into(), start.elapsed());
                Transcription::new(result.text, result.confidence, slot.into())
            }
            Err(e) => {
                log::warn!("engine {slot} failed: {e}");
                self.metrics
                    .record_failure(slot.into(), failure_label(&e));
                Transcription::empty(slot.into())
            }
        }
    }

    // -- Mode-Reconcile -----------------------------------------------------

    async fn run_dual(&self, clip: PcmClip) -> Transcription {
        // effective_mode() only returns Dual when both exist.
        let (Some(parallel), Some(reconciler)) = (self.parallel.as_ref(), self.reconciler.as_ref())
        else {
            self.metrics
                .record_failure(SourceLabel::Reconciled, FailureLabel::UnexpectedError);
            return Transcription::empty(SourceLabel::Reconciled);
        };

        let start = Instant::now();
        match parallel
            .transcribe_both(clip, self.config.parallel_timeout)
            .await
        {
            Ok((primary, secondary)) => {
                match reconciler.reconcile(primary.as_ref(), secondary.as_ref()) {
                    Some(chosen) => {
                        self.metrics
                            .record_success(SourceLabel::Reconciled, start.elapsed());
                        self.metrics
                            .record_reconcile(reconciler.strategy(), chosen.engine);
                        Transcription::new(chosen.text, chosen.confidence, SourceLabel::Reconciled)
                    }
                    None => {
                        self.metrics
                            .record_failure(SourceLabel::Reconciled, FailureLabel::UnexpectedError);
                        Transcription::empty(SourceLabel::Reconciled)
                    }
                }
            }
            Err(e) => {
                log::warn!("dual transcription failed: {e}");
                let label = match e {
                    ParallelError::InvalidAudio(_) => FailureLabel::UnexpectedError,
                    ParallelError::Timeout { .. } | ParallelError::BothFailed => {
                        FailureLabel::TranscriptionError
                    }
                };
                self.metrics.record_failure(SourceLabel::Reconciled, label);
                Transcription::empty(SourceLabel::Reconciled)
            }
        }
    }

    /// Smart upgrade: the primary's answer is already discarded, so only the
    /// secondary engine runs, under the dual deadline, and its answer goes
    /// through the reconciler one-sided.  Any failure here publishes empty —
    /// never the text that triggered the upgrade.
    async fn run_upgrade(&self, clip: PcmClip) -> Transcription {
        let Some(reconciler) = self.reconciler.as_ref() else {
            self.metrics
                .record_failure(SourceLabel::Reconciled, FailureLabel::UnexpectedError);
            return Transcription::empty(SourceLabel::Reconciled);
        };

        let start = Instant::now();
        let secondary = self.engine(EngineSlot::Secondary);
        match tokio::time::timeout(
            self.config.parallel_timeout,
            secondary.transcribe(clip),
        )
        .await
        {
            Ok(Ok(result)) => match reconciler.reconcile(None, Some(&result)) {
                Some(chosen) => {
                    self.metrics
                        .record_success(SourceLabel::Reconciled, start.elapsed());
                    self.metrics
                        .record_reconcile(reconciler.strategy(), chosen.engine);
                    Transcription::new(chosen.text, chosen.confidence, SourceLabel::Reconciled)
                }
                None => {
                    self.metrics
                        .record_failure(SourceLabel::Reconciled, FailureLabel::UnexpectedError);
                    Transcription::empty(SourceLabel::Reconciled)
                }
            },
            Ok(Err(e)) => {
                log::warn!("upgrade transcription failed: {e}");
                self.metrics
                    .record_failure(SourceLabel::Reconciled, FailureLabel::TranscriptionError);
                Transcription::empty(SourceLabel::Reconciled)
            }
            Err(_) => {
                log::warn!(
                    "upgrade transcription missed the {} ms deadline",
                    self.config.parallel_timeout.as_millis()
                );
                self.metrics
                    .record_failure(SourceLabel::Reconciled, FailureLabel::TranscriptionError);
                Transcription::empty(SourceLabel::Reconciled)
            }
        }
    }

    // -- Result routing -----------------------------------------------------

    fn publish(&self, transcription: Transcription) {
        let Transcription {
            text,
            confidence,
            source,
        } = transcription;

        let text = if !text.is_empty() && self.timing.should_add_paragraph_break() {
            with_paragraph_break(&text)
        } else {
            text
        };
        self.timing.record_transcription();

        self.bus.publish_completed(TranscriptionCompletedEvent {
            transcription: Transcription {
                text,
                confidence,
                source,
            },
            at: Instant::now(),
        });
    }
}

/// Map an engine error onto its metrics reason label.
fn failure_label(error: &EngineError) -> FailureLabel {
    match error {
        EngineError::Init { .. } => FailureLabel::InitFailure,
        EngineError::NotInitialized { .. } => FailureLabel::TranscriptionError,
        EngineError::Transcription { kind, .. } => match kind {
            FailKind::ConcurrencyLimit => FailureLabel::ConcurrencyLimit,
            FailKind::Timeout => FailureLabel::Timeout,
            _ => FailureLabel::TranscriptionError,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioValidator;
    use crate::metrics::MetricsSnapshot;
    use crate::reconcile::ReconcileStrategy;
    use crate::stt::mock::{MockBehavior, MockEngine};
    use crate::watchdog::WatchdogConfig;
    use tokio::sync::broadcast;

    struct Harness {
        orchestrator: TranscriptionOrchestrator,
        primary: Arc<MockEngine>,
        secondary: Arc<MockEngine>,
        metrics: Arc<PipelineMetrics>,
        completed: broadcast::Receiver<TranscriptionCompletedEvent>,
    }

    fn harness(
        primary: MockEngine,
        secondary: MockEngine,
        config: OrchestratorConfig,
        strategy: ReconcileStrategy,
        watchdog_config: Option<WatchdogConfig>,
    ) -> Harness {
        let bus = EventBus::new();
        let completed = bus.subscribe_completed();
        let metrics = Arc::new(PipelineMetrics::new());
        let validator = AudioValidator::from_millis(100, 60_000);

        let primary = Arc::new(primary);
        let secondary = Arc::new(secondary);
        let primary_dyn = Arc::clone(&primary) as Arc<dyn TranscribeEngine>;
        let secondary_dyn = Arc::clone(&secondary) as Arc<dyn TranscribeEngine>;

        let parallel = Arc::new(ParallelTranscriber::new(
            Arc::clone(&primary_dyn),
            Arc::clone(&secondary_dyn),
            validator.clone(),
            Duration::from_secs(30),
        ));

        let watchdog = watchdog_config.map(|cfg| {
            Arc::new(EngineWatchdog::new(
                cfg,
                Arc::clone(&primary_dyn),
                Arc::clone(&secondary_dyn),
                Arc::clone(&metrics),
            ))
        });

        let orchestrator = TranscriptionOrchestrator::new(
            primary_dyn,
            secondary_dyn,
            Some(parallel),
            Some(Reconciler::new(strategy, 0.6)),
            watchdog,
            TimingCoordinator::from_millis(0),
            Arc::clone(&metrics),
            validator,
            bus,
            config,
        );

        Harness {
            orchestrator,
            primary,
            secondary,
            metrics,
            completed,
        }
    }

    fn config(mode: OrchestrationMode) -> OrchestratorConfig {
        OrchestratorConfig {
            mode,
            preferred: EngineSlot::Primary,
            reconciliation_enabled: mode != OrchestrationMode::Single,
            confidence_threshold: 0.7,
            parallel_timeout: Duration::from_secs(10),
        }
    }

    fn clip() -> PcmClip {
        PcmClip::from_bytes(vec![0u8; 32_000])
    }

    fn snapshot(h: &Harness) -> MetricsSnapshot {
        h.metrics.snapshot()
    }

    // --- scenario 1: single-engine happy path ---

    #[tokio::test]
    async fn single_engine_happy_path() {
        let mut h = harness(
            MockEngine::ok(EngineSlot::Primary, "hello world", 0.9),
            MockEngine::ok(EngineSlot::Secondary, "unused", 0.9),
            config(OrchestrationMode::Single),
            ReconcileStrategy::Simple,
            None,
        );

        h.orchestrator.transcribe(clip()).await;

        let event = h.completed.recv().await.unwrap();
        assert_eq!(event.transcription.text, "hello world");
        assert_eq!(event.transcription.confidence, 0.9);
        assert_eq!(event.transcription.source, SourceLabel::Primary);
        assert_eq!(snapshot(&h).success_total(SourceLabel::Primary), 1);
        assert_eq!(
            h.secondary.transcribe_calls.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    // --- scenario 2: smart upgrade success ---

    #[tokio::test]
    async fn smart_upgrade_discards_low_confidence_and_uses_secondary() {
        let mut h = harness(
            MockEngine::ok(EngineSlot::Primary, "meh", 0.5),
            MockEngine::ok(EngineSlot::Secondary, "hello world", 0.95),
            config(OrchestrationMode::Smart),
            ReconcileStrategy::Simple,
            None,
        );

        h.orchestrator.transcribe(clip()).await;

        let event = h.completed.recv().await.unwrap();
        assert_eq!(event.transcription.text, "hello world");
        assert_eq!(event.transcription.source, SourceLabel::Reconciled);

        let snap = snapshot(&h);
        assert_eq!(snap.strategy_total(ReconcileStrategy::Simple), 1);
        assert_eq!(snap.selected_total(EngineSlot::Secondary), 1);
        assert_eq!(snap.success_total(SourceLabel::Reconciled), 1);
    }

    #[tokio::test]
    async fn smart_mode_keeps_confident_primary_answer() {
        let mut h = harness(
            MockEngine::ok(EngineSlot::Primary, "confident", 0.95),
            MockEngine::ok(EngineSlot::Secondary, "unused", 0.9),
            config(OrchestrationMode::Smart),
            ReconcileStrategy::Simple,
            None,
        );

        h.orchestrator.transcribe(clip()).await;

        let event = h.completed.recv().await.unwrap();
        assert_eq!(event.transcription.text, "confident");
        assert_eq!(event.transcription.source, SourceLabel::Primary);
        assert_eq!(
            h.secondary.transcribe_calls.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    // --- scenario 3: smart upgrade where the upgrade fails ---

    #[tokio::test]
    async fn smart_upgrade_failure_publishes_empty_not_the_primary_text() {
        let mut h = harness(
            MockEngine::ok(EngineSlot::Primary, "meh", 0.5),
            MockEngine::failing(EngineSlot::Secondary),
            config(OrchestrationMode::Smart),
            ReconcileStrategy::Simple,
            None,
        );

        h.orchestrator.transcribe(clip()).await;

        let event = h.completed.recv().await.unwrap();
        assert_eq!(event.transcription.text, "");
        assert_eq!(event.transcription.source, SourceLabel::Reconciled);
        assert_eq!(
            snapshot(&h).failure_total(SourceLabel::Reconciled, FailureLabel::TranscriptionError),
            1
        );
    }

    /// Confidence exactly threshold − ε triggers the upgrade.
    #[tokio::test]
    async fn smart_upgrade_triggers_just_below_threshold() {
        let mut h = harness(
            MockEngine::ok(EngineSlot::Primary, "borderline", 0.699),
            MockEngine::failing(EngineSlot::Secondary),
            config(OrchestrationMode::Smart),
            ReconcileStrategy::Simple,
            None,
        );

        h.orchestrator.transcribe(clip()).await;
        let event = h.completed.recv().await.unwrap();
        assert_eq!(event.transcription.text, "");
    }

    // --- scenario 4: dual with one engine timing out ---

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn dual_mode_discards_slow_engine_and_reconciles_the_rest() {
        let mut cfg = config(OrchestrationMode::Dual);
        cfg.parallel_timeout = Duration::from_millis(200);

        let mut h = harness(
            MockEngine::ok_after(EngineSlot::Primary, "A", 0.8, Duration::from_millis(50)),
            MockEngine::ok_after(EngineSlot::Secondary, "LATE", 0.99, Duration::from_millis(500)),
            cfg,
            ReconcileStrategy::Confidence,
            None,
        );

        h.orchestrator.transcribe(clip()).await;

        let event = h.completed.recv().await.unwrap();
        assert_eq!(event.transcription.text, "A");
        assert_eq!(event.transcription.source, SourceLabel::Reconciled);
        assert_eq!(snapshot(&h).selected_total(EngineSlot::Primary), 1);
    }

    // --- scenario 5: overlap disagreement (dual mode end-to-end) ---

    #[tokio::test]
    async fn dual_mode_overlap_tie_prefers_primary() {
        let mut h = harness(
            MockEngine::ok(EngineSlot::Primary, "the quick brown fox", 0.5),
            MockEngine::ok(EngineSlot::Secondary, "the quick brown dog", 0.5),
            config(OrchestrationMode::Dual),
            ReconcileStrategy::Overlap,
            None,
        );

        h.orchestrator.transcribe(clip()).await;

        let event = h.completed.recv().await.unwrap();
        assert_eq!(event.transcription.text, "the quick brown fox");
        assert_eq!(event.transcription.source, SourceLabel::Reconciled);
    }

    // --- scenario 6: watchdog-disabled engine falls back, then both out ---

    #[tokio::test]
    async fn disabled_primary_falls_back_to_secondary() {
        let h = harness(
            MockEngine::ok(EngineSlot::Primary, "from primary", 0.9),
            MockEngine::ok(EngineSlot::Secondary, "from secondary", 0.9),
            config(OrchestrationMode::Single),
            ReconcileStrategy::Simple,
            Some(WatchdogConfig {
                window: Duration::from_secs(60),
                max_restarts: 3,
                cooldown: Duration::from_secs(600),
            }),
        );
        let mut completed = h.completed;

        // Exhaust the primary's budget: 4 failures inside the window.
        let wd = h.orchestrator.watchdog.as_ref().unwrap();
        for _ in 0..4 {
            wd.handle_failure(&crate::events::FailureEvent::new(
                EngineSlot::Primary,
                crate::events::FailureReason::CallFailed,
                "injected",
            ))
            .await;
        }
        assert!(!wd.is_engine_enabled(EngineSlot::Primary));

        h.orchestrator.transcribe(clip()).await;
        let event = completed.recv().await.unwrap();
        assert_eq!(event.transcription.text, "from secondary");
        assert_eq!(event.transcription.source, SourceLabel::Secondary);
    }

    #[tokio::test]
    async fn both_unavailable_publishes_empty() {
        let h = harness(
            MockEngine::ok(EngineSlot::Primary, "p", 0.9),
            MockEngine::ok(EngineSlot::Secondary, "s", 0.9),
            config(OrchestrationMode::Single),
            ReconcileStrategy::Simple,
            None,
        );
        let mut completed = h.completed;
        h.primary.set_healthy(false);
        h.secondary.set_healthy(false);

        h.orchestrator.transcribe(clip()).await;

        let event = completed.recv().await.unwrap();
        assert_eq!(event.transcription.text, "");
        assert_eq!(event.transcription.source, SourceLabel::Primary);
        assert_eq!(
            h.metrics
                .snapshot()
                .failure_total(SourceLabel::Primary, FailureLabel::UnexpectedError),
            1
        );
    }

    // --- invariants ---

    /// Exactly one completed event per call, across outcomes.
    #[tokio::test]
    async fn exactly_one_event_per_invocation() {
        let mut h = harness(
            MockEngine::ok(EngineSlot::Primary, "ok", 0.9),
            MockEngine::ok(EngineSlot::Secondary, "s", 0.9),
            config(OrchestrationMode::Single),
            ReconcileStrategy::Simple,
            None,
        );

        // Success.
        h.orchestrator.transcribe(clip()).await;
        // Engine failure.
        h.primary.queue(MockBehavior::fail());
        h.orchestrator.transcribe(clip()).await;
        // Validation failure (empty clip).
        h.orchestrator.transcribe(PcmClip::from_bytes(Vec::new())).await;

        for _ in 0..3 {
            assert!(h.completed.try_recv().is_ok(), "missing completed event");
        }
        assert!(h.completed.try_recv().is_err(), "extra completed event");
    }

    #[tokio::test]
    async fn validation_failure_skips_engines_and_records_metric() {
        let mut h = harness(
            MockEngine::ok(EngineSlot::Primary, "ok", 0.9),
            MockEngine::ok(EngineSlot::Secondary, "s", 0.9),
            config(OrchestrationMode::Single),
            ReconcileStrategy::Simple,
            None,
        );

        h.orchestrator
            .transcribe(PcmClip::from_bytes(vec![0u8; 31]))
            .await;

        let event = h.completed.recv().await.unwrap();
        assert_eq!(event.transcription.text, "");
        assert_eq!(
            h.primary.transcribe_calls.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
        assert_eq!(
            snapshot(&h).failure_total(SourceLabel::Primary, FailureLabel::UnexpectedError),
            1
        );
    }

    #[tokio::test]
    async fn engine_failure_records_reason_label() {
        let mut h = harness(
            MockEngine::ok(EngineSlot::Primary, "ok", 0.9),
            MockEngine::ok(EngineSlot::Secondary, "s", 0.9),
            config(OrchestrationMode::Single),
            ReconcileStrategy::Simple,
            None,
        );

        h.primary.queue(MockBehavior::Fail {
            kind: FailKind::Timeout,
            delay: Duration::ZERO,
        });
        h.orchestrator.transcribe(clip()).await;

        let event = h.completed.recv().await.unwrap();
        assert_eq!(event.transcription.text, "");
        assert_eq!(
            snapshot(&h).failure_total(SourceLabel::Primary, FailureLabel::Timeout),
            1
        );
    }

    /// reconciliation.enabled=false forces single mode even when the
    /// configured mode is dual.
    #[tokio::test]
    async fn reconciliation_disabled_forces_single() {
        let mut cfg = config(OrchestrationMode::Dual);
        cfg.reconciliation_enabled = false;

        let mut h = harness(
            MockEngine::ok(EngineSlot::Primary, "single answer", 0.9),
            MockEngine::ok(EngineSlot::Secondary, "unused", 0.9),
            cfg,
            ReconcileStrategy::Simple,
            None,
        );

        h.orchestrator.transcribe(clip()).await;

        let event = h.completed.recv().await.unwrap();
        assert_eq!(event.transcription.source, SourceLabel::Primary);
        assert_eq!(
            h.secondary.transcribe_calls.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    // --- paragraph breaks ---

    #[tokio::test]
    async fn paragraph_break_prepended_after_silence_gap() {
        let bus = EventBus::new();
        let mut completed = bus.subscribe_completed();
        let metrics = Arc::new(PipelineMetrics::new());
        let validator = AudioValidator::from_millis(100, 60_000);
        let primary =
            Arc::new(MockEngine::ok(EngineSlot::Primary, "para", 0.9)) as Arc<dyn TranscribeEngine>;
        let secondary =
            Arc::new(MockEngine::ok(EngineSlot::Secondary, "s", 0.9)) as Arc<dyn TranscribeEngine>;

        let orchestrator = TranscriptionOrchestrator::new(
            primary,
            secondary,
            None,
            None,
            None,
            TimingCoordinator::from_millis(20),
            metrics,
            validator,
            bus,
            config(OrchestrationMode::Single),
        );

        orchestrator.transcribe(clip()).await;
        let first = completed.recv().await.unwrap();
        assert_eq!(first.transcription.text, "para");

        tokio::time::sleep(Duration::from_millis(50)).await;
        orchestrator.transcribe(clip()).await;
        let second = completed.recv().await.unwrap();
        assert_eq!(second.transcription.text, "\npara");
    }
}
