//! Engine failure supervision.
//!
//! [`EngineWatchdog`] subscribes to [`FailureEvent`]s and keeps a sliding
//! restart budget per engine: failures inside the window trigger a restart
//! (close + initialize); exhausting the budget disables the engine for a
//! cooldown, after which a successful initialize re-enables it.
//!
//! State machine per engine:
//!
//! ```text
//! HEALTHY ──failure (budget left)──▶ DEGRADED ──restart ok──▶ HEALTHY
//! HEALTHY/DEGRADED ──budget exhausted──▶ DISABLED
//! DISABLED ──cooldown elapsed + initialize ok──▶ HEALTHY
//! ```
//!
//! A failed restart emits its own failure event through the adapter, so it
//! counts toward the budget like any other failure.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::events::{EventBus, FailureEvent};
use crate::metrics::{FailureLabel, PipelineMetrics};
use crate::stt::{EngineSlot, TranscribeEngine};

// ---------------------------------------------------------------------------
// WatchdogConfig
// ---------------------------------------------------------------------------

/// Restart budget tuning.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Sliding window over which failures are counted.
    pub window: Duration,
    /// Restarts allowed inside the window before the engine is disabled.
    pub max_restarts: u32,
    /// How long a disabled engine stays out before re-enable is attempted.
    pub cooldown: Duration,
}

impl WatchdogConfig {
    pub fn from_minutes(window_minutes: u64, max_restarts: u32, cooldown_minutes: u64) -> Self {
        Self {
            window: Duration::from_secs(window_minutes * 60),
            max_restarts: max_restarts.max(1),
            cooldown: Duration::from_secs(cooldown_minutes * 60),
        }
    }
}

/// Observable engine condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// Enabled and passing its health probe.
    Healthy,
    /// Enabled but currently unhealthy.
    Degraded,
    /// Out of budget, waiting out the cooldown.
    Disabled,
}

/// What `handle_failure` decided, so the run loop can schedule follow-ups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    /// Restart attempted (its own failure, if any, arrives as a new event).
    Restarted,
    /// Budget exhausted; the engine is now disabled.
    Disabled,
    /// Event ignored (engine already disabled, cooling down).
    Ignored,
}

#[derive(Debug, Default)]
struct EngineEntry {
    disabled: bool,
    failures: VecDeque<Instant>,
}

// ---------------------------------------------------------------------------
// EngineWatchdog
// ---------------------------------------------------------------------------

/// Supervises both engines.  Selection paths read `is_engine_enabled`; all
/// mutation happens under one lock, never held across an await.
pub struct EngineWatchdog {
    config: WatchdogConfig,
    entries: Mutex<HashMap<EngineSlot, EngineEntry>>,
    primary: Arc<dyn TranscribeEngine>,
    secondary: Arc<dyn TranscribeEngine>,
    metrics: Arc<PipelineMetrics>,
}

impl EngineWatchdog {
    pub fn new(
        config: WatchdogConfig,
        primary: Arc<dyn TranscribeEngine>,
        secondary: Arc<dyn TranscribeEngine>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let mut entries = HashMap::new();
        entries.insert(EngineSlot::Primary, EngineEntry::default());
        entries.insert(EngineSlot::Secondary, EngineEntry::default());
        Self {
            config,
            entries: Mutex::new(entries),
            primary,
            secondary,
            metrics,
        }
    }

    fn engine(&self, slot: EngineSlot) -> &Arc<dyn TranscribeEngine> {
        match slot {
            EngineSlot::Primary => &self.primary,
            EngineSlot::Secondary => &self.secondary,
        }
    }

    /// Consulted by the orchestrator's selection path.
    pub fn is_engine_enabled(&self, slot: EngineSlot) -> bool {
        !self.entries.lock().unwrap()[&slot].disabled
    }

    /// Condition snapshot combining the budget state and the live probe.
    pub fn status(&self, slot: EngineSlot) -> EngineStatus {
        if !self.is_engine_enabled(slot) {
            EngineStatus::Disabled
        } else if self.engine(slot).is_healthy() {
            EngineStatus::Healthy
        } else {
            EngineStatus::Degraded
        }
    }

    /// Account one failure and react: restart while the budget lasts,
    /// disable once it is exhausted.
    pub async fn handle_failure(&self, event: &FailureEvent) -> WatchdogVerdict {
        let slot = event.engine;
        let over_budget = {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries.get_mut(&slot).expect("both slots present");
            if entry.disabled {
                return WatchdogVerdict::Ignored;
            }

            // Purge entries older than the window, then account this one.
            if let Some(cutoff) = Instant::now().checked_sub(self.config.window) {
                while entry.failures.front().is_some_and(|t| *t < cutoff) {
                    entry.failures.pop_front();
                }
            }
            entry.failures.push_back(event.at);

            entry.failures.len() as u32 > self.config.max_restarts
        };

        if over_budget {
            self.entries.lock().unwrap().get_mut(&slot).unwrap().disabled = true;
            self.metrics
                .record_failure(slot.into(), FailureLabel::WatchdogCooldown);
            log::warn!(
                "watchdog: engine {slot} exceeded {} restarts in window, disabled for {:?}",
                self.config.max_restarts,
                self.config.cooldown
            );
            WatchdogVerdict::Disabled
        } else {
            log::info!("watchdog: restarting engine {slot} after failure ({})", event.cause);
            self.restart(slot).await;
            WatchdogVerdict::Restarted
        }
    }

    /// Close + initialize.  A failed initialize reports through the engine's
    /// own failure event, which comes back around to `handle_failure`.
    async fn restart(&self, slot: EngineSlot) {
        let engine = self.engine(slot);
        engine.close().await;
        match engine.initialize().await {
            Ok(()) => log::info!("watchdog: engine {slot} restarted"),
            Err(e) => log::warn!("watchdog: engine {slot} restart failed: {e}"),
        }
    }

    /// End-of-cooldown attempt: re-enable iff a fresh initialize succeeds.
    /// Returns `true` when the engine is enabled again.
    pub async fn try_reenable(&self, slot: EngineSlot) -> bool {
        let engine = self.engine(slot);
        engine.close().await;
        match engine.initialize().await {
            Ok(()) => {
                let mut entries = self.entries.lock().unwrap();
                let entry = entries.get_mut(&slot).expect("both slots present");
                entry.disabled = false;
                entry.failures.clear();
                log::info!("watchdog: engine {slot} re-enabled after cooldown");
                true
            }
            Err(e) => {
                log::warn!("watchdog: engine {slot} re-enable failed, cooling down again: {e}");
                false
            }
        }
    }

    /// Event loop: consume failure events until the bus closes.  Disabled
    /// engines get a re-enable task scheduled after the cooldown, which
    /// keeps rescheduling itself while initialize keeps failing.
    pub async fn run(self: Arc<Self>, bus: EventBus) {
        let mut failures = bus.subscribe_failures();
        loop {
            match failures.recv().await {
                Ok(event) => {
                    let slot = event.engine;
                    if self.handle_failure(&event).await == WatchdogVerdict::Disabled {
                        self.clone().schedule_reenable(slot);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("watchdog: lagged, {skipped} failure event(s) dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn schedule_reenable(self: Arc<Self>, slot: EngineSlot) {
        let cooldown = self.config.cooldown;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(cooldown).await;
                if self.try_reenable(slot).await {
                    break;
                }
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
