//! Application entry point — voicekey.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (defaults on first run).
//! 3. Create the tokio runtime (worker pool sized to the hardware).
//! 4. Build both engines behind their admission adapters and initialize them.
//! 5. Start the watchdog on the failure-event stream.
//! 6. Build the parallel service, reconciler, and orchestrator.
//! 7. Start microphone capture and the dictation controller.
//! 8. Start the text injector.
//! 9. Spawn the hotkey listener thread.
//! 10. Park the main thread until Ctrl+C, then close the engines.

use std::sync::Arc;

use voicekey::{
    audio::MicCapture,
    config::AppConfig,
    events::EventBus,
    hotkey::{parse_key, HotkeyListener},
    inject::TextInjector,
    metrics::PipelineMetrics,
    pipeline::{
        CaptureStateMachine, DictationController, TimingCoordinator, TranscriptionOrchestrator,
    },
    stt::{
        EngineAdapter, EngineSlot, ParallelTranscriber, SubprocessBackend, TranscribeEngine,
        WhisperBackend,
    },
    watchdog::EngineWatchdog,
};

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voicekey starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Runtime — the shared worker pool for the orchestrator, parallel
    //    service, and every event handler.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    let bus = EventBus::new();
    let metrics = Arc::new(PipelineMetrics::new());

    // 4. Engines: in-process whisper in the primary slot, the external
    //    recognizer in the secondary slot, each behind its admission gate.
    let primary: Arc<dyn TranscribeEngine> = Arc::new(EngineAdapter::new(
        EngineSlot::Primary,
        Arc::new(WhisperBackend::new(config.whisper_config())),
        config.concurrency.primary_max,
        config.acquire_timeout(),
        bus.clone(),
    ));
    let secondary: Arc<dyn TranscribeEngine> = Arc::new(EngineAdapter::new(
        EngineSlot::Secondary,
        Arc::new(SubprocessBackend::new(config.recognizer_config())),
        config.concurrency.secondary_max,
        config.acquire_timeout(),
        bus.clone(),
    ));

    // A failed initialize is not fatal: selection falls back to the other
    // engine and the watchdog keeps retrying.
    for engine in [&primary, &secondary] {
        if let Err(e) = rt.block_on(engine.initialize()) {
            log::warn!("engine {} failed to initialize: {e}", engine.engine_name());
        }
    }

    // 5. Watchdog
    let watchdog = config.watchdog.enabled.then(|| {
        let wd = Arc::new(EngineWatchdog::new(
            config.watchdog_config(),
            Arc::clone(&primary),
            Arc::clone(&secondary),
            Arc::clone(&metrics),
        ));
        rt.spawn(Arc::clone(&wd).run(bus.clone()));
        wd
    });

    // 6. Orchestrator
    let parallel = Arc::new(ParallelTranscriber::new(
        Arc::clone(&primary),
        Arc::clone(&secondary),
        config.validator(),
        config.orchestrator_config().parallel_timeout,
    ));
    let orchestrator = Arc::new(TranscriptionOrchestrator::new(
        Arc::clone(&primary),
        Arc::clone(&secondary),
        Some(parallel),
        Some(config.reconciler()),
        watchdog,
        TimingCoordinator::from_millis(config.orchestration.silence_gap_ms),
        Arc::clone(&metrics),
        config.validator(),
        bus.clone(),
        config.orchestrator_config(),
    ));

    // 7. Microphone + controller.  The stream handle is not Send and stays
    //    on this thread for the process lifetime.
    let device = (!config.audio.device.is_empty()).then_some(config.audio.device.as_str());
    let _stream_handle = match MicCapture::start(device, config.audio.max_duration_ms, bus.clone())
    {
        Ok((capture, handle)) => {
            let controller = DictationController::new(
                bus.clone(),
                Arc::new(CaptureStateMachine::new()),
                capture,
                Arc::clone(&orchestrator),
            );
            rt.spawn(controller.run());
            Some(handle)
        }
        Err(e) => {
            log::error!("audio capture unavailable: {e}");
            None
        }
    };

    // 8. Text injection
    if config.inject.enabled {
        let injector = TextInjector::new(config.inject.restore_clipboard);
        rt.spawn(injector.run(bus.clone()));
    } else {
        log::info!("text injection disabled by config");
    }

    // 9. Hotkey listener thread
    let push_to_talk = parse_key(&config.hotkey.push_to_talk_key).unwrap_or_else(|| {
        log::warn!(
            "unknown push-to-talk key {:?}, using F9",
            config.hotkey.push_to_talk_key
        );
        rdev::Key::F9
    });
    let cancel = parse_key(&config.hotkey.cancel_key);
    let _listener = HotkeyListener::start(push_to_talk, cancel, bus.clone());
    log::info!(
        "ready — hold {} to dictate, {} to cancel",
        config.hotkey.push_to_talk_key,
        config.hotkey.cancel_key
    );

    // 10. Park until Ctrl+C, then release engine resources.
    rt.block_on(async {
        let _ = tokio::signal::ctrl_c().await;
    });
    log::info!("shutting down");
    rt.block_on(async {
        primary.close().await;
        secondary.close().await;
    });

    Ok(())
}
