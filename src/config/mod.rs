//! Configuration: TOML settings and platform paths.
//!
//! Provides [`AppConfig`] (top-level settings with one struct per section),
//! [`AppPaths`] for cross-platform directories, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AudioSettings, ConcurrencySettings, HotkeyConfig, InjectConfig,
    OrchestrationSettings, ParallelSettings, ReconciliationSettings, SubprocessSettings,
    WatchdogSettings, WhisperSettings,
};
