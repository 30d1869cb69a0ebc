//! voicekey — local push-to-talk voice dictation.
//!
//! Hold a global hotkey, speak, release: the captured clip is transcribed by
//! an in-process whisper engine and/or an external recognizer subprocess,
//! the two answers are reconciled, and the final text is pasted into the
//! focused window.  Everything runs locally; nothing leaves the machine.
//!
//! # Subsystems
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`audio`] | [`audio::PcmClip`], validation, cpal capture sessions |
//! | [`stt`] | the two engines, admission control, parallel fan-out |
//! | [`reconcile`] | merging two engine answers into one text |
//! | [`watchdog`] | failure budgets, engine restart and cooldown |
//! | [`pipeline`] | capture sessions, the orchestrator, the hotkey loop |
//! | [`events`] | typed broadcast bus connecting everything above |
//! | [`metrics`] | counters and timers for the whole pipeline |
//! | [`hotkey`] / [`inject`] | OS integration: global keys in, paste out |
//! | [`config`] | TOML settings and platform paths |
//!
//! `main.rs` constructs every component explicitly and wires them together —
//! there are no globals and no singletons.

pub mod audio;
pub mod config;
pub mod events;
pub mod hotkey;
pub mod inject;
pub mod metrics;
pub mod pipeline;
pub mod reconcile;
pub mod stt;
pub mod watchdog;
