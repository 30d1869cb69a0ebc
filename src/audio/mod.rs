//! Audio: the clip type, validation, and the microphone collaborator.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → downmix_to_mono
//!           → RateConverter (16 kHz) → SessionRecorder → PcmClip
//!                                                          │
//!                                        AudioValidator ◀──┘ (once per request)
//! ```
//!
//! Everything downstream of this module speaks [`PcmClip`]: 16-bit signed
//! little-endian, mono, 16 kHz.

pub mod capture;
pub mod clip;
pub mod mic;
pub mod resample;
pub mod validator;

pub use capture::{AudioCapture, AudioChunk, CaptureError, StreamHandle};
pub use clip::{PcmClip, BYTES_PER_SAMPLE, SAMPLE_RATE_HZ};
pub use mic::{CaptureSource, MicCapture};
pub use resample::{downmix_to_mono, RateConverter};
pub use validator::{AudioError, AudioValidator};
