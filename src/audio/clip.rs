//! [`PcmClip`] — the audio currency of the pipeline.
//!
//! A clip is raw PCM: 16-bit signed little-endian, mono, 16 kHz.  The byte
//! buffer lives behind an `Arc` so a clip can be handed to both engines in
//! parallel without copying the audio.

use std::sync::Arc;

// ---------------------------------------------------------------------------
// Format constants
// ---------------------------------------------------------------------------

/// Sample rate every clip is captured/resampled to, in Hz.
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// Bytes per sample (16-bit signed LE).
pub const BYTES_PER_SAMPLE: usize = 2;

// ---------------------------------------------------------------------------
// PcmClip
// ---------------------------------------------------------------------------

/// An immutable PCM16LE mono 16 kHz audio buffer.
///
/// Cloning a clip clones an `Arc`, not the audio.
#[derive(Debug, Clone)]
pub struct PcmClip {
    bytes: Arc<[u8]>,
}

impl PcmClip {
    /// Wrap raw PCM16LE bytes.  No validation happens here — see
    /// [`crate::audio::AudioValidator`].
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Build a clip from `f32` samples in `[-1.0, 1.0]` (the format cpal and
    /// the resampler work in), converting to 16-bit signed LE.
    pub fn from_samples(samples: &[f32]) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
        for &s in samples {
            let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        Self::from_bytes(bytes)
    }

    /// The raw PCM16LE bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte length of the clip.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// `true` when the clip holds no audio at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of whole samples in the clip.
    pub fn sample_count(&self) -> usize {
        self.bytes.len() / BYTES_PER_SAMPLE
    }

    /// Clip duration in milliseconds, derived from the byte length
    /// (`bytes / 2 / 16000` seconds).
    pub fn duration_ms(&self) -> u64 {
        (self.sample_count() as u64 * 1_000) / SAMPLE_RATE_HZ as u64
    }

    /// Decode to `f32` samples in `[-1.0, 1.0]` for in-process inference.
    ///
    /// A trailing odd byte (rejected by the validator anyway) is ignored.
    pub fn to_samples(&self) -> Vec<f32> {
        self.bytes
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
            .collect()
    }

    /// Decode to `i16` samples for WAV writing.
    pub fn to_i16_samples(&self) -> Vec<i16> {
        self.bytes
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
