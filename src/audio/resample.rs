//! Channel downmix and sample-rate conversion.
//!
//! The engines consume **16 kHz mono** audio; capture devices deliver
//! whatever they like (commonly 44.1/48 kHz, often stereo).  Two steps bridge
//! the gap:
//!
//! 1. [`downmix_to_mono`] — average interleaved channels into one.
//! 2. [`RateConverter`] — rubato `FastFixedIn` resampler to 16 kHz, a
//!    passthrough when the device already runs at the target rate.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use super::clip::SAMPLE_RATE_HZ;

// ---------------------------------------------------------------------------
// downmix_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging each frame.
///
/// Mono input is returned as an owned copy; zero channels yield an empty
/// vector.
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// RateConverter
// ---------------------------------------------------------------------------

/// Converts mono `f32` audio from the device rate to the pipeline's 16 kHz.
///
/// Input is accumulated until rubato's fixed chunk size is available; the
/// remainder waits for the next call.  Call [`RateConverter::flush`] after
/// the last chunk of a session to drain the tail.
pub struct RateConverter {
    /// `None` when the device already runs at 16 kHz.
    resampler: Option<FastFixedIn<f32>>,
    input_buf: Vec<f32>,
    chunk_size: usize,
    /// Pre-allocated rubato output: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// `chunk_size` is the fixed input block rubato processes per call
    /// (e.g. 960 = 20 ms at 48 kHz).
    pub fn new(capture_rate: u32, chunk_size: usize) -> Result<Self, String> {
        if capture_rate == SAMPLE_RATE_HZ {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = SAMPLE_RATE_HZ as f64 / capture_rate as f64;
        let resampler =
            FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
                .map_err(|e| format!("resampler init failed: {e}"))?;

        let max_out = resampler.output_frames_max();
        log::debug!(
            "resampling {capture_rate} Hz → {SAMPLE_RATE_HZ} Hz (chunk {chunk_size}, max out {max_out})"
        );

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf: vec![vec![0f32; max_out]; 1],
        })
    }

    /// Feed device samples, returning whatever full blocks produced
    /// (possibly nothing while input accumulates).
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);

        let mut result = Vec::new();
        while self.input_buf.len() >= self.chunk_size {
            let input = &self.input_buf[..self.chunk_size];
            match resampler.process_into_buffer(&[input], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => {
                    log::error!("resampler error: {e}");
                }
            }
            self.input_buf.drain(..self.chunk_size);
        }
        result
    }

    /// Zero-pad and convert any buffered partial block (end of a session).
    pub fn flush(&mut self) -> Vec<f32> {
        if self.resampler.is_none() || self.input_buf.is_empty() {
            return Vec::new();
        }
        let pad = self.chunk_size - self.input_buf.len();
        let mut out = self.process(&vec![0f32; pad]);
        // Padding converts to trailing silence; callers may trim by length,
        // but a few ms of silence is harmless to the recognizers.
        self.input_buf.clear();
        if let Some(last_nonzero) = out.iter().rposition(|s| *s != 0.0) {
            out.truncate(last_nonzero + 1);
        }
        out
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
